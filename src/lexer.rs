// https://www.w3.org/TR/1999/REC-xpath-19991116/#exprlex
//
// Token rules are anchored patterns tried against the start of the
// remaining input; the longest successful match wins and table order
// breaks ties. The lexer itself is stateless — the only context
// sensitivity is the previously emitted token, which decides whether an
// operator keyword is really a name ('child::div' navigates to a 'div'
// element, it does not divide).

use regex::Regex;
use tracing::trace;

use crate::axis::AXIS_NAMES;
use crate::result::{Error, Result};
use crate::tokens::{NodeTypeKind, Token};

static DOUBLE_CHAR_TOKENS: [(&str, Token); 6] = [
    ("<=", Token::LessThanOrEqual),
    (">=", Token::GreaterThanOrEqual),
    ("!=", Token::NotEqual),
    ("//", Token::DoubleSlash),
    ("..", Token::DotDot),
    ("::", Token::AxisSeparator),
];

static SINGLE_CHAR_TOKENS: [(&str, Token); 16] = [
    ("/", Token::Slash),
    ("(", Token::LeftParen),
    (")", Token::RightParen),
    ("[", Token::LeftBracket),
    ("]", Token::RightBracket),
    ("@", Token::At),
    (",", Token::Comma),
    ("$", Token::Dollar),
    ("|", Token::Pipe),
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("=", Token::Equal),
    ("<", Token::LessThan),
    (">", Token::GreaterThan),
    ("*", Token::Star),
    (".", Token::Dot),
];

pub struct Lexer {
    pi_test: Regex,
    node_type_open: Regex,
    named_operator: Regex,
    number: Regex,
    literal: Regex,
    namespace_wildcard: Regex,
    qname: Regex,
}

impl Lexer {
    pub fn new() -> Self {
        Lexer {
            // The optional target literal belongs to the test itself; a
            // literal left for the grammar would reduce to a primary
            // expression before ')' could close the test.
            pi_test: Regex::new(
                r#"^processing-instruction\s*\(\s*(?:'([^']*)'|"([^"]*)")?\s*\)"#,
            )
            .expect("static token rule"),
            node_type_open: Regex::new(r"^(node|text|comment)\s*\(")
                .expect("static token rule"),
            named_operator: Regex::new(r"^(?:and|or|mod|div)\b")
                .expect("static token rule"),
            number: Regex::new(r"^(?:\d+(?:\.\d*)?|\.\d+)").expect("static token rule"),
            literal: Regex::new(r#"^(?:'([^']*)'|"([^"]*)")"#)
                .expect("static token rule"),
            namespace_wildcard: Regex::new(r"^[^\d\W][\w.\-]*:\*")
                .expect("static token rule"),
            qname: Regex::new(r"^[^\d\W][\w.\-]*(?::[^\d\W][\w.\-]*)?")
                .expect("static token rule"),
        }
    }

    pub fn tokenize(&self, expression: &str) -> Result<Vec<Token>> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut rest = expression.trim_start();

        while !rest.is_empty() {
            let Some((length, token)) = self.match_token(rest) else {
                return Err(Error::Parse {
                    expression: expression.to_string(),
                    stack: format!("lexing stalled at {rest:?}"),
                });
            };

            let token = resolve_star(token, tokens.last());
            let token = demote_operator_name(token, tokens.last());
            trace!("lexed {token}");

            tokens.push(token);
            rest = rest[length..].trim_start();
        }

        Ok(tokens)
    }

    /// Longest match across every rule; earlier rules win ties, so the
    /// operator keywords beat the name rule and axis names beat both.
    fn match_token(&self, rest: &str) -> Option<(usize, Token)> {
        let mut best: Option<(usize, Token)> = None;

        if let Some(caps) = self.pi_test.captures(rest) {
            let target = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string());
            offer(&mut best, caps[0].len(), Token::PiTest(target));
        }

        if let Some(caps) = self.node_type_open.captures(rest) {
            let kind = match &caps[1] {
                "node" => NodeTypeKind::Node,
                "text" => NodeTypeKind::Text,
                _ => NodeTypeKind::Comment,
            };
            offer(&mut best, caps[0].len(), Token::NodeTypeOpen(kind));
        }

        // An axis name is only an axis name when '::' follows.
        for (name, axis) in &AXIS_NAMES {
            if rest.starts_with(name)
                && rest[name.len()..].trim_start().starts_with("::")
            {
                offer(&mut best, name.len(), Token::AxisName(*axis));
                break;
            }
        }

        if let Some(m) = self.named_operator.find(rest) {
            let token = match m.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "mod" => Token::Mod,
                _ => Token::Div,
            };
            offer(&mut best, m.len(), token);
        }

        if let Some(m) = self.number.find(rest) {
            if let Ok(value) = m.as_str().parse() {
                offer(&mut best, m.len(), Token::Number(value));
            }
        }

        if let Some(caps) = self.literal.captures(rest) {
            let value = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            offer(&mut best, caps[0].len(), Token::Literal(value));
        }

        if let Some(m) = self.namespace_wildcard.find(rest) {
            let prefix = m.as_str().trim_end_matches(":*").to_string();
            offer(&mut best, m.len(), Token::NamespaceWildcard(prefix));
        }

        if let Some(m) = self.qname.find(rest) {
            offer(&mut best, m.len(), Token::QName(m.as_str().to_string()));
        }

        for (text, token) in &DOUBLE_CHAR_TOKENS {
            if rest.starts_with(text) {
                offer(&mut best, text.len(), token.clone());
                break;
            }
        }

        for (text, token) in &SINGLE_CHAR_TOKENS {
            if rest.starts_with(text) {
                offer(&mut best, text.len(), token.clone());
                break;
            }
        }

        best
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

fn offer(best: &mut Option<(usize, Token)>, length: usize, token: Token) {
    if best.as_ref().map_or(true, |(len, _)| length > *len) {
        *best = Some((length, token));
    }
}

/// https://www.w3.org/TR/1999/REC-xpath-19991116/#exprlex rule 1: a
/// '*' is the multiply operator only when something operand-like
/// precedes it; at the start of the expression or after `@ :: ( [ ,
/// $` or another operator it is the wildcard name test.
fn resolve_star(token: Token, previous: Option<&Token>) -> Token {
    if !matches!(token, Token::Star) {
        return token;
    }

    let Some(previous) = previous else {
        return Token::Star;
    };

    let wildcard_position = matches!(
        previous,
        Token::At
            | Token::AxisSeparator
            | Token::LeftParen
            | Token::LeftBracket
            | Token::Comma
            | Token::Dollar
            | Token::Or
            | Token::And
            | Token::Equal
            | Token::NotEqual
            | Token::LessThan
            | Token::LessThanOrEqual
            | Token::GreaterThan
            | Token::GreaterThanOrEqual
            | Token::Plus
            | Token::Minus
            | Token::Multiply
            | Token::Div
            | Token::Mod
            | Token::Pipe
            | Token::Slash
            | Token::DoubleSlash
    );

    if wildcard_position {
        Token::Star
    } else {
        Token::Multiply
    }
}

/// Operator keywords alias as names when nothing operand-like precedes
/// them: at the start of the expression or right after `@ :: / // $`.
fn demote_operator_name(token: Token, previous: Option<&Token>) -> Token {
    let is_keyword = matches!(
        token,
        Token::And | Token::Or | Token::Div | Token::Mod
    );
    if !is_keyword {
        return token;
    }

    let after_path_glue = match previous {
        None => true,
        Some(p) => matches!(
            p,
            Token::At
                | Token::AxisSeparator
                | Token::Slash
                | Token::DoubleSlash
                | Token::Dollar
        ),
    };

    if after_path_glue {
        Token::QName(token.to_string())
    } else {
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;

    fn lex(s: &str) -> Vec<Token> {
        Lexer::new().tokenize(s).unwrap()
    }

    #[test]
    fn punctuation_prefers_the_longest_match() {
        assert_eq!(
            lex("//a"),
            [Token::DoubleSlash, Token::QName("a".into())]
        );
        assert_eq!(lex(".."), [Token::DotDot]);
        assert_eq!(
            lex("a<=2"),
            [
                Token::QName("a".into()),
                Token::LessThanOrEqual,
                Token::Number(2.0)
            ]
        );
    }

    #[test]
    fn axis_names_need_the_separator() {
        assert_eq!(
            lex("child::a"),
            [
                Token::AxisName(Axis::Child),
                Token::AxisSeparator,
                Token::QName("a".into())
            ]
        );
        // Without '::' the same word is an element name.
        assert_eq!(
            lex("child/a"),
            [
                Token::QName("child".into()),
                Token::Slash,
                Token::QName("a".into())
            ]
        );
        assert_eq!(
            lex("ancestor-or-self::*"),
            [
                Token::AxisName(Axis::AncestorOrSelf),
                Token::AxisSeparator,
                Token::Star
            ]
        );
    }

    #[test]
    fn operator_keywords_demote_after_path_glue() {
        assert_eq!(
            lex("div/and"),
            [
                Token::QName("div".into()),
                Token::Slash,
                Token::QName("and".into())
            ]
        );
        assert_eq!(
            lex("child::and"),
            [
                Token::AxisName(Axis::Child),
                Token::AxisSeparator,
                Token::QName("and".into())
            ]
        );
        assert_eq!(
            lex("a and b"),
            [
                Token::QName("a".into()),
                Token::And,
                Token::QName("b".into())
            ]
        );
        // Keywords embedded in longer names stay names.
        assert_eq!(lex("a android"), [
            Token::QName("a".into()),
            Token::QName("android".into())
        ]);
    }

    #[test]
    fn node_type_tests() {
        assert_eq!(
            lex("text()"),
            [Token::NodeTypeOpen(NodeTypeKind::Text), Token::RightParen]
        );
        assert_eq!(
            lex("processing-instruction('xml-stylesheet')"),
            [Token::PiTest(Some("xml-stylesheet".into()))]
        );
        assert_eq!(lex("processing-instruction()"), [Token::PiTest(None)]);
        // An element actually named 'text' is still reachable.
        assert_eq!(lex("text"), [Token::QName("text".into())]);
    }

    #[test]
    fn numbers_literals_and_wildcards() {
        assert_eq!(lex("1.5"), [Token::Number(1.5)]);
        assert_eq!(lex(".5"), [Token::Number(0.5)]);
        assert_eq!(lex("'it'"), [Token::Literal("it".into())]);
        assert_eq!(lex("\"q\""), [Token::Literal("q".into())]);
        assert_eq!(lex("ns:*"), [Token::NamespaceWildcard("ns".into())]);
        assert_eq!(lex("ns:local"), [Token::QName("ns:local".into())]);
    }

    #[test]
    fn star_is_contextual() {
        assert_eq!(
            lex("2*3"),
            [Token::Number(2.0), Token::Multiply, Token::Number(3.0)]
        );
        assert_eq!(lex("@*"), [Token::At, Token::Star]);
        assert_eq!(
            lex("a/*"),
            [Token::QName("a".into()), Token::Slash, Token::Star]
        );
        assert_eq!(lex("*"), [Token::Star]);
        // Wildcard times wildcard.
        assert_eq!(lex("* * *"), [Token::Star, Token::Multiply, Token::Star]);
    }

    #[test]
    fn non_latin_names_lex_as_names() {
        assert_eq!(lex("αβγ"), [Token::QName("αβγ".into())]);
        assert_eq!(
            lex("//数据"),
            [Token::DoubleSlash, Token::QName("数据".into())]
        );
    }
}
