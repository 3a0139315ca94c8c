// https://www.w3.org/TR/1999/REC-xpath-19991116/#section-Basics
//
// Bottom-up shift/reduce parsing over the grammar table. The driver is
// small: lex a lookahead, reduce while a matched rule outranks it,
// otherwise shift. Three textual fast paths skip the machinery for the
// shapes that dominate real query streams, and parsed expressions are
// cached per parser instance by their source text.

use std::collections::HashMap;
use std::rc::Rc;

use regex::Regex;
use tracing::{debug, trace};

use crate::axis::Axis;
use crate::context::Context;
use crate::expr::{Expr, LocationPath, Step};
use crate::grammar::{Frame, Grammar, StackValue};
use crate::lexer::Lexer;
use crate::nodetest::{NameTest, NodeTest};
use crate::result::{Error, Result};
use crate::tokens::Token;
use crate::value::Value;

/// Per-instance instrumentation; the counters reset with the parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserStats {
    pub parses: u64,
    pub cache_hits: u64,
    pub fast_path_hits: u64,
}

pub struct XPathParser {
    lexer: Lexer,
    grammar: Grammar,
    cache: HashMap<String, Rc<Expr>>,
    stats: ParserStats,
    fast_integer: Regex,
    fast_name: Regex,
    fast_chain: Regex,
}

impl XPathParser {
    pub fn new() -> Self {
        XPathParser {
            lexer: Lexer::new(),
            grammar: Grammar::new(),
            cache: HashMap::new(),
            stats: ParserStats::default(),
            fast_integer: Regex::new(r"^\d+$").expect("static fast-path rule"),
            fast_name: Regex::new(r"^([$@])?(\w+)$").expect("static fast-path rule"),
            fast_chain: Regex::new(r"^(/?)\w+(?:/\w+)*$").expect("static fast-path rule"),
        }
    }

    /// Parse `expression`, consulting and filling the per-instance
    /// cache. The cache is only written on success, so a failed parse
    /// leaves no trace.
    pub fn parse(&mut self, expression: &str) -> Result<Rc<Expr>> {
        if let Some(cached) = self.cache.get(expression) {
            self.stats.cache_hits += 1;
            debug!("cache hit for {expression:?}");
            return Ok(Rc::clone(cached));
        }

        let parsed = Rc::new(self.parse_uncached(expression)?);
        self.stats.parses += 1;
        self.cache
            .insert(expression.to_string(), Rc::clone(&parsed));
        Ok(parsed)
    }

    /// Parse and evaluate in one call.
    pub fn eval<'d>(&mut self, expression: &str, ctx: &Context<'d>) -> Result<Value<'d>> {
        self.parse(expression)?.evaluate(ctx)
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    fn parse_uncached(&mut self, expression: &str) -> Result<Expr> {
        let trimmed = expression.trim();

        if let Some(fast) = self.try_fast_path(trimmed) {
            self.stats.fast_path_hits += 1;
            debug!("fast path for {expression:?}");
            return Ok(fast);
        }

        let tokens = self.lexer.tokenize(expression)?;
        self.run(expression, tokens)
    }

    /// The common shapes of machine-generated queries skip the grammar:
    /// a bare name, attribute or variable, a pure integer, and a
    /// slash-separated chain of plain names.
    fn try_fast_path(&self, expression: &str) -> Option<Expr> {
        if self.fast_integer.is_match(expression) {
            return Some(Expr::Number(expression.parse().ok()?));
        }

        if let Some(caps) = self.fast_name.captures(expression) {
            let name = caps.get(2)?.as_str();
            return Some(match caps.get(1).map(|m| m.as_str()) {
                Some("$") => Expr::Variable(name.to_string()),
                Some(_) => Expr::Location(LocationPath {
                    absolute: false,
                    steps: vec![Step::new(Axis::Attribute, plain_name_test(name))],
                }),
                None => Expr::Location(LocationPath {
                    absolute: false,
                    steps: vec![Step::new(Axis::Child, plain_name_test(name))],
                }),
            });
        }

        if let Some(caps) = self.fast_chain.captures(expression) {
            let absolute = !caps.get(1)?.as_str().is_empty();
            if !absolute && !expression.contains('/') {
                return None;
            }
            let steps = expression
                .trim_start_matches('/')
                .split('/')
                .map(|name| Step::new(Axis::Child, plain_name_test(name)))
                .collect();
            return Some(Expr::Location(LocationPath { absolute, steps }));
        }

        None
    }

    fn run(&self, expression: &str, tokens: Vec<Token>) -> Result<Expr> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut input = tokens.into_iter().peekable();

        loop {
            let ahead = input.peek().map(|t| t.kind());
            if self.grammar.reduce(&mut stack, ahead) {
                continue;
            }
            match input.next() {
                Some(token) => {
                    trace!("shift {token}");
                    stack.push(Frame::shift(token));
                }
                None => break,
            }
        }

        if stack.len() == 1 && matches!(stack[0].value, StackValue::Expr(_)) {
            if let Some(Frame {
                value: StackValue::Expr(expr),
                ..
            }) = stack.pop()
            {
                return Ok(expr);
            }
        }

        Err(Error::Parse {
            expression: expression.to_string(),
            stack: dump_stack(&stack),
        })
    }
}

impl Default for XPathParser {
    fn default() -> Self {
        Self::new()
    }
}

fn plain_name_test(name: &str) -> NodeTest {
    NodeTest::Name(NameTest {
        prefix: None,
        local: name.to_string(),
    })
}

fn dump_stack(stack: &[Frame]) -> String {
    stack
        .iter()
        .map(Frame::describe)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;
    use crate::tokens::NodeTypeKind;

    fn parse(expression: &str) -> Rc<Expr> {
        XPathParser::new().parse(expression).unwrap()
    }

    fn location(expr: &Expr) -> &LocationPath {
        match expr {
            Expr::Location(path) => path,
            other => panic!("expected a location path, got {other:?}"),
        }
    }

    #[test]
    fn bare_names_and_chains_take_the_fast_path() {
        let mut parser = XPathParser::new();

        let expr = parser.parse("foo").unwrap();
        let path = location(&expr);
        assert!(!path.absolute);
        assert_eq!(path.steps.len(), 1);
        assert_eq!(path.steps[0].axis, Axis::Child);

        let expr = parser.parse("@lat").unwrap();
        assert_eq!(location(&expr).steps[0].axis, Axis::Attribute);

        let expr = parser.parse("$x").unwrap();
        assert!(matches!(&*expr, Expr::Variable(name) if name == "x"));

        let expr = parser.parse("42").unwrap();
        assert!(matches!(&*expr, Expr::Number(n) if *n == 42.0));

        let expr = parser.parse("/page/request/q").unwrap();
        let path = location(&expr);
        assert!(path.absolute);
        assert_eq!(path.steps.len(), 3);

        assert_eq!(parser.stats().fast_path_hits, 5);
    }

    #[test]
    fn absolute_and_abbreviated_paths() {
        let expr = parse("/");
        let path = location(&expr);
        assert!(path.absolute);
        assert!(path.steps.is_empty());

        // '//a' expands to descendant-or-self::node()/child::a.
        let expr = parse("//a[1]");
        let path = location(&expr);
        assert!(path.absolute);
        assert_eq!(path.steps.len(), 2);
        assert_eq!(path.steps[0].axis, Axis::DescendantOrSelf);
        assert_eq!(path.steps[0].node_test, NodeTest::Node);
        assert_eq!(path.steps[1].axis, Axis::Child);
        assert!(path.steps[1].has_positional_predicate);

        // 'a//b' carries the same expansion in the middle.
        let expr = parse("a//b");
        assert_eq!(location(&expr).steps.len(), 3);
    }

    #[test]
    fn axes_and_node_tests() {
        let expr = parse("ancestor-or-self::div");
        let path = location(&expr);
        assert_eq!(path.steps[0].axis, Axis::AncestorOrSelf);

        let expr = parse("child::text()");
        assert_eq!(location(&expr).steps[0].node_test, NodeTest::Text);

        let expr = parse("self::node()");
        assert_eq!(location(&expr).steps[0].node_test, NodeTest::Node);

        let expr = parse("processing-instruction('pi')/..");
        let path = location(&expr);
        assert_eq!(
            path.steps[0].node_test,
            NodeTest::ProcessingInstruction(Some("pi".into()))
        );
        assert_eq!(path.steps[1].axis, Axis::Parent);

        let expr = parse("ns:*");
        assert_eq!(
            location(&expr).steps[0].node_test,
            NodeTest::NamespaceWildcard("ns".into())
        );
    }

    #[test]
    fn operator_precedence_and_associativity() {
        // 2+3*4 keeps the multiplication inner.
        let expr = parse("2+3*4");
        match &*expr {
            Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => {
                assert!(matches!(
                    &**right,
                    Expr::Binary {
                        op: BinaryOp::Multiply,
                        ..
                    }
                ));
            }
            other => panic!("expected addition at the root, got {other:?}"),
        }

        // Left associativity: 4-2-1 is (4-2)-1.
        let expr = parse("4 - 2 - 1");
        match &*expr {
            Expr::Binary {
                op: BinaryOp::Subtract,
                left,
                ..
            } => {
                assert!(matches!(
                    &**left,
                    Expr::Binary {
                        op: BinaryOp::Subtract,
                        ..
                    }
                ));
            }
            other => panic!("expected subtraction at the root, got {other:?}"),
        }

        // 'a or b and c' binds 'and' tighter.
        let expr = parse("a or b and c");
        match &*expr {
            Expr::Binary {
                op: BinaryOp::Or,
                right,
                ..
            } => {
                assert!(matches!(
                    &**right,
                    Expr::Binary {
                        op: BinaryOp::And,
                        ..
                    }
                ));
            }
            other => panic!("expected or at the root, got {other:?}"),
        }
    }

    #[test]
    fn star_is_wildcard_or_multiply_by_context() {
        let expr = parse("child::*");
        assert_eq!(location(&expr).steps[0].node_test, NodeTest::Any);

        let expr = parse("4 * 4");
        assert!(matches!(
            &*expr,
            Expr::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));

        // After an operator a '*' is a wildcard again.
        let expr = parse("a * */b");
        assert!(matches!(
            &*expr,
            Expr::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn function_calls_and_arguments() {
        let expr = parse("concat('a', 'b', 'c')");
        match &*expr {
            Expr::FunctionCall { name, args } => {
                assert_eq!(name, "concat");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected call, got {other:?}"),
        }

        let expr = parse("last()");
        assert!(matches!(
            &*expr,
            Expr::FunctionCall { args, .. } if args.is_empty()
        ));

        let expr = parse("not(position() = 1)");
        assert!(matches!(&*expr, Expr::FunctionCall { .. }));

        let expr = parse("count(//a | //b)");
        match &*expr {
            Expr::FunctionCall { args, .. } => {
                assert!(matches!(args[0], Expr::Union(..)));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn filters_paths_and_unions() {
        let expr = parse("(//a)[2]");
        assert!(matches!(&*expr, Expr::Filter { .. }));

        let expr = parse("$set/a");
        assert!(matches!(&*expr, Expr::Path { .. }));

        let expr = parse("id('x')//b");
        match &*expr {
            Expr::Path { rel, .. } => assert_eq!(rel.steps.len(), 2),
            other => panic!("expected path, got {other:?}"),
        }

        let expr = parse("//a | //b | //c");
        assert!(matches!(&*expr, Expr::Union(..)));
    }

    #[test]
    fn operator_keywords_in_name_position() {
        let expr = parse("div/and");
        let path = location(&expr);
        assert_eq!(path.steps.len(), 2);

        let expr = parse("a div 2");
        assert!(matches!(
            &*expr,
            Expr::Binary {
                op: BinaryOp::Divide,
                ..
            }
        ));
    }

    #[test]
    fn unary_minus() {
        let expr = parse("-5");
        assert!(matches!(&*expr, Expr::Negate(_)));

        let expr = parse("-5 mod 2");
        // The negation folds around the remainder, which is value-equal
        // to negating the dividend under truncated remainder signs.
        match &*expr {
            Expr::Negate(inner) => assert!(matches!(
                &**inner,
                Expr::Binary {
                    op: BinaryOp::Modulo,
                    ..
                }
            )),
            other => panic!("expected negation, got {other:?}"),
        }
    }

    #[test]
    fn node_type_token_variants() {
        assert_eq!(
            Token::NodeTypeOpen(NodeTypeKind::Text).to_string(),
            "text("
        );
    }

    #[test]
    fn cached_parses_are_shared() {
        let mut parser = XPathParser::new();
        let first = parser.parse("//a[@b='c']").unwrap();
        let second = parser.parse("//a[@b='c']").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(parser.stats().cache_hits, 1);
        assert_eq!(parser.stats().parses, 1);
    }

    #[test]
    fn parse_errors_carry_expression_and_stack() {
        let mut parser = XPathParser::new();
        let err = parser.parse("a[").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("XPath parse error a["), "{message}");

        assert!(parser.parse("").is_err());
        assert!(parser.parse("a b").is_err());
        // Failed parses never enter the cache.
        assert_eq!(parser.stats().parses, 0);
    }

    #[test]
    fn parses_a_corpus_of_real_expressions() {
        let corpus = [
            "/",
            "//*",
            "//a",
            ".",
            "..",
            "../@lang",
            "@*",
            "@type",
            "*",
            "para",
            "chapter//para",
            "//olist/item",
            ".//para",
            "child::para",
            "child::*/child::para",
            "child::chapter/descendant::para",
            "/child::doc/child::chapter[position()=5]/child::section[position()=2]",
            "child::para[attribute::type='warning'][position()=5]",
            "child::para[position()=last()-1]",
            "child::*[self::chapter or self::appendix]",
            "following-sibling::chapter[position()=1]",
            "preceding-sibling::chapter[position()=1]",
            "/descendant::figure[position()=42]",
            "ancestor::div",
            "ancestor-or-self::div",
            "descendant-or-self::para",
            "self::para",
            "//element[@id='test']",
            "//*[@id='u1']|//*[@class='u']",
            "count(//*[@id='x'])",
            "count(/page/location/@*)",
            "substring('12345', 1.5, 2.6)",
            "substring-before('1999/04/01', '/')",
            "substring-after('1999/04/01', '19')",
            "string-length('foo')",
            "normalize-space('  a   b  ')",
            "translate('bar', 'abc', 'ABC')",
            "concat('a', 'b', 'c')",
            "starts-with('foo', 'f')",
            "ends-with('foo', 'oo')",
            "matches('ajaxslt', '^AJAX', 'i')",
            "contains(@style, 'display: block')",
            "boolean(0)",
            "not(@disabled)",
            "true()",
            "false()",
            "lang('en')",
            "number('12.5')",
            "sum(//price)",
            "floor(-3.1415)",
            "ceiling(-3.1415)",
            "round(2.5)",
            "position() = last()",
            "1 div 0",
            "-5 mod 2",
            "3 > 2 and 2 > 1",
            "1 < 2 or 2 < 1",
            "price > 9.90",
            "$var/item[2]",
            "(//a)[1]",
            "id('section1')//p",
            "//a[@href][@title]",
            "//div[p[contains(text(), 'Status')]]",
            "//h3[text()='Internal Debrief']",
            "//*[contains(@style,'display: block; top:')]//input[@name='end']",
            "//table[@id='tbl']/tbody/tr/td[6]",
            "//a[contains(.,'Parameter Data Manual Entry')]",
            "//*[@id='MODEL/PLAN']/div[1]/div[2]/button[1]",
            "//text()[normalize-space(.) != '']",
            "processing-instruction()",
            "processing-instruction('xml-stylesheet')",
            "comment()",
            "node()",
            "//名前/子供",
            "//*[@данные='значение']",
        ];

        let mut parser = XPathParser::new();
        for expression in corpus {
            assert!(
                parser.parse(expression).is_ok(),
                "failed to parse {expression:?}"
            );
        }
    }
}
