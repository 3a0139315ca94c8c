// https://www.w3.org/TR/1999/REC-xpath-19991116/#exprgrammar
//
// The grammar is data: each rule is a target non-terminal, a
// quantified right-hand pattern, a precedence and a reduction action.
// The engine below matches rules against the top of the parse stack —
// rules are pre-sorted longest first and binned by the symbol their
// pattern can end with, so candidate lookup is one map probe.

use std::collections::HashMap;

use tracing::trace;

use crate::axis::Axis;
use crate::expr::{BinaryOp, Expr, LocationPath, Step};
use crate::nodetest::{NameTest, NodeTest};
use crate::tokens::{NodeTypeKind, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonTerm {
    LocationPath,
    RelativeLocationPath,
    AbsoluteLocationPath,
    Step,
    NodeTest,
    Predicate,
    Literal,
    Number,
    VariableReference,
    PrimaryExpr,
    FunctionCall,
    ArgumentRemainder,
    FilterExpr,
    PathExpr,
    UnionExpr,
    Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sym {
    Token(TokenKind),
    Rule(NonTerm),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quant {
    One,
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

#[derive(Debug, Clone, Copy)]
pub struct Pat {
    pub sym: Sym,
    pub quant: Quant,
}

fn t(kind: TokenKind) -> Pat {
    Pat {
        sym: Sym::Token(kind),
        quant: Quant::One,
    }
}

fn n(target: NonTerm) -> Pat {
    Pat {
        sym: Sym::Rule(target),
        quant: Quant::One,
    }
}

fn many(target: NonTerm) -> Pat {
    Pat {
        sym: Sym::Rule(target),
        quant: Quant::ZeroOrMore,
    }
}

/// Semantic-value constructor for a rule, applied to the popped frames.
#[derive(Debug, Clone, Copy)]
pub enum Action {
    PassThrough,
    AbsoluteSlash,
    AbsoluteDoubleSlash,
    RootOnly,
    RootDescendants,
    RelativeFromStep,
    RelativeSlashStep,
    RelativeDoubleSlashStep,
    StepSelf,
    StepParent,
    StepAxisNodeTest,
    StepAttributeNodeTest,
    StepNodeTest,
    StepPredicate,
    NodeTestStar,
    NodeTestNamespaceWildcard,
    NodeTestQName,
    NodeTestNodeType,
    NodeTestPi,
    PredicateExpr,
    LiteralValue,
    NumberValue,
    VariableRef,
    PrimaryParen,
    FunctionCallEmpty,
    FunctionCallArgs,
    ArgumentNext,
    FilterPredicates,
    PathFromLocation,
    PathFilterSlashRel,
    PathFilterDoubleSlashRel,
    UnionPipe,
    Negate,
    Binary(BinaryOp),
}

pub struct Rule {
    pub target: NonTerm,
    pub pattern: Vec<Pat>,
    /// Declared precedence; -1 derives the value from the highest
    /// precedence among the matched tokens.
    pub precedence: i32,
    pub action: Action,
}

#[derive(Debug)]
pub enum StackValue {
    Token(Token),
    Expr(Expr),
    Path(LocationPath),
    Step(Step),
    Test(NodeTest),
}

#[derive(Debug)]
pub struct Frame {
    pub sym: Sym,
    pub value: StackValue,
}

impl Frame {
    pub fn shift(token: Token) -> Self {
        Frame {
            sym: Sym::Token(token.kind()),
            value: StackValue::Token(token),
        }
    }

    pub fn describe(&self) -> String {
        match (&self.sym, &self.value) {
            (Sym::Token(_), StackValue::Token(token)) => format!("{token}"),
            (Sym::Rule(nt), _) => format!("{nt:?}"),
            (Sym::Token(kind), _) => format!("{kind:?}"),
        }
    }
}

pub struct Grammar {
    rules: Vec<Rule>,
    /// Rule indices keyed by the symbol a pattern can end with, longest
    /// pattern first.
    bins: HashMap<Sym, Vec<usize>>,
}

impl Grammar {
    pub fn new() -> Self {
        use NonTerm::*;
        use TokenKind as T;

        let rule = |target, pattern, precedence, action| Rule {
            target,
            pattern,
            precedence,
            action,
        };

        let mut rules = vec![
            rule(LocationPath, vec![n(RelativeLocationPath)], 18, Action::PassThrough),
            rule(LocationPath, vec![n(AbsoluteLocationPath)], 18, Action::PassThrough),
            rule(
                AbsoluteLocationPath,
                vec![t(T::Slash), n(RelativeLocationPath)],
                18,
                Action::AbsoluteSlash,
            ),
            rule(
                AbsoluteLocationPath,
                vec![t(T::DoubleSlash), n(RelativeLocationPath)],
                18,
                Action::AbsoluteDoubleSlash,
            ),
            rule(AbsoluteLocationPath, vec![t(T::Slash)], 0, Action::RootOnly),
            rule(
                AbsoluteLocationPath,
                vec![t(T::DoubleSlash)],
                0,
                Action::RootDescendants,
            ),
            rule(RelativeLocationPath, vec![n(Step)], 31, Action::RelativeFromStep),
            rule(
                RelativeLocationPath,
                vec![n(RelativeLocationPath), t(T::Slash), n(Step)],
                31,
                Action::RelativeSlashStep,
            ),
            rule(
                RelativeLocationPath,
                vec![n(RelativeLocationPath), t(T::DoubleSlash), n(Step)],
                31,
                Action::RelativeDoubleSlashStep,
            ),
            rule(Step, vec![t(T::Dot)], 33, Action::StepSelf),
            rule(Step, vec![t(T::DotDot)], 33, Action::StepParent),
            rule(
                Step,
                vec![t(T::AxisName), t(T::AxisSeparator), n(NodeTest)],
                33,
                Action::StepAxisNodeTest,
            ),
            rule(
                Step,
                vec![t(T::At), n(NodeTest)],
                33,
                Action::StepAttributeNodeTest,
            ),
            rule(Step, vec![n(NodeTest)], 33, Action::StepNodeTest),
            rule(Step, vec![n(Step), n(Predicate)], 33, Action::StepPredicate),
            rule(NodeTest, vec![t(T::Star)], 33, Action::NodeTestStar),
            rule(
                NodeTest,
                vec![t(T::NamespaceWildcard)],
                33,
                Action::NodeTestNamespaceWildcard,
            ),
            rule(NodeTest, vec![t(T::QName)], 33, Action::NodeTestQName),
            rule(
                NodeTest,
                vec![t(T::NodeTypeOpen), t(T::RightParen)],
                33,
                Action::NodeTestNodeType,
            ),
            rule(NodeTest, vec![t(T::PiTest)], 33, Action::NodeTestPi),
            rule(
                Predicate,
                vec![t(T::LeftBracket), n(Expr), t(T::RightBracket)],
                33,
                Action::PredicateExpr,
            ),
            rule(Literal, vec![t(T::Literal)], -1, Action::LiteralValue),
            rule(Number, vec![t(T::Number)], -1, Action::NumberValue),
            rule(
                VariableReference,
                vec![t(T::Dollar), t(T::QName)],
                36,
                Action::VariableRef,
            ),
            rule(PrimaryExpr, vec![n(VariableReference)], 33, Action::PassThrough),
            rule(
                PrimaryExpr,
                vec![t(T::LeftParen), n(Expr), t(T::RightParen)],
                33,
                Action::PrimaryParen,
            ),
            rule(PrimaryExpr, vec![n(Literal)], 30, Action::PassThrough),
            rule(PrimaryExpr, vec![n(Number)], 30, Action::PassThrough),
            rule(PrimaryExpr, vec![n(FunctionCall)], 31, Action::PassThrough),
            rule(
                FunctionCall,
                vec![t(T::QName), t(T::LeftParen), t(T::RightParen)],
                -1,
                Action::FunctionCallEmpty,
            ),
            rule(
                FunctionCall,
                vec![
                    t(T::QName),
                    t(T::LeftParen),
                    n(Expr),
                    many(ArgumentRemainder),
                    t(T::RightParen),
                ],
                -1,
                Action::FunctionCallArgs,
            ),
            // Low but non-zero: an argument folds when ',' or ')' is
            // next, never while an operator can still extend it.
            rule(
                ArgumentRemainder,
                vec![t(T::Comma), n(Expr)],
                1,
                Action::ArgumentNext,
            ),
            rule(
                FilterExpr,
                vec![n(PrimaryExpr), many(Predicate)],
                31,
                Action::FilterPredicates,
            ),
            rule(PathExpr, vec![n(LocationPath)], 20, Action::PathFromLocation),
            rule(PathExpr, vec![n(FilterExpr)], 19, Action::PassThrough),
            rule(
                PathExpr,
                vec![n(FilterExpr), t(T::Slash), n(RelativeLocationPath)],
                19,
                Action::PathFilterSlashRel,
            ),
            rule(
                PathExpr,
                vec![n(FilterExpr), t(T::DoubleSlash), n(RelativeLocationPath)],
                19,
                Action::PathFilterDoubleSlashRel,
            ),
            rule(UnionExpr, vec![n(PathExpr)], 20, Action::PassThrough),
            rule(
                UnionExpr,
                vec![n(UnionExpr), t(T::Pipe), n(PathExpr)],
                20,
                Action::UnionPipe,
            ),
            rule(Expr, vec![n(UnionExpr)], 16, Action::PassThrough),
            rule(Expr, vec![t(T::Minus), n(Expr)], -1, Action::Negate),
        ];

        let binary_ops = [
            (T::Or, BinaryOp::Or),
            (T::And, BinaryOp::And),
            (T::Equal, BinaryOp::Equal),
            (T::NotEqual, BinaryOp::NotEqual),
            (T::LessThan, BinaryOp::LessThan),
            (T::LessThanOrEqual, BinaryOp::LessThanOrEqual),
            (T::GreaterThan, BinaryOp::GreaterThan),
            (T::GreaterThanOrEqual, BinaryOp::GreaterThanOrEqual),
            (T::Plus, BinaryOp::Add),
            (T::Minus, BinaryOp::Subtract),
            (T::Multiply, BinaryOp::Multiply),
            (T::Div, BinaryOp::Divide),
            (T::Mod, BinaryOp::Modulo),
        ];
        for (token, op) in binary_ops {
            rules.push(rule(
                Expr,
                vec![n(Expr), t(token), n(Expr)],
                -1,
                Action::Binary(op),
            ));
        }

        let mut bins: HashMap<Sym, Vec<usize>> = HashMap::new();
        for (index, r) in rules.iter().enumerate() {
            for key in bin_keys(&r.pattern) {
                bins.entry(key).or_default().push(index);
            }
        }
        for indices in bins.values_mut() {
            indices.sort_by_key(|&i| std::cmp::Reverse(rules[i].pattern.len()));
        }

        Grammar { rules, bins }
    }

    /// One reduction attempt. The first (longest) rule whose pattern
    /// matches the stack top is the candidate; it reduces when the
    /// lookahead is exhausted, when it outranks the lookahead, or when a
    /// left-associative lookahead ties it.
    pub fn reduce(&self, stack: &mut Vec<Frame>, ahead: Option<TokenKind>) -> bool {
        let Some(top) = stack.last() else {
            return false;
        };
        let Some(bin) = self.bins.get(&top.sym) else {
            return false;
        };

        for &index in bin {
            let rule = &self.rules[index];
            let Some(count) = match_pattern(&rule.pattern, stack) else {
                continue;
            };

            let precedence = if rule.precedence >= 0 {
                rule.precedence
            } else {
                stack[stack.len() - count..]
                    .iter()
                    .filter_map(|f| match f.sym {
                        Sym::Token(kind) => Some(kind.precedence()),
                        Sym::Rule(_) => None,
                    })
                    .max()
                    .unwrap_or(0)
            };

            let should_reduce = match ahead {
                None => true,
                Some(kind) => {
                    precedence > kind.precedence()
                        || (kind.is_left_associative() && precedence >= kind.precedence())
                }
            };
            if !should_reduce {
                // The matched candidate defers to the lookahead.
                return false;
            }

            let matched = stack.split_off(stack.len() - count);
            trace!("reduce {:?} from {} frame(s)", rule.target, count);
            let value = apply(rule.action, matched);
            stack.push(Frame {
                sym: Sym::Rule(rule.target),
                value,
            });
            return true;
        }

        false
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbols a pattern can end with: walking backwards, every quantified
/// element that may match zero frames exposes the element before it.
fn bin_keys(pattern: &[Pat]) -> Vec<Sym> {
    let mut keys = Vec::new();
    for pat in pattern.iter().rev() {
        keys.push(pat.sym);
        match pat.quant {
            Quant::Optional | Quant::ZeroOrMore => continue,
            Quant::One | Quant::OneOrMore => break,
        }
    }
    keys
}

/// Greedy right-to-left match of `pattern` against the stack top.
/// Quantifiers take the maximal run, without backtracking. Returns the
/// number of frames matched.
fn match_pattern(pattern: &[Pat], stack: &[Frame]) -> Option<usize> {
    let mut position = stack.len();

    for pat in pattern.iter().rev() {
        match pat.quant {
            Quant::One => {
                if position == 0 || stack[position - 1].sym != pat.sym {
                    return None;
                }
                position -= 1;
            }
            Quant::Optional => {
                if position > 0 && stack[position - 1].sym == pat.sym {
                    position -= 1;
                }
            }
            Quant::ZeroOrMore => {
                while position > 0 && stack[position - 1].sym == pat.sym {
                    position -= 1;
                }
            }
            Quant::OneOrMore => {
                let mut matched = 0;
                while position > 0 && stack[position - 1].sym == pat.sym {
                    position -= 1;
                    matched += 1;
                }
                if matched == 0 {
                    return None;
                }
            }
        }
    }

    let count = stack.len() - position;
    (count > 0).then_some(count)
}

// Reduction actions. The patterns fix the frame shapes, so the
// extractors below treat anything else as a grammar bug.

fn take_expr(frame: Frame) -> Expr {
    match frame.value {
        StackValue::Expr(e) => e,
        other => unreachable!("expected expression frame, got {other:?}"),
    }
}

fn take_path(frame: Frame) -> LocationPath {
    match frame.value {
        StackValue::Path(p) => p,
        other => unreachable!("expected path frame, got {other:?}"),
    }
}

fn take_step(frame: Frame) -> Step {
    match frame.value {
        StackValue::Step(s) => s,
        other => unreachable!("expected step frame, got {other:?}"),
    }
}

fn take_test(frame: Frame) -> NodeTest {
    match frame.value {
        StackValue::Test(t) => t,
        other => unreachable!("expected node-test frame, got {other:?}"),
    }
}

fn take_token(frame: Frame) -> Token {
    match frame.value {
        StackValue::Token(t) => t,
        other => unreachable!("expected token frame, got {other:?}"),
    }
}

fn qname_text(frame: Frame) -> String {
    match take_token(frame) {
        Token::QName(name) => name,
        other => unreachable!("expected name token, got {other}"),
    }
}

fn name_test(text: &str) -> NodeTest {
    match text.split_once(':') {
        Some((prefix, local)) => NodeTest::Name(NameTest {
            prefix: Some(prefix.to_string()),
            local: local.to_string(),
        }),
        None => NodeTest::Name(NameTest {
            prefix: None,
            local: text.to_string(),
        }),
    }
}

fn pop(frames: &mut std::vec::IntoIter<Frame>) -> Frame {
    frames.next().expect("pattern guarantees frame count")
}

fn apply(action: Action, frames: Vec<Frame>) -> StackValue {
    let mut frames = frames.into_iter();

    match action {
        Action::PassThrough => pop(&mut frames).value,

        Action::AbsoluteSlash => {
            let _slash = pop(&mut frames);
            let mut path = take_path(pop(&mut frames));
            path.absolute = true;
            StackValue::Path(path)
        }

        Action::AbsoluteDoubleSlash => {
            let _slash = pop(&mut frames);
            let mut path = take_path(pop(&mut frames));
            path.absolute = true;
            path.steps.insert(0, LocationPath::descendant_or_self_step());
            StackValue::Path(path)
        }

        Action::RootOnly => StackValue::Path(LocationPath {
            absolute: true,
            steps: Vec::new(),
        }),

        Action::RootDescendants => StackValue::Path(LocationPath {
            absolute: true,
            steps: vec![LocationPath::descendant_or_self_step()],
        }),

        Action::RelativeFromStep => {
            let mut path = LocationPath::relative();
            path.steps.push(take_step(pop(&mut frames)));
            StackValue::Path(path)
        }

        Action::RelativeSlashStep => {
            let mut path = take_path(pop(&mut frames));
            let _slash = pop(&mut frames);
            path.steps.push(take_step(pop(&mut frames)));
            StackValue::Path(path)
        }

        Action::RelativeDoubleSlashStep => {
            let mut path = take_path(pop(&mut frames));
            let _slash = pop(&mut frames);
            path.steps.push(LocationPath::descendant_or_self_step());
            path.steps.push(take_step(pop(&mut frames)));
            StackValue::Path(path)
        }

        Action::StepSelf => {
            StackValue::Step(Step::new(Axis::SelfAxis, NodeTest::Node))
        }

        Action::StepParent => StackValue::Step(Step::new(Axis::Parent, NodeTest::Node)),

        Action::StepAxisNodeTest => {
            let axis = match take_token(pop(&mut frames)) {
                Token::AxisName(axis) => axis,
                other => unreachable!("expected axis token, got {other}"),
            };
            let _separator = pop(&mut frames);
            StackValue::Step(Step::new(axis, take_test(pop(&mut frames))))
        }

        Action::StepAttributeNodeTest => {
            let _at = pop(&mut frames);
            StackValue::Step(Step::new(Axis::Attribute, take_test(pop(&mut frames))))
        }

        Action::StepNodeTest => {
            StackValue::Step(Step::new(Axis::Child, take_test(pop(&mut frames))))
        }

        Action::StepPredicate => {
            let mut step = take_step(pop(&mut frames));
            step.push_predicate(take_expr(pop(&mut frames)));
            StackValue::Step(step)
        }

        Action::NodeTestStar => StackValue::Test(NodeTest::Any),

        Action::NodeTestNamespaceWildcard => match take_token(pop(&mut frames)) {
            Token::NamespaceWildcard(prefix) => {
                StackValue::Test(NodeTest::NamespaceWildcard(prefix))
            }
            other => unreachable!("expected namespace wildcard, got {other}"),
        },

        Action::NodeTestQName => StackValue::Test(name_test(&qname_text(pop(&mut frames)))),

        Action::NodeTestNodeType => {
            let kind = match take_token(pop(&mut frames)) {
                Token::NodeTypeOpen(kind) => kind,
                other => unreachable!("expected node-type opener, got {other}"),
            };
            StackValue::Test(match kind {
                NodeTypeKind::Node => NodeTest::Node,
                NodeTypeKind::Text => NodeTest::Text,
                NodeTypeKind::Comment => NodeTest::Comment,
            })
        }

        Action::NodeTestPi => match take_token(pop(&mut frames)) {
            Token::PiTest(target) => {
                StackValue::Test(NodeTest::ProcessingInstruction(target))
            }
            other => unreachable!("expected processing-instruction test, got {other}"),
        },

        Action::PredicateExpr => {
            let _open = pop(&mut frames);
            StackValue::Expr(take_expr(pop(&mut frames)))
        }

        Action::LiteralValue => match take_token(pop(&mut frames)) {
            Token::Literal(text) => StackValue::Expr(Expr::Literal(text)),
            other => unreachable!("expected literal token, got {other}"),
        },

        Action::NumberValue => match take_token(pop(&mut frames)) {
            Token::Number(value) => StackValue::Expr(Expr::Number(value)),
            other => unreachable!("expected number token, got {other}"),
        },

        Action::VariableRef => {
            let _dollar = pop(&mut frames);
            StackValue::Expr(Expr::Variable(qname_text(pop(&mut frames))))
        }

        Action::PrimaryParen => {
            let _open = pop(&mut frames);
            StackValue::Expr(take_expr(pop(&mut frames)))
        }

        Action::FunctionCallEmpty => {
            let name = qname_text(pop(&mut frames));
            StackValue::Expr(Expr::FunctionCall {
                name,
                args: Vec::new(),
            })
        }

        Action::FunctionCallArgs => {
            let name = qname_text(pop(&mut frames));
            let _open = pop(&mut frames);
            let mut args = vec![take_expr(pop(&mut frames))];
            let mut remainder: Vec<Frame> = frames.collect();
            // The trailing ')' is the last frame.
            remainder.pop();
            for frame in remainder {
                args.push(take_expr(frame));
            }
            StackValue::Expr(Expr::FunctionCall { name, args })
        }

        Action::ArgumentNext => {
            let _comma = pop(&mut frames);
            StackValue::Expr(take_expr(pop(&mut frames)))
        }

        Action::FilterPredicates => {
            let primary = take_expr(pop(&mut frames));
            let predicates: Vec<Expr> = frames.map(take_expr).collect();
            if predicates.is_empty() {
                StackValue::Expr(primary)
            } else {
                StackValue::Expr(Expr::Filter {
                    primary: Box::new(primary),
                    predicates,
                })
            }
        }

        Action::PathFromLocation => {
            StackValue::Expr(Expr::Location(take_path(pop(&mut frames))))
        }

        Action::PathFilterSlashRel => {
            let filter = take_expr(pop(&mut frames));
            let _slash = pop(&mut frames);
            StackValue::Expr(Expr::Path {
                filter: Box::new(filter),
                rel: take_path(pop(&mut frames)),
            })
        }

        Action::PathFilterDoubleSlashRel => {
            let filter = take_expr(pop(&mut frames));
            let _slash = pop(&mut frames);
            let mut rel = take_path(pop(&mut frames));
            rel.steps.insert(0, LocationPath::descendant_or_self_step());
            StackValue::Expr(Expr::Path {
                filter: Box::new(filter),
                rel,
            })
        }

        Action::UnionPipe => {
            let left = take_expr(pop(&mut frames));
            let _pipe = pop(&mut frames);
            let right = take_expr(pop(&mut frames));
            StackValue::Expr(Expr::Union(Box::new(left), Box::new(right)))
        }

        Action::Negate => {
            let _minus = pop(&mut frames);
            StackValue::Expr(Expr::Negate(Box::new(take_expr(pop(&mut frames)))))
        }

        Action::Binary(op) => {
            let left = take_expr(pop(&mut frames));
            let _op = pop(&mut frames);
            let right = take_expr(pop(&mut frames));
            StackValue::Expr(Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            })
        }
    }
}
