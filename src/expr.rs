// https://www.w3.org/TR/1999/REC-xpath-19991116/#section-Expressions
//
// The expression tree is one tagged enum with a single evaluate
// dispatch. Node-set producing variants funnel through the step engine
// at the bottom of this file; every node-set leaves evaluation in
// document order with duplicates removed.

use tracing::debug;

use crate::axis::Axis;
use crate::context::Context;
use crate::dom::Node;
use crate::functions::{local_function_name, NUMBER_FUNCTIONS};
use crate::nodetest::NodeTest;
use crate::result::{Error, Result};
use crate::value::{compare, round_half_up, CompareOp, NodeSet, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// One step of a location path. The positional flag is fixed at parse
/// time and decides whether the first-match short-circuit may run.
#[derive(Debug, Clone)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expr>,
    pub has_positional_predicate: bool,
}

impl Step {
    pub fn new(axis: Axis, node_test: NodeTest) -> Self {
        Step {
            axis,
            node_test,
            predicates: Vec::new(),
            has_positional_predicate: false,
        }
    }

    pub fn push_predicate(&mut self, predicate: Expr) {
        self.has_positional_predicate =
            self.has_positional_predicate || is_positional(&predicate);
        self.predicates.push(predicate);
    }
}

#[derive(Debug, Clone)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

impl LocationPath {
    pub fn relative() -> Self {
        LocationPath {
            absolute: false,
            steps: Vec::new(),
        }
    }

    /// The `//` abbreviation expands to this step between its
    /// neighbours.
    pub fn descendant_or_self_step() -> Step {
        Step::new(Axis::DescendantOrSelf, NodeTest::Node)
    }

    fn has_positional_step(&self) -> bool {
        self.steps.iter().any(|s| s.has_positional_predicate)
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Location(LocationPath),
    /// A filter expression continued by a relative path, e.g.
    /// `id('a')/b` or `$set//c`.
    Path {
        filter: Box<Expr>,
        rel: LocationPath,
    },
    /// A primary expression with predicates, e.g. `(//a)[2]`.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
    },
    Union(Box<Expr>, Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    Literal(String),
    Number(f64),
    Variable(String),
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn evaluate<'d>(&self, ctx: &Context<'d>) -> Result<Value<'d>> {
        match self {
            Expr::Literal(s) => Ok(Value::String(s.clone())),

            Expr::Number(n) => Ok(Value::Number(*n)),

            Expr::Variable(name) => ctx.variable(name),

            Expr::Negate(inner) => {
                let n = -inner.evaluate(ctx)?.number_value();
                Ok(Value::Number(if n == 0.0 { 0.0 } else { n }))
            }

            Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, ctx),

            Expr::Union(lhs, rhs) => {
                let mut set = node_set_operand("|", lhs.evaluate(ctx)?)?;
                set.extend_unique(node_set_operand("|", rhs.evaluate(ctx)?)?);
                set.sort_document_order();
                Ok(Value::NodeSet(set))
            }

            Expr::Location(path) => evaluate_location(path, ctx),

            Expr::Path { filter, rel } => {
                let mut seeds = node_set_operand("path filter", filter.evaluate(ctx)?)?;
                seeds.sort_document_order();

                let mut out = NodeSet::new();
                for node in seeds.iter() {
                    let sub = ctx.clone_with(vec![node], 0);
                    if let Value::NodeSet(part) = evaluate_location(rel, &sub)? {
                        out.extend_unique(part);
                    }
                }
                out.sort_document_order();
                Ok(Value::NodeSet(out))
            }

            Expr::Filter {
                primary,
                predicates,
            } => {
                let mut set =
                    node_set_operand("filter expression", primary.evaluate(ctx)?)?;
                set.sort_document_order();

                let mut nodes = set.into_vec();
                for predicate in predicates {
                    nodes = apply_predicate(predicate, nodes, ctx)?;
                }
                Ok(Value::NodeSet(nodes.into()))
            }

            Expr::FunctionCall { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate(ctx)?);
                }
                ctx.functions().call(name, ctx, values)
            }
        }
    }
}

fn node_set_operand<'d>(
    operation: &'static str,
    value: Value<'d>,
) -> Result<NodeSet<'d>> {
    value
        .into_node_set()
        .ok_or(Error::NodeSetExpected { function: operation })
}

fn evaluate_binary<'d>(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    ctx: &Context<'d>,
) -> Result<Value<'d>> {
    match op {
        // 'or' and 'and' short-circuit over boolean coercions.
        BinaryOp::Or => {
            if left.evaluate(ctx)?.boolean_value() {
                return Ok(Value::Boolean(true));
            }
            Ok(Value::Boolean(right.evaluate(ctx)?.boolean_value()))
        }
        BinaryOp::And => {
            if !left.evaluate(ctx)?.boolean_value() {
                return Ok(Value::Boolean(false));
            }
            Ok(Value::Boolean(right.evaluate(ctx)?.boolean_value()))
        }

        BinaryOp::Equal
        | BinaryOp::NotEqual
        | BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => {
            let l = left.evaluate(ctx)?;
            let r = right.evaluate(ctx)?;
            Ok(Value::Boolean(compare(compare_op(op), &l, &r)))
        }

        _ => {
            let l = left.evaluate(ctx)?.number_value();
            let r = right.evaluate(ctx)?.number_value();
            let n = match op {
                BinaryOp::Add => l + r,
                BinaryOp::Subtract => l - r,
                BinaryOp::Multiply => l * r,
                // IEEE division; division by zero yields an infinity.
                BinaryOp::Divide => l / r,
                // Truncated remainder, sign follows the dividend.
                _ => l % r,
            };
            Ok(Value::Number(n))
        }
    }
}

fn compare_op(op: BinaryOp) -> CompareOp {
    match op {
        BinaryOp::Equal => CompareOp::Equal,
        BinaryOp::NotEqual => CompareOp::NotEqual,
        BinaryOp::LessThan => CompareOp::LessThan,
        BinaryOp::LessThanOrEqual => CompareOp::LessThanOrEqual,
        BinaryOp::GreaterThan => CompareOp::GreaterThan,
        _ => CompareOp::GreaterThanOrEqual,
    }
}

// Step engine

fn evaluate_location<'d>(path: &LocationPath, ctx: &Context<'d>) -> Result<Value<'d>> {
    let Some(context_node) = ctx.node() else {
        return Ok(Value::NodeSet(NodeSet::new()));
    };

    let seeds = if path.absolute {
        vec![context_node.root()]
    } else {
        vec![context_node]
    };

    if ctx.return_on_first_match() && !path.has_positional_step() {
        debug!("first-match mode engaged");
        let found = find_first(&seeds, &path.steps, ctx)?;
        let mut set = NodeSet::new();
        if let Some(node) = found {
            set.push(node);
        }
        return Ok(Value::NodeSet(set));
    }

    let mut current = seeds;
    for step in &path.steps {
        let mut gathered = NodeSet::new();
        for &origin in &current {
            for survivor in evaluate_step(step, origin, ctx)? {
                gathered.push_unique(survivor);
            }
        }
        current = gathered.into_vec();
    }

    let mut set = NodeSet::from(current);
    set.sort_document_order();
    Ok(Value::NodeSet(set))
}

/// Candidates from the axis in axis-direction order, filtered by the
/// node test, then by each predicate in turn.
fn evaluate_step<'d>(
    step: &Step,
    origin: Node<'d>,
    ctx: &Context<'d>,
) -> Result<Vec<Node<'d>>> {
    let principal = step.axis.principal_node_type();
    let mut candidates: Vec<Node<'d>> = step
        .axis
        .collect(origin)
        .into_iter()
        .filter(|&n| step.node_test.matches(n, principal, ctx.case_insensitive()))
        .collect();

    for predicate in &step.predicates {
        candidates = apply_predicate(predicate, candidates, ctx)?;
    }

    Ok(candidates)
}

/// Positions are 1..N over the surviving candidates, in the order the
/// axis produced them; each predicate renumbers before the next runs.
/// A numeric predicate value selects by position, anything else keeps
/// the node iff it coerces to true.
fn apply_predicate<'d>(
    predicate: &Expr,
    candidates: Vec<Node<'d>>,
    ctx: &Context<'d>,
) -> Result<Vec<Node<'d>>> {
    let mut kept = Vec::new();
    let shared = ctx.clone_with(candidates.clone(), 0);

    for (index, &node) in candidates.iter().enumerate() {
        let sub = shared.at_index(index);
        let value = predicate.evaluate(&sub)?;
        let keep = match value {
            Value::Number(n) => (index + 1) as f64 == round_half_up(n),
            other => other.boolean_value(),
        };
        if keep {
            kept.push(node);
        }
    }

    Ok(kept)
}

/// Single-node evaluation for non-positional paths. A later origin can
/// reach an earlier node than the first origin does — from
/// `descendant::a/following::b`, the outer `a` only sees the `b` past
/// its own subtree while the inner `a` sees the one inside it — so no
/// origin may be skipped. Every origin's best node is compared by
/// document-order id and the smallest wins; that equals the first node
/// of the full result, because the minimum of a union is the minimum of
/// the per-origin minima and duplicates cannot shift a minimum. What
/// this saves over full evaluation is the per-step union bookkeeping
/// and the final sort, not the traversal.
fn find_first<'d>(
    origins: &[Node<'d>],
    steps: &[Step],
    ctx: &Context<'d>,
) -> Result<Option<Node<'d>>> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(origins.iter().copied().min());
    };

    let mut best: Option<Node<'d>> = None;
    for &origin in origins {
        let candidates = evaluate_step(step, origin, ctx)?;
        let found = if rest.is_empty() {
            candidates.into_iter().min()
        } else {
            find_first(&candidates, rest, ctx)?
        };
        if let Some(node) = found {
            if best.map_or(true, |current| node < current) {
                best = Some(node);
            }
        }
    }

    Ok(best)
}

// Positional predicate detection

/// Conservative parse-time heuristic: anything that could evaluate to a
/// number counts — integer literals, unary minus, arithmetic, and the
/// number-returning core functions. Comparisons and the logical
/// operators are transparent; nested location paths are not, so the
/// inner `[1]` of `a[b[1]]` does not taint the outer predicate.
fn is_positional(expr: &Expr) -> bool {
    match expr {
        Expr::Number(_) => true,
        Expr::Negate(_) => true,
        Expr::Binary { op, left, right } => match op {
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo => true,
            _ => is_positional(left) || is_positional(right),
        },
        Expr::FunctionCall { name, .. } => {
            NUMBER_FUNCTIONS.contains(&local_function_name(name))
        }
        _ => false,
    }
}
