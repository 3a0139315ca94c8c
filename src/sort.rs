// Node-list sorting for the XSLT collaborator (`xsl:sort` semantics):
// each key evaluates an expression per node and orders as text or as a
// number, ascending or descending. Stability comes from the original
// index acting as an implicit final ascending key.

use std::cmp::Ordering;

use crate::context::Context;
use crate::dom::Node;
use crate::expr::Expr;
use crate::result::Result;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDataType {
    Text,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

pub struct SortKey {
    pub expression: Expr,
    pub data_type: SortDataType,
    pub order: SortOrder,
}

enum KeyValue {
    Text(String),
    Number(f64),
}

impl KeyValue {
    fn compare(&self, other: &KeyValue) -> Ordering {
        match (self, other) {
            (KeyValue::Text(a), KeyValue::Text(b)) => a.cmp(b),
            // total_cmp keeps NaN keys deterministic.
            (KeyValue::Number(a), KeyValue::Number(b)) => a.total_cmp(b),
            (KeyValue::Text(_), KeyValue::Number(_)) => Ordering::Greater,
            (KeyValue::Number(_), KeyValue::Text(_)) => Ordering::Less,
        }
    }
}

/// Sort `nodes` in place by the given keys. Each key expression is
/// evaluated with the node as context node and its original position
/// in the list as context position.
pub fn sort_node_list<'d>(
    nodes: &mut Vec<Node<'d>>,
    keys: &[SortKey],
    ctx: &Context<'d>,
) -> Result<()> {
    let original = nodes.clone();
    let mut decorated: Vec<(Vec<KeyValue>, usize, Node<'d>)> =
        Vec::with_capacity(original.len());

    for (index, &node) in original.iter().enumerate() {
        let sub = ctx.clone_with(original.clone(), index);
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value: Value<'d> = key.expression.evaluate(&sub)?;
            values.push(match key.data_type {
                SortDataType::Text => KeyValue::Text(value.string_value()),
                SortDataType::Number => KeyValue::Number(value.number_value()),
            });
        }
        decorated.push((values, index, node));
    }

    decorated.sort_by(|a, b| {
        for (position, key) in keys.iter().enumerate() {
            let mut ordering = a.0[position].compare(&b.0[position]);
            if key.order == SortOrder::Descending {
                ordering = ordering.reverse();
            }
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.1.cmp(&b.1)
    });

    *nodes = decorated.into_iter().map(|(_, _, node)| node).collect();
    Ok(())
}
