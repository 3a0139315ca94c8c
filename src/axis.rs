// https://www.w3.org/TR/1999/REC-xpath-19991116/#axes

use crate::dom::{Node, NodeKind};

/// The thirteen XPath axes. Each axis enumerates nodes reachable from a
/// context node in a fixed direction; four of them run in reverse
/// document order, which is what predicate positions count along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Parents transitively, nearest first; always ends at the root
    /// unless the context node is the root.
    Ancestor,
    /// The context node, then its ancestors.
    AncestorOrSelf,
    /// Attributes of the context node; empty unless it is an element.
    Attribute,
    Child,
    /// Children transitively; never attributes or namespace nodes.
    Descendant,
    DescendantOrSelf,
    /// Everything after the context node in document order, excluding
    /// its descendants, attributes and namespace nodes.
    Following,
    FollowingSibling,
    /// In-scope namespace bindings; this node model materializes no
    /// namespace nodes, so the axis is always empty.
    Namespace,
    Parent,
    /// Everything before the context node in document order, excluding
    /// its ancestors, attributes and namespace nodes.
    Preceding,
    PrecedingSibling,
    SelfAxis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalNodeType {
    Attribute,
    Namespace,
    Element,
}

impl PrincipalNodeType {
    pub fn matches(self, node: Node<'_>) -> bool {
        match self {
            PrincipalNodeType::Attribute => node.kind() == NodeKind::Attribute,
            PrincipalNodeType::Element => node.kind() == NodeKind::Element,
            PrincipalNodeType::Namespace => false,
        }
    }
}

/// Lexer table: names ordered so that the hyphenated long forms match
/// before their prefixes.
pub static AXIS_NAMES: [(&str, Axis); 13] = [
    ("ancestor-or-self", Axis::AncestorOrSelf),
    ("ancestor", Axis::Ancestor),
    ("attribute", Axis::Attribute),
    ("child", Axis::Child),
    ("descendant-or-self", Axis::DescendantOrSelf),
    ("descendant", Axis::Descendant),
    ("following-sibling", Axis::FollowingSibling),
    ("following", Axis::Following),
    ("namespace", Axis::Namespace),
    ("parent", Axis::Parent),
    ("preceding-sibling", Axis::PrecedingSibling),
    ("preceding", Axis::Preceding),
    ("self", Axis::SelfAxis),
];

impl Axis {
    pub fn principal_node_type(self) -> PrincipalNodeType {
        match self {
            Axis::Attribute => PrincipalNodeType::Attribute,
            Axis::Namespace => PrincipalNodeType::Namespace,
            _ => PrincipalNodeType::Element,
        }
    }

    /// Reverse axes enumerate in reverse document order; predicate
    /// positions are numbered along that direction.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::Preceding
                | Axis::PrecedingSibling
        )
    }

    /// Enumerate the axis from `node`, in axis-direction order.
    pub fn collect<'d>(self, node: Node<'d>) -> Vec<Node<'d>> {
        match self {
            Axis::SelfAxis => vec![node],

            Axis::Child => node.children().collect(),

            Axis::Parent => node.parent().into_iter().collect(),

            Axis::Ancestor => {
                let mut out = Vec::new();
                let mut current = node.parent();
                while let Some(n) = current {
                    out.push(n);
                    current = n.parent();
                }
                out
            }

            Axis::AncestorOrSelf => {
                let mut out = vec![node];
                out.extend(Axis::Ancestor.collect(node));
                out
            }

            Axis::Descendant => {
                let mut out = Vec::new();
                collect_descendants(node, &mut out);
                out
            }

            Axis::DescendantOrSelf => {
                let mut out = vec![node];
                collect_descendants(node, &mut out);
                out
            }

            Axis::FollowingSibling => {
                let mut out = Vec::new();
                let mut current = node.next_sibling();
                while let Some(n) = current {
                    out.push(n);
                    current = n.next_sibling();
                }
                out
            }

            Axis::PrecedingSibling => {
                let mut out = Vec::new();
                let mut current = node.previous_sibling();
                while let Some(n) = current {
                    out.push(n);
                    current = n.previous_sibling();
                }
                out
            }

            Axis::Following => {
                let doc = node.document();
                let mut out = Vec::new();
                for id in node.document_order_id() + 1..doc.node_count() {
                    let Some(candidate) = doc.node(id) else { continue };
                    if candidate.kind() == NodeKind::Attribute
                        || node.is_ancestor_of(candidate)
                    {
                        continue;
                    }
                    out.push(candidate);
                }
                out
            }

            Axis::Preceding => {
                let doc = node.document();
                let mut out = Vec::new();
                for id in (0..node.document_order_id()).rev() {
                    let Some(candidate) = doc.node(id) else { continue };
                    if candidate.kind() == NodeKind::Attribute
                        || candidate.is_ancestor_of(node)
                    {
                        continue;
                    }
                    out.push(candidate);
                }
                out
            }

            Axis::Attribute => node.attributes().collect(),

            Axis::Namespace => Vec::new(),
        }
    }
}

fn collect_descendants<'d>(node: Node<'d>, out: &mut Vec<Node<'d>>) {
    for child in node.children() {
        out.push(child);
        collect_descendants(child, out);
    }
}
