// https://www.w3.org/TR/1999/REC-xpath-19991116/#node-tests

use crate::axis::PrincipalNodeType;
use crate::dom::{Node, NodeKind};

/// `'*' | NCName ':' '*' | QName`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTest {
    pub prefix: Option<String>,
    pub local: String,
}

impl NameTest {
    fn matches(&self, node: Node<'_>, case_insensitive: bool) -> bool {
        if let Some(prefix) = &self.prefix {
            if node.prefix() != Some(prefix.as_str()) {
                return false;
            }
        }

        if case_insensitive {
            self.local.eq_ignore_ascii_case(node.local_name())
        } else {
            self.local == node.local_name()
        }
    }
}

/// A predicate over a single node, applied to every candidate an axis
/// yields. Name tests only accept nodes of the axis principal type, so
/// `*` selects elements on most axes but attributes on `attribute::`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// `*`
    Any,
    /// `name` or `prefix:name`
    Name(NameTest),
    /// `ncname:*`
    NamespaceWildcard(String),
    /// `node()`
    Node,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()`, optionally with a target literal
    ProcessingInstruction(Option<String>),
}

impl NodeTest {
    pub fn matches(
        &self,
        node: Node<'_>,
        principal: PrincipalNodeType,
        case_insensitive: bool,
    ) -> bool {
        match self {
            NodeTest::Any => principal.matches(node),
            NodeTest::Name(name) => {
                principal.matches(node) && name.matches(node, case_insensitive)
            }
            NodeTest::NamespaceWildcard(prefix) => {
                principal.matches(node) && node.prefix() == Some(prefix.as_str())
            }
            NodeTest::Node => true,
            NodeTest::Text => {
                matches!(node.kind(), NodeKind::Text | NodeKind::CData)
            }
            NodeTest::Comment => node.kind() == NodeKind::Comment,
            NodeTest::ProcessingInstruction(target) => {
                node.kind() == NodeKind::ProcessingInstruction
                    && target
                        .as_ref()
                        .map_or(true, |t| t == node.local_name())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn name_test_honours_case_flag() {
        let doc = Document::parse_str("<r><DIV/></r>").unwrap();
        let div = doc.root().first_child().unwrap().first_child().unwrap();

        let test = NodeTest::Name(NameTest {
            prefix: None,
            local: "div".into(),
        });

        assert!(!test.matches(div, PrincipalNodeType::Element, false));
        assert!(test.matches(div, PrincipalNodeType::Element, true));
    }

    #[test]
    fn wildcard_respects_principal_type() {
        let doc = Document::parse_str("<r a=\"1\"><b/>text</r>").unwrap();
        let r = doc.root().first_child().unwrap();
        let attr = r.attributes().next().unwrap();
        let b = r.first_child().unwrap();
        let text = r.last_child().unwrap();

        assert!(NodeTest::Any.matches(b, PrincipalNodeType::Element, false));
        assert!(!NodeTest::Any.matches(attr, PrincipalNodeType::Element, false));
        assert!(NodeTest::Any.matches(attr, PrincipalNodeType::Attribute, false));
        assert!(!NodeTest::Any.matches(text, PrincipalNodeType::Element, false));
        assert!(NodeTest::Node.matches(text, PrincipalNodeType::Element, false));
    }

    #[test]
    fn processing_instruction_target_filters() {
        let doc = Document::parse_str("<r><?alpha one?><?beta two?></r>").unwrap();
        let r = doc.root().first_child().unwrap();
        let pis: Vec<_> = r.children().collect();

        let any = NodeTest::ProcessingInstruction(None);
        let alpha = NodeTest::ProcessingInstruction(Some("alpha".into()));

        assert!(any.matches(pis[0], PrincipalNodeType::Element, false));
        assert!(any.matches(pis[1], PrincipalNodeType::Element, false));
        assert!(alpha.matches(pis[0], PrincipalNodeType::Element, false));
        assert!(!alpha.matches(pis[1], PrincipalNodeType::Element, false));
    }
}
