// https://www.w3.org/TR/1999/REC-xpath-19991116/#data-model
//
// The tree is an arena: nodes live in one Vec owned by the Document and
// refer to each other by index. Handles (`Node`) are Copy and borrow the
// arena, so parent/sibling cycles need no reference counting. Arena slots
// are allocated in document order, which makes the slot index double as
// the document-order id used for equality, deduplication and sorting.
// Attributes are allocated directly after their element and before its
// children, so attribute nodes order after their element but precede the
// element's content.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::result::{Error, Result};

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    CData,
    Comment,
    ProcessingInstruction,
    DocumentType,
    Fragment,
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    prefix: Option<String>,
    /// Local name for elements and attributes, target for processing
    /// instructions, empty for unnamed kinds.
    local_name: String,
    namespace_uri: Option<String>,
    /// Attribute value or character content; empty for interior kinds.
    value: String,
    parent: Option<usize>,
    children: Vec<usize>,
    attributes: Vec<usize>,
    sibling_index: usize,
}

impl NodeData {
    fn unnamed(kind: NodeKind, value: String) -> Self {
        NodeData {
            kind,
            prefix: None,
            local_name: String::new(),
            namespace_uri: None,
            value,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            sibling_index: 0,
        }
    }
}

/// An XML document holding every node of the tree.
///
/// Built from markup text via [`Document::parse_str`]. The markup parser
/// is an external concern; the evaluator only relies on the node
/// contract exposed by [`Node`].
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    /// Parse XML text into a document tree.
    ///
    /// Namespace declarations are resolved while building, so every
    /// element and attribute carries its in-scope namespace URI. The
    /// `xmlns` pseudo-attributes do not become attribute nodes.
    pub fn parse_str(source: &str) -> Result<Self> {
        let mut doc = Document {
            nodes: vec![NodeData::unnamed(NodeKind::Document, String::new())],
        };

        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text(false);

        // Innermost scope last; each element pushes its xmlns declarations.
        let mut scopes: Vec<Vec<(String, Option<String>)>> =
            vec![vec![("xml".to_string(), Some(XML_NAMESPACE.to_string()))]];
        let mut open: Vec<usize> = vec![0];
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| Error::Document(e.to_string()))?;

            match event {
                Event::Start(e) => {
                    let parent = open.last().copied().unwrap_or(0);
                    let id = doc.append_element(&e, parent, &mut scopes)?;
                    open.push(id);
                }
                Event::Empty(e) => {
                    let parent = open.last().copied().unwrap_or(0);
                    doc.append_element(&e, parent, &mut scopes)?;
                    scopes.pop();
                }
                Event::End(_) => {
                    if open.len() > 1 {
                        open.pop();
                        scopes.pop();
                    }
                }
                Event::Text(e) => {
                    let raw = std::str::from_utf8(e.as_ref())
                        .map_err(|e| Error::Document(e.to_string()))?;
                    let text = unescape(raw)
                        .map_err(|e| Error::Document(e.to_string()))?
                        .into_owned();
                    let parent = open.last().copied().unwrap_or(0);
                    doc.append_child(parent, NodeData::unnamed(NodeKind::Text, text));
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    let parent = open.last().copied().unwrap_or(0);
                    doc.append_child(parent, NodeData::unnamed(NodeKind::CData, text));
                }
                Event::Comment(e) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    let parent = open.last().copied().unwrap_or(0);
                    doc.append_child(parent, NodeData::unnamed(NodeKind::Comment, text));
                }
                Event::PI(e) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    let (target, content) = match text.split_once(char::is_whitespace) {
                        Some((t, c)) => (t.to_string(), c.trim_start().to_string()),
                        None => (text, String::new()),
                    };
                    let parent = open.last().copied().unwrap_or(0);
                    let mut data =
                        NodeData::unnamed(NodeKind::ProcessingInstruction, content);
                    data.local_name = target;
                    doc.append_child(parent, data);
                }
                Event::DocType(e) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    doc.append_child(0, NodeData::unnamed(NodeKind::DocumentType, text));
                }
                Event::Decl(_) => {}
                Event::Eof => break,
                _ => {}
            }

            buf.clear();
        }

        Ok(doc)
    }

    pub fn root(&self) -> Node<'_> {
        Node { doc: self, id: 0 }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: usize) -> Option<Node<'_>> {
        (id < self.nodes.len()).then_some(Node { doc: self, id })
    }

    fn append_child(&mut self, parent: usize, mut data: NodeData) -> usize {
        let id = self.nodes.len();
        data.parent = Some(parent);
        data.sibling_index = self.nodes[parent].children.len();
        self.nodes.push(data);
        self.nodes[parent].children.push(id);
        id
    }

    fn append_element(
        &mut self,
        e: &BytesStart<'_>,
        parent: usize,
        scopes: &mut Vec<Vec<(String, Option<String>)>>,
    ) -> Result<usize> {
        let mut scope = Vec::new();
        let mut plain_attrs = Vec::new();

        for attr in e.attributes() {
            let attr = attr.map_err(|e| Error::Document(e.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::Document(e.to_string()))?
                .to_string();
            let raw = std::str::from_utf8(&attr.value)
                .map_err(|e| Error::Document(e.to_string()))?;
            let value = unescape(raw)
                .map_err(|e| Error::Document(e.to_string()))?
                .into_owned();

            if key == "xmlns" {
                // An empty URI undeclares the default namespace.
                let uri = (!value.is_empty()).then_some(value);
                scope.push((String::new(), uri));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.push((prefix.to_string(), Some(value)));
            } else {
                plain_attrs.push((key, value));
            }
        }

        scopes.push(scope);

        let name = std::str::from_utf8(e.name().as_ref())
            .map_err(|e| Error::Document(e.to_string()))?
            .to_string();
        let (prefix, local) = split_qname(&name);
        let namespace_uri = resolve_prefix(scopes, prefix.unwrap_or(""));

        let element = self.append_child(
            parent,
            NodeData {
                kind: NodeKind::Element,
                prefix: prefix.map(str::to_string),
                local_name: local.to_string(),
                namespace_uri,
                value: String::new(),
                parent: None,
                children: Vec::new(),
                attributes: Vec::new(),
                sibling_index: 0,
            },
        );

        for (key, value) in plain_attrs {
            let (prefix, local) = split_qname(&key);
            // Unprefixed attributes are in no namespace.
            let namespace_uri = prefix.and_then(|p| resolve_prefix(scopes, p));

            let id = self.nodes.len();
            self.nodes.push(NodeData {
                kind: NodeKind::Attribute,
                prefix: prefix.map(str::to_string),
                local_name: local.to_string(),
                namespace_uri,
                value,
                parent: Some(element),
                children: Vec::new(),
                attributes: Vec::new(),
                sibling_index: 0,
            });
            self.nodes[element].attributes.push(id);
        }

        Ok(element)
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn resolve_prefix(
    scopes: &[Vec<(String, Option<String>)>],
    prefix: &str,
) -> Option<String> {
    for scope in scopes.iter().rev() {
        for (p, uri) in scope.iter().rev() {
            if p == prefix {
                return uri.clone();
            }
        }
    }
    None
}

/// A borrowed handle to one node of a [`Document`].
///
/// Handles are cheap to copy; identity is the document-order id.
#[derive(Clone, Copy)]
pub struct Node<'d> {
    doc: &'d Document,
    id: usize,
}

impl<'d> Node<'d> {
    fn data(&self) -> &'d NodeData {
        &self.doc.nodes[self.id]
    }

    fn make(&self, id: usize) -> Node<'d> {
        Node { doc: self.doc, id }
    }

    /// Monotonic id in document order; attributes order after their
    /// element and before its children.
    pub fn document_order_id(&self) -> usize {
        self.id
    }

    pub fn document(&self) -> &'d Document {
        self.doc
    }

    pub fn kind(&self) -> NodeKind {
        self.data().kind
    }

    pub fn is_element(&self) -> bool {
        self.kind() == NodeKind::Element
    }

    pub fn is_attribute(&self) -> bool {
        self.kind() == NodeKind::Attribute
    }

    pub fn local_name(&self) -> &'d str {
        &self.data().local_name
    }

    pub fn prefix(&self) -> Option<&'d str> {
        self.data().prefix.as_deref()
    }

    pub fn namespace_uri(&self) -> Option<&'d str> {
        self.data().namespace_uri.as_deref()
    }

    /// Character data for leaf kinds, `None` for interior kinds.
    pub fn node_value(&self) -> Option<&'d str> {
        match self.kind() {
            NodeKind::Attribute
            | NodeKind::Text
            | NodeKind::CData
            | NodeKind::Comment
            | NodeKind::ProcessingInstruction
            | NodeKind::DocumentType => Some(&self.data().value),
            _ => None,
        }
    }

    /// DOM-style node name: qualified name for named kinds, `#document`,
    /// `#text`, `#cdata-section` or `#comment` otherwise.
    pub fn name(&self) -> String {
        match self.kind() {
            NodeKind::Document => "#document".to_string(),
            NodeKind::Fragment => "#document-fragment".to_string(),
            NodeKind::Text => "#text".to_string(),
            NodeKind::CData => "#cdata-section".to_string(),
            NodeKind::Comment => "#comment".to_string(),
            _ => self.qualified_name(),
        }
    }

    /// `prefix:local` for named kinds, the target for processing
    /// instructions, empty otherwise.
    pub fn qualified_name(&self) -> String {
        let data = self.data();
        match &data.prefix {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}:{}", prefix, data.local_name)
            }
            _ => data.local_name.clone(),
        }
    }

    pub fn parent(&self) -> Option<Node<'d>> {
        self.data().parent.map(|id| self.make(id))
    }

    pub fn children(&self) -> impl Iterator<Item = Node<'d>> + '_ {
        let doc = self.doc;
        self.data().children.iter().map(move |&id| Node { doc, id })
    }

    pub fn attributes(&self) -> impl Iterator<Item = Node<'d>> + '_ {
        let doc = self.doc;
        self.data()
            .attributes
            .iter()
            .map(move |&id| Node { doc, id })
    }

    pub fn first_child(&self) -> Option<Node<'d>> {
        self.data().children.first().map(|&id| self.make(id))
    }

    pub fn last_child(&self) -> Option<Node<'d>> {
        self.data().children.last().map(|&id| self.make(id))
    }

    pub fn sibling_index(&self) -> usize {
        self.data().sibling_index
    }

    pub fn previous_sibling(&self) -> Option<Node<'d>> {
        let parent = self.parent()?;
        if self.is_attribute() {
            return None;
        }
        let index = self.sibling_index().checked_sub(1)?;
        parent.data().children.get(index).map(|&id| self.make(id))
    }

    pub fn next_sibling(&self) -> Option<Node<'d>> {
        let parent = self.parent()?;
        if self.is_attribute() {
            return None;
        }
        parent
            .data()
            .children
            .get(self.sibling_index() + 1)
            .map(|&id| self.make(id))
    }

    /// The root document node of this node's tree.
    pub fn root(&self) -> Node<'d> {
        Node { doc: self.doc, id: 0 }
    }

    pub fn is_ancestor_of(&self, other: Node<'d>) -> bool {
        let mut current = other.parent();
        while let Some(node) = current {
            if node.id == self.id {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Element descendants with a matching qualified name (`*` matches
    /// every element), pre-order.
    pub fn get_elements_by_tag_name(&self, name: &str) -> Vec<Node<'d>> {
        let mut found = Vec::new();
        let mut stack: Vec<Node<'d>> = self.children().collect();
        stack.reverse();

        while let Some(node) = stack.pop() {
            if node.is_element() && (name == "*" || node.qualified_name() == name) {
                found.push(node);
            }
            let mut children: Vec<Node<'d>> = node.children().collect();
            children.reverse();
            stack.append(&mut children);
        }

        found
    }

    /// https://www.w3.org/TR/1999/REC-xpath-19991116/#dt-string-value
    ///
    /// Concatenated descendant text for interior kinds, the literal
    /// value for leaves.
    pub fn string_value(&self) -> String {
        match self.kind() {
            NodeKind::Document | NodeKind::Element | NodeKind::Fragment => {
                let mut out = String::new();
                self.collect_text(&mut out);
                out
            }
            _ => self.data().value.clone(),
        }
    }

    fn collect_text(&self, out: &mut String) {
        for child in self.children() {
            match child.kind() {
                NodeKind::Text | NodeKind::CData => out.push_str(&child.data().value),
                NodeKind::Element => child.collect_text(out),
                _ => {}
            }
        }
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.doc, other.doc)
    }
}

impl Eq for Node<'_> {}

impl PartialOrd for Node<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for Node<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
