// Evaluation state: the context node list, the position within it, and
// the shared variable/function environment.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::dom::Node;
use crate::functions::FunctionLibrary;
use crate::result::{Error, Result};
use crate::value::Value;

/// The context an expression evaluates against.
///
/// https://www.w3.org/TR/1999/REC-xpath-19991116/#basics — a context
/// node (here: the node list plus the current index), a position and
/// size, variable bindings and a function library. Derived contexts
/// share bindings and flags with their parent; only the node list and
/// index change while predicates and nested paths evaluate.
#[derive(Clone)]
pub struct Context<'d> {
    nodes: Rc<Vec<Node<'d>>>,
    index: usize,
    variables: Rc<RefCell<HashMap<String, Value<'d>>>>,
    functions: Rc<FunctionLibrary>,
    case_insensitive: bool,
    return_on_first_match: bool,
}

impl<'d> Context<'d> {
    pub fn new(node: Node<'d>) -> Self {
        Context {
            nodes: Rc::new(vec![node]),
            index: 0,
            variables: Rc::new(RefCell::new(HashMap::new())),
            functions: Rc::new(FunctionLibrary::core()),
            case_insensitive: false,
            return_on_first_match: false,
        }
    }

    /// The current context node.
    pub fn node(&self) -> Option<Node<'d>> {
        self.nodes.get(self.index).copied()
    }

    /// 1-based position of the context node, as `position()` reports it.
    pub fn position(&self) -> usize {
        self.index + 1
    }

    /// Context size, as `last()` reports it.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_list(&self) -> &[Node<'d>] {
        &self.nodes
    }

    /// A new context over a different node list and index. Variable
    /// bindings, the function table and both flags are shared.
    pub fn clone_with(&self, nodes: Vec<Node<'d>>, index: usize) -> Self {
        Context {
            nodes: Rc::new(nodes),
            index,
            variables: Rc::clone(&self.variables),
            functions: Rc::clone(&self.functions),
            case_insensitive: self.case_insensitive,
            return_on_first_match: self.return_on_first_match,
        }
    }

    /// Same node list, different position.
    pub fn at_index(&self, index: usize) -> Self {
        let mut ctx = self.clone();
        ctx.index = index;
        ctx
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value<'d>) {
        self.variables.borrow_mut().insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Result<Value<'d>> {
        self.variables
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    /// Compare element and attribute names ignoring ASCII case; set for
    /// documents that came from HTML.
    pub fn set_case_insensitive(&mut self, flag: bool) {
        self.case_insensitive = flag;
    }

    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Allow location paths without positional predicates to stop at
    /// their first surviving node.
    pub fn set_return_on_first_match(&mut self, flag: bool) {
        self.return_on_first_match = flag;
    }

    pub fn return_on_first_match(&self) -> bool {
        self.return_on_first_match
    }

    pub fn functions(&self) -> &FunctionLibrary {
        &self.functions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn derived_contexts_share_variables() {
        let doc = Document::parse_str("<r><a/></r>").unwrap();
        let r = doc.root().first_child().unwrap();
        let a = r.first_child().unwrap();

        let mut ctx = Context::new(r);
        ctx.set_variable("x", Value::Number(7.0));

        let derived = ctx.clone_with(vec![a], 0);
        assert_eq!(derived.variable("x").unwrap().number_value(), 7.0);
        assert_eq!(derived.node(), Some(a));
        assert!(derived.variable("missing").is_err());
    }

    #[test]
    fn position_and_size_follow_the_node_list() {
        let doc = Document::parse_str("<r><a/><b/><c/></r>").unwrap();
        let r = doc.root().first_child().unwrap();
        let kids: Vec<_> = r.children().collect();

        let ctx = Context::new(r).clone_with(kids, 1);
        assert_eq!(ctx.position(), 2);
        assert_eq!(ctx.size(), 3);
        assert_eq!(ctx.node().unwrap().local_name(), "b");
    }
}
