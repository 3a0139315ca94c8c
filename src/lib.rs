//! An XPath 1.0 parser and evaluator over an in-memory XML tree.
//!
//! Expressions are lexed by a regular-expression token table, parsed by
//! a precedence-driven shift/reduce engine into an expression tree, and
//! evaluated against a [`Context`] to one of the four XPath value
//! types: number, string, boolean or node-set.
//!
//! ```
//! use xpath_engine::{Context, Document, XPathParser};
//!
//! let doc = Document::parse_str("<page><q>new york</q></page>")?;
//! let ctx = Context::new(doc.root());
//!
//! let mut parser = XPathParser::new();
//! assert_eq!(parser.eval("string(/page/q)", &ctx)?.string_value(), "new york");
//! assert_eq!(parser.eval("count(//q)", &ctx)?.number_value(), 1.0);
//! # Ok::<(), xpath_engine::Error>(())
//! ```
//!
//! Parsed expressions are cached per [`XPathParser`] instance and may
//! be reused across contexts and documents. A parser instance is not
//! meant to be shared across threads; spin up one per thread instead.

pub mod axis;
pub mod context;
pub mod dom;
pub mod expr;
pub mod functions;
pub mod grammar;
pub mod lexer;
pub mod nodetest;
pub mod parser;
pub mod result;
pub mod sort;
pub mod tokens;
pub mod value;

pub use axis::{Axis, PrincipalNodeType};
pub use context::Context;
pub use dom::{Document, Node, NodeKind};
pub use expr::{BinaryOp, Expr, LocationPath, Step};
pub use functions::FunctionLibrary;
pub use nodetest::{NameTest, NodeTest};
pub use parser::{ParserStats, XPathParser};
pub use result::{Error, Result};
pub use sort::{sort_node_list, SortDataType, SortKey, SortOrder};
pub use value::{NodeSet, Value};

/// One-shot convenience: parse and evaluate without keeping a parser
/// (and therefore without a cache) around.
pub fn eval<'d>(expression: &str, ctx: &Context<'d>) -> Result<Value<'d>> {
    XPathParser::new().eval(expression, ctx)
}
