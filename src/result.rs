use thiserror::Error;

pub type Result<I> = std::result::Result<I, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Lexing failed, the token stream could not be reduced to a single
    /// expression, or end-of-input was reached mid-rule. Carries the
    /// original expression and a dump of the residual parse stack.
    #[error("XPath parse error {expression}; stack: [{stack}]")]
    Parse { expression: String, stack: String },

    #[error("malformed document: {0}")]
    Document(String),

    #[error("unknown variable: ${0}")]
    UnknownVariable(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{function}: expected {expected} argument(s), got {got}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("{function}: expected a node-set argument")]
    NodeSetExpected { function: &'static str },

    #[error("Invalid regular expression syntax: {0}")]
    InvalidMatchFlags(String),

    #[error("Invalid matches argument: {0}")]
    InvalidMatchPattern(String),
}
