use thiserror::Error;

/// Result type for formula compilation and evaluation.
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Error type for formula compilation, evaluation and catalog configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("empty expression")]
    EmptyExpression,

    #[error("parse error at position {position}: {message}")]
    ParseError { position: usize, message: String },

    #[error("unterminated text literal starting at position {0}")]
    UnterminatedText(usize),

    #[error("unbalanced parentheses at position {0}")]
    UnbalancedParentheses(usize),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("invalid argument count for {function}: expected {expected}, got {got}")]
    InvalidArgCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("duplicate keyword: {0}")]
    DuplicateKeyword(String),

    #[error("invalid keyword definition for {name}: {message}")]
    InvalidKeyword { name: String, message: String },

    #[error("no rule for {keyword} accepts operands ({operands})")]
    NoMatchingRule { keyword: String, operands: String },

    #[error("type error: {0}")]
    TypeError(String),

    #[error("malformed expression: {0}")]
    MalformedExpression(String),

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("no formula has been set")]
    NoFormula,
}

impl FormulaError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        FormulaError::ParseError {
            position,
            message: message.into(),
        }
    }

    /// Whether the error was raised while compiling formula text.
    pub fn is_compilation(&self) -> bool {
        matches!(
            self,
            FormulaError::EmptyExpression
                | FormulaError::ParseError { .. }
                | FormulaError::UnterminatedText(_)
                | FormulaError::UnbalancedParentheses(_)
                | FormulaError::UnknownFunction(_)
                | FormulaError::InvalidArgCount { .. }
        )
    }
}
