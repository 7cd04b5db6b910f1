//! Runtime and type-checking diagnostics.

use std::sync::Arc;

use cel_parser::span::Span;
use thiserror::Error;

use crate::types::Type;

/// A runtime evaluation failure. Cloned cheaply (`Arc`-backed) since errors
/// flow through [`crate::value::Value::Error`] and get threaded through
/// arithmetic and comprehension results the same way ordinary values do.
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    #[error("no such attribute: {name}")]
    NoSuchAttribute { name: String },

    #[error("no such field '{field}' on {type_name}")]
    NoSuchField { type_name: String, field: String },

    #[error("no such overload: {function}({args})")]
    NoSuchOverload { function: String, args: String },

    #[error("division by zero")]
    DivideByZero,

    #[error("modulus by zero")]
    ModulusByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("unsupported conversion from {from} to {to}")]
    UnsupportedConversion { from: String, to: String },

    #[error("no such key: {key}")]
    NoSuchKey { key: String },

    #[error("index out of bounds: {index}")]
    IndexOutOfBounds { index: i64 },

    #[error("unsupported field selection on type {ty}")]
    UnsupportedFieldSelection { ty: String },

    #[error("duplicate map key: {key}")]
    DuplicateKey { key: String },

    #[error("value is not a message, cannot have fields set by name")]
    NotAMessage,

    #[error("unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("{message}")]
    Custom { message: String },
}

impl ErrorKind {
    pub fn custom(message: impl Into<String>) -> Self {
        ErrorKind::Custom { message: message.into() }
    }
}

/// A runtime error carrying the expression id it was raised for, so tooling
/// can point back at the offending subexpression.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub kind: Arc<ErrorKind>,
    pub id: Option<u64>,
}

impl EvalError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind: Arc::new(kind), id: None }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for EvalError {}

/// A single type-checking diagnostic.
#[derive(Debug, Clone, Error)]
pub enum CheckError {
    #[error("undeclared reference to '{name}' at {span:?}")]
    UndeclaredVariable { name: String, span: Span },

    #[error("undeclared function '{name}' at {span:?}")]
    UndeclaredFunction { name: String, span: Span },

    #[error("found no matching overload for '{name}({args})' at {span:?}")]
    NoMatchingOverload { name: String, args: String, span: Span },

    #[error("expected type {expected} but found {found} at {span:?}")]
    TypeMismatch { expected: Type, found: Type, span: Span },

    #[error("'{name}' is reserved and cannot be redeclared at {span:?}")]
    ReservedName { name: String, span: Span },

    #[error("{message} at {span:?}")]
    Custom { message: String, span: Span },
}

impl CheckError {
    pub fn span(&self) -> Span {
        match self {
            CheckError::UndeclaredVariable { span, .. }
            | CheckError::UndeclaredFunction { span, .. }
            | CheckError::NoMatchingOverload { span, .. }
            | CheckError::TypeMismatch { span, .. }
            | CheckError::ReservedName { span, .. }
            | CheckError::Custom { span, .. } => *span,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CheckErrors(pub Vec<CheckError>);

impl CheckErrors {
    pub fn push(&mut self, err: CheckError) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
