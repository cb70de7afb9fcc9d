//! Runtime error types.

use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Raised by `error(...)` in evaluated code.
    #[error("error: {0}")]
    Raised(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("arithmetic: {0}")]
    Arithmetic(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{name} expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("gas exhausted")]
    GasExhausted,

    /// `return(...)`: unwinds to the nearest enclosing `block`.
    #[error("return outside block")]
    Return(Value),
}

impl EvalError {
    /// Errors that `errcatch` traps. Control flow and resource limits pass
    /// through.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, EvalError::Return(_) | EvalError::GasExhausted)
    }
}

pub type EvalResult<T> = Result<T, EvalError>;
