//! Reference evaluator for the CAS dialect the stateq compilers emit.
//!
//! Runs generated code directly from the parsed tree so that tests can
//! check behaviour, not just text. Covers the subset the compilers use:
//! `block` locals, `errcatch`, `return`, conditionals, both loop forms,
//! function definitions, list and string builtins and exact integer
//! arithmetic. Answer tests are host functions registered per test.

pub mod builtins;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod value;

pub use env::Environment;
pub use error::{EvalError, EvalResult};
pub use evaluator::{Evaluator, NativeFn, DEFAULT_GAS_LIMIT};
pub use value::Value;
