//! Parser for the CAS expression dialect.
//!
//! [`parse_fragment`] reads author code (a statement list with optional
//! evaluation flags); [`parse_expression`] reads exactly one expression.

mod parse_expr;
mod parse_stmt;
mod parser;

pub use parser::{parse_expression, parse_fragment, ParseResult, Parser};
