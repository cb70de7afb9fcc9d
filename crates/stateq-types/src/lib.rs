//! Shared types for the stateq question compiler.
//!
//! This crate defines source spans, structured diagnostics, the CAS
//! expression AST and its printer, the CASText block tree, the question
//! model, compile options and the variable-usage analyzer used by every
//! later stage.

mod error;
mod span;

pub mod cas;
pub mod castext;
pub mod config;
mod print;
pub mod question;
pub mod usage;
pub mod value;

pub use cas::{BinOp, CasExpr, CasKind, EvalFlag, Fragment, LoopSource, PostfixOp, PrefixOp, Statement};
pub use castext::{Binding, BlockKind, BlockNode, CasText, IfBranch, InjectMode};
pub use config::CompileOptions;
pub use error::{
    CompileErrors, ErrorCategory, ErrorCode, Locator, LocatorParseError, QuestionError, Segment,
    Severity, MAX_ERRORS,
};
pub use question::{
    Branch, Exit, Input, InputKind, Prt, PrtNode, Question, Scene, ScoreMode, ScoreOp,
    StateVariable, ValidationBox, ValidationBoxKind,
};
pub use span::{Position, SourceText, Span};
pub use usage::{analyze_expr, analyze_fragment, Usage};
pub use value::CasValue;
