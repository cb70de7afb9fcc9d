//! CASText compiler.
//!
//! Turns a tokenized template into one CAS expression that evaluates to a
//! string (flat templates) or to a `["%root", ...]` marker list that
//! [`postprocess`] renders after evaluation.
//!
//! Pipeline: math-mode annotation, [`lower`]ing to [`Block`]s, block
//! compilation, then the [`rewrite`] pass.

mod block;
mod compile;
mod error;
mod indexing;
pub mod mathmode;
mod postprocess;
mod rewrite;

pub use block::{lower, Block, Injection, NAMED_BLOCKS};
pub use compile::{compile_castext, CasTextContext, CompiledCasText, TemplateParser};
pub use error::{CasTextError, PostprocessError};
pub use indexing::IndexStyle;
pub use postprocess::{parse_value, postprocess, NoProcessor, PostprocessContext, Processor};
pub use rewrite::rewrite;
