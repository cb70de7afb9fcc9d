//! Answer-test registry and PRT compiler.
//!
//! A potential-response tree (PRT) is a DAG of answer-test nodes. The
//! compiler checks the graph, then emits one CAS function that walks it
//! with guarded statements, accumulating score, penalty, the traversal
//! path, per-node results, feedback and any scene transition.

pub mod answertest;
mod compiler;
mod error;
pub mod graph;

pub use answertest::{
    AnswerTest, AnswerTestRegistry, OptionKind, OptionMeta, TestCall, TestDescription,
    RAW_INPUT_PREFIX,
};
pub use compiler::{compile_prt, function_name, CompiledPrt, PrtContext, PrtResult};
pub use error::{field_code, AnswerTestError, PrtError};
