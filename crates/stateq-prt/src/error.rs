//! PRT and answer-test error types.

use std::collections::BTreeMap;

use stateq_types::{ErrorCode, Locator, QuestionError};
use thiserror::Error;

/// Structural faults in a node graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrtError {
    #[error("root node '{root}' does not exist")]
    MissingRoot { root: String },

    #[error("cyclic graph: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("node '{node}' exits to unknown node '{target}'")]
    UnknownExitTarget { node: String, target: String },

    #[error("node '{node}' exits to unknown scene '{target}'")]
    UnknownSceneTarget { node: String, target: String },

    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),
}

impl PrtError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PrtError::MissingRoot { .. } => ErrorCode::MISSING_ROOT,
            PrtError::Cycle { .. } => ErrorCode::CYCLIC_GRAPH,
            PrtError::UnknownExitTarget { .. } => ErrorCode::UNKNOWN_EXIT_TARGET,
            PrtError::UnknownSceneTarget { .. } => ErrorCode::UNKNOWN_SCENE_TARGET,
            PrtError::DuplicateNode(_) => ErrorCode::DUPLICATE_NAME,
        }
    }

    pub fn to_question_error(&self, path: &Locator) -> QuestionError {
        QuestionError::new(self.code(), self.to_string()).at(path)
    }
}

/// Why an answer test cannot be called as configured.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnswerTestError {
    #[error("unknown answer test '{0}'")]
    Unknown(String),

    /// Field name to message, as returned by `validate`.
    #[error("answer test '{codename}' rejected its arguments: {}", describe(.fields))]
    Invalid {
        codename: String,
        fields: BTreeMap<String, String>,
    },
}

fn describe(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl AnswerTestError {
    /// One diagnostic per rejected field, placed below `path`.
    pub fn to_question_errors(&self, path: &Locator) -> Vec<QuestionError> {
        match self {
            AnswerTestError::Unknown(_) => {
                vec![QuestionError::new(ErrorCode::UNKNOWN_ANSWER_TEST, self.to_string())
                    .at(&path.field("test"))]
            }
            AnswerTestError::Invalid { codename, fields } => fields
                .iter()
                .map(|(field, message)| {
                    QuestionError::new(field_code(field), format!("{codename}: {message}"))
                        .at(&path.field(field.as_str()))
                })
                .collect(),
        }
    }
}

/// Error code for a field named in a validation map.
pub fn field_code(field: &str) -> ErrorCode {
    match field {
        "tans" => ErrorCode::MISSING_TEACHER_ANSWER,
        "sans" => ErrorCode::DIRECT_INPUT_REQUIRED,
        _ => ErrorCode::INVALID_TEST_OPTIONS,
    }
}
