//! Scoping rules between code layers.
//!
//! Code runs in layers: state-variable initial values, question
//! variables, scene variables, then per PRT the feedback variables and
//! branch transition code. Each layer may read what earlier layers wrote
//! but must not overwrite it, and no layer may write a declared input.

use std::collections::BTreeSet;

use stateq_parser::parse_fragment;
use stateq_types::{
    analyze_fragment, CompileErrors, ErrorCode, Locator, Question, QuestionError, Scene, Usage,
};
use thiserror::Error;

/// Identifiers an input may never be named after.
pub const FORBIDDEN_NAMES: &[&str] = &[
    "true", "false", "simp", "pi", "e", "i", "inf", "minf", "und", "ind", "infinity", "and",
    "or", "not", "if", "then", "else", "elseif", "for", "in", "do", "thru", "step", "block",
    "lambda", "return", "errcatch",
];

/// Evaluation flags every layer may set.
const GLOBAL_FLAGS: &[&str] = &["simp"];

pub fn is_global_flag(name: &str) -> bool {
    GLOBAL_FLAGS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScopeError {
    #[error("state variable '{0}' is referenced before state is initialized")]
    PrematureStateReference(String),

    #[error("{layer} may not overwrite '{name}', which an earlier layer defines")]
    CrossLayerOverwrite { layer: &'static str, name: String },

    #[error("{layer} may not write input '{name}'")]
    InputOverwrite { layer: &'static str, name: String },

    #[error("input name '{0}' is reserved")]
    ForbiddenInputName(String),
}

impl ScopeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ScopeError::PrematureStateReference(_) => ErrorCode::PREMATURE_STATE_REFERENCE,
            ScopeError::CrossLayerOverwrite { .. } => ErrorCode::CROSS_LAYER_OVERWRITE,
            ScopeError::InputOverwrite { .. } => ErrorCode::INPUT_OVERWRITE,
            ScopeError::ForbiddenInputName(_) => ErrorCode::FORBIDDEN_INPUT_NAME,
        }
    }

    fn report(self, errors: &mut CompileErrors, path: &Locator) {
        errors.push_error(QuestionError::new(self.code(), self.to_string()).at(path));
    }
}

/// Question-wide names the scene layers are checked against.
#[derive(Debug, Clone, Default)]
pub struct QuestionScope {
    pub state_names: BTreeSet<String>,
    /// Names written by the question variables.
    pub qv_writes: BTreeSet<String>,
}

impl QuestionScope {
    /// Check the question-level layers: neither state initial values nor
    /// question variables may read state.
    pub fn new(
        question: &Question,
        qv: &Usage,
        state_init: &[Usage],
        errors: &mut CompileErrors,
    ) -> Self {
        let state_names: BTreeSet<String> =
            question.state_variables.iter().map(|sv| sv.name.clone()).collect();

        for (i, usage) in state_init.iter().enumerate() {
            for name in usage.read.intersection(&state_names) {
                ScopeError::PrematureStateReference(name.clone())
                    .report(errors, &Locator::root().state_variable(i).field("initial_value"));
            }
        }
        let qv_path = Locator::root().field("question_variables");
        for name in qv.read.intersection(&state_names) {
            ScopeError::PrematureStateReference(name.clone()).report(errors, &qv_path);
        }
        for name in qv.write.intersection(&state_names) {
            ScopeError::CrossLayerOverwrite {
                layer: "question variables",
                name: name.clone(),
            }
            .report(errors, &qv_path);
        }

        Self {
            state_names,
            qv_writes: qv.write.iter().filter(|n| !is_global_flag(n)).cloned().collect(),
        }
    }

    /// Check one scene's layers. Returns `false` when the scene broke a
    /// rule, in which case its PRTs must not be compiled.
    pub fn check_scene(
        &self,
        index: usize,
        scene: &Scene,
        scene_vars: &Usage,
        errors: &mut CompileErrors,
    ) -> bool {
        let before = errors.total_errors;
        let path = Locator::root().scene(index);
        let inputs: BTreeSet<String> = scene.input_names().into_iter().collect();

        for (i, input) in scene.inputs.iter().enumerate() {
            let name = input.name.as_str();
            if FORBIDDEN_NAMES.contains(&name) || self.state_names.contains(name) {
                ScopeError::ForbiddenInputName(name.to_string())
                    .report(errors, &path.input(i).field("name"));
            }
        }
        for name in self.qv_writes.intersection(&inputs) {
            ScopeError::InputOverwrite {
                layer: "question variables",
                name: name.clone(),
            }
            .report(errors, &Locator::root().field("question_variables"));
        }

        let vars_path = path.field("scene_variables");
        for name in scene_vars.write.iter().filter(|n| !is_global_flag(n)) {
            if self.qv_writes.contains(name) || self.state_names.contains(name) {
                ScopeError::CrossLayerOverwrite {
                    layer: "scene variables",
                    name: name.clone(),
                }
                .report(errors, &vars_path);
            } else if inputs.contains(name) {
                ScopeError::InputOverwrite {
                    layer: "scene variables",
                    name: name.clone(),
                }
                .report(errors, &vars_path);
            }
        }

        for (p, prt) in scene.prts.iter().enumerate() {
            let prt_path = path.prt(p);
            check_input_writes(
                "feedback variables",
                &prt.feedback_variables,
                &inputs,
                &prt_path.field("feedback_variables"),
                errors,
            );
            for (n, node) in prt.nodes.iter().enumerate() {
                for outcome in [true, false] {
                    check_input_writes(
                        "transition code",
                        &node.branch(outcome).variables,
                        &inputs,
                        &prt_path.node(n).branch(outcome).field("variables"),
                        errors,
                    );
                }
            }
        }

        errors.total_errors == before
    }
}

/// Report writes to inputs in PRT code. Code that fails to parse is left
/// for the PRT compiler to report.
fn check_input_writes(
    layer: &'static str,
    source: &str,
    inputs: &BTreeSet<String>,
    path: &Locator,
    errors: &mut CompileErrors,
) {
    let Ok(fragment) = parse_fragment(source).into_result() else {
        return;
    };
    for name in analyze_fragment(&fragment).write.intersection(inputs) {
        ScopeError::InputOverwrite {
            layer,
            name: name.clone(),
        }
        .report(errors, path);
    }
}
