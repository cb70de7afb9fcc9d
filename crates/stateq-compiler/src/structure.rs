//! Structural checks over the question model.
//!
//! Names must be present, identifier-shaped and unique within their
//! collection; storage numbers unique; the entry scene must exist and
//! validation boxes may only refer to declared inputs.

use std::collections::BTreeMap;

use stateq_types::{CompileErrors, ErrorCode, Locator, Question, QuestionError, ValidationBoxKind};
use thiserror::Error;

/// Nodes allowed in one PRT.
pub const MAX_PRT_NODES: usize = 500;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructureError {
    #[error("{what} name is empty")]
    EmptyName { what: &'static str },

    #[error("{what} name '{name}' is not an identifier")]
    InvalidName { what: &'static str, name: String },

    #[error("duplicate {what} name '{name}'")]
    DuplicateName { what: &'static str, name: String },

    #[error("storage number {0} is used by more than one state variable")]
    DuplicateStorage(u32),

    #[error("entry scene '{0}' does not exist")]
    UnknownEntryScene(String),

    #[error("question has no scenes")]
    NoScenes,

    #[error("PRT has {count} nodes, more than the limit of {limit}")]
    TooManyNodes { count: usize, limit: usize },

    #[error("validation box refers to unknown input '{0}'")]
    UnknownVboxInput(String),

    #[error("custom validation box has no text")]
    MissingVboxText,
}

impl StructureError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StructureError::EmptyName { .. } => ErrorCode::EMPTY_NAME,
            StructureError::InvalidName { .. } => ErrorCode::INVALID_NAME,
            StructureError::DuplicateName { .. } => ErrorCode::DUPLICATE_NAME,
            StructureError::DuplicateStorage(_) => ErrorCode::DUPLICATE_STORAGE_NUMBER,
            StructureError::UnknownEntryScene(_) | StructureError::NoScenes => {
                ErrorCode::UNKNOWN_ENTRY_SCENE
            }
            StructureError::TooManyNodes { .. } | StructureError::MissingVboxText => {
                ErrorCode::STRUCTURAL_LIMIT_EXCEEDED
            }
            StructureError::UnknownVboxInput(_) => ErrorCode::UNKNOWN_VBOX_INPUT,
        }
    }

    fn report(self, errors: &mut CompileErrors, path: &Locator) {
        errors.push_error(QuestionError::new(self.code(), self.to_string()).at(path));
    }
}

/// `[A-Za-z][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check every name in one collection; `path_of(i)` locates item `i`.
fn check_names<'n>(
    what: &'static str,
    names: impl IntoIterator<Item = &'n str>,
    path_of: impl Fn(usize) -> Locator,
    errors: &mut CompileErrors,
) {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, name) in names.into_iter().enumerate() {
        let path = path_of(i).field("name");
        if name.is_empty() {
            StructureError::EmptyName { what }.report(errors, &path);
        } else if !is_identifier(name) {
            StructureError::InvalidName {
                what,
                name: name.to_string(),
            }
            .report(errors, &path);
        } else if seen.insert(name, i).is_some() {
            StructureError::DuplicateName {
                what,
                name: name.to_string(),
            }
            .report(errors, &path);
        }
    }
}

pub fn check(question: &Question, errors: &mut CompileErrors) {
    let root = Locator::root();

    check_names(
        "state variable",
        question.state_variables.iter().map(|sv| sv.name.as_str()),
        |i| root.state_variable(i),
        errors,
    );
    let mut storage: BTreeMap<u32, usize> = BTreeMap::new();
    for (i, sv) in question.state_variables.iter().enumerate() {
        if storage.insert(sv.storage, i).is_some() {
            StructureError::DuplicateStorage(sv.storage)
                .report(errors, &root.state_variable(i).field("storage"));
        }
    }

    check_names(
        "scene",
        question.scenes.iter().map(|s| s.name.as_str()),
        |i| root.scene(i),
        errors,
    );
    match (&question.entry_scene, question.scenes.is_empty()) {
        (_, true) => StructureError::NoScenes.report(errors, &root.field("scenes")),
        (Some(entry), false) if question.scene(entry).is_none() => {
            StructureError::UnknownEntryScene(entry.clone()).report(errors, &root.field("entry_scene"))
        }
        _ => {}
    }

    for (s, scene) in question.scenes.iter().enumerate() {
        let scene_path = root.scene(s);
        check_names(
            "input",
            scene.inputs.iter().map(|i| i.name.as_str()),
            |i| scene_path.input(i),
            errors,
        );
        check_names(
            "PRT",
            scene.prts.iter().map(|p| p.name.as_str()),
            |i| scene_path.prt(i),
            errors,
        );
        check_names(
            "validation box",
            scene.validation_boxes.iter().map(|v| v.name.as_str()),
            |i| scene_path.validation_box(i),
            errors,
        );

        for (p, prt) in scene.prts.iter().enumerate() {
            let prt_path = scene_path.prt(p);
            if prt.nodes.len() > MAX_PRT_NODES {
                StructureError::TooManyNodes {
                    count: prt.nodes.len(),
                    limit: MAX_PRT_NODES,
                }
                .report(errors, &prt_path.field("nodes"));
            }
            check_names(
                "node",
                prt.nodes.iter().map(|n| n.name.as_str()),
                |i| prt_path.node(i),
                errors,
            );
        }

        for (v, vbox) in scene.validation_boxes.iter().enumerate() {
            let path = scene_path.validation_box(v);
            for input in &vbox.inputs {
                if scene.input(input).is_none() {
                    StructureError::UnknownVboxInput(input.clone()).report(errors, &path.field("inputs"));
                }
            }
            if vbox.kind == ValidationBoxKind::Custom && vbox.text.is_none() {
                StructureError::MissingVboxText.report(errors, &path.field("text"));
            }
        }
    }
}
