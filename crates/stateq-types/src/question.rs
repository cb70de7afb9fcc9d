//! The question definition consumed by the compilers.
//!
//! Code-valued fields hold raw CAS source; templates hold an already
//! tokenized [`CasText`]. The model is read-only during compilation.

use serde::{Deserialize, Serialize};

use crate::CasText;

// ══════════════════════════════════════════════════════════════════════════════
// Question
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub name: String,
    #[serde(default)]
    pub question_variables: String,
    #[serde(default)]
    pub state_variables: Vec<StateVariable>,
    pub scenes: Vec<Scene>,
    /// Scene shown first; defaults to the first declared scene.
    #[serde(default)]
    pub entry_scene: Option<String>,
}

impl Question {
    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.name == name)
    }

    pub fn entry_scene_name(&self) -> Option<&str> {
        self.entry_scene
            .as_deref()
            .or_else(|| self.scenes.first().map(|s| s.name.as_str()))
    }

    pub fn scene_names(&self) -> Vec<String> {
        self.scenes.iter().map(|s| s.name.clone()).collect()
    }
}

/// A question-scoped slot that survives scene transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVariable {
    pub name: String,
    /// Stable storage key, independent of the display name.
    pub storage: u32,
    /// Authoring hint only.
    #[serde(rename = "type", default = "default_declared_type")]
    pub declared_type: String,
    #[serde(default = "default_initial_value")]
    pub initial_value: String,
}

fn default_declared_type() -> String {
    "any".to_string()
}

fn default_initial_value() -> String {
    "false".to_string()
}

// ══════════════════════════════════════════════════════════════════════════════
// Scene
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    #[serde(default)]
    pub scene_variables: String,
    #[serde(default)]
    pub text: CasText,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub prts: Vec<Prt>,
    #[serde(default)]
    pub validation_boxes: Vec<ValidationBox>,
}

impl Scene {
    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|i| i.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    #[serde(default)]
    pub kind: InputKind,
    #[serde(default)]
    pub teacher_answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Algebraic,
    Numerical,
    Units,
    String,
    Textarea,
    Matrix,
    Boolean,
    Dropdown,
    Checkbox,
    Radio,
    Notes,
}

/// Where an input's validation feedback is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationBox {
    pub name: String,
    #[serde(default)]
    pub kind: ValidationBoxKind,
    pub inputs: Vec<String>,
    /// Only for [`ValidationBoxKind::Custom`].
    #[serde(default)]
    pub text: Option<CasText>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationBoxKind {
    #[default]
    Auto,
    Compact,
    Symbolic,
    Custom,
}

// ══════════════════════════════════════════════════════════════════════════════
// PRT
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prt {
    pub name: String,
    #[serde(default = "default_prt_value")]
    pub value: f64,
    #[serde(default)]
    pub scoremode: ScoreMode,
    #[serde(default)]
    pub feedback_variables: String,
    pub root: String,
    pub nodes: Vec<PrtNode>,
}

fn default_prt_value() -> f64 {
    1.0
}

impl Prt {
    pub fn node(&self, name: &str) -> Option<&PrtNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }
}

/// How attempt scores combine. Only `no score` changes the generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScoreMode {
    #[serde(rename = "no score")]
    NoScore,
    #[default]
    #[serde(rename = "first")]
    First,
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "bestn")]
    BestN,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrtNode {
    pub name: String,
    /// Answer-test codename.
    pub test: String,
    pub sans: String,
    #[serde(default)]
    pub tans: String,
    #[serde(default)]
    pub options: String,
    #[serde(default)]
    pub quiet: bool,
    #[serde(rename = "true", default)]
    pub true_branch: Branch,
    #[serde(rename = "false", default)]
    pub false_branch: Branch,
}

impl PrtNode {
    pub fn branch(&self, outcome: bool) -> &Branch {
        if outcome {
            &self.true_branch
        } else {
            &self.false_branch
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Branch {
    /// Score adjustment; `None` leaves the score untouched.
    #[serde(default)]
    pub score: Option<String>,
    #[serde(default)]
    pub score_mode: ScoreOp,
    #[serde(default)]
    pub penalty: Option<String>,
    #[serde(default)]
    pub penalty_mode: ScoreOp,
    #[serde(default)]
    pub feedback: CasText,
    /// Transition code, run only on scene and state-variable exits.
    #[serde(default)]
    pub variables: String,
    #[serde(default)]
    pub exit: Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScoreOp {
    #[default]
    #[serde(rename = "=")]
    Set,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Exit {
    /// Leave the graph without a transition.
    #[default]
    End,
    Node {
        target: String,
    },
    Scene {
        target: String,
    },
    /// Update state variables and re-enter the current scene.
    StateTransition,
}

impl Exit {
    pub fn is_transition(&self) -> bool {
        matches!(self, Exit::Scene { .. } | Exit::StateTransition)
    }

    pub fn node_target(&self) -> Option<&str> {
        match self {
            Exit::Node { target } => Some(target),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_question_deserializes_with_defaults() {
        let json = r#"{
            "name": "q",
            "scenes": [{
                "name": "s1",
                "inputs": [{"name": "ans1", "teacher_answer": "x^2"}],
                "prts": [{
                    "name": "p",
                    "root": "n1",
                    "nodes": [{
                        "name": "n1",
                        "test": "AlgEquiv",
                        "sans": "ans1",
                        "tans": "x^2",
                        "true": {"score": "1", "exit": {"kind": "scene", "target": "s2"}}
                    }]
                }]
            }]
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.entry_scene_name(), Some("s1"));
        let prt = &q.scenes[0].prts[0];
        assert_eq!(prt.scoremode, ScoreMode::First);
        assert_eq!(prt.value, 1.0);
        let node = prt.node("n1").unwrap();
        assert_eq!(node.true_branch.score.as_deref(), Some("1"));
        assert_eq!(node.true_branch.score_mode, ScoreOp::Set);
        assert!(node.true_branch.exit.is_transition());
        assert_eq!(node.false_branch.exit, Exit::End);
        assert!(node.false_branch.feedback.is_empty());
    }

    #[test]
    fn score_mode_uses_author_facing_names() {
        let mode: ScoreMode = serde_json::from_str("\"no score\"").unwrap();
        assert_eq!(mode, ScoreMode::NoScore);
        let op: ScoreOp = serde_json::from_str("\"-\"").unwrap();
        assert_eq!(op, ScoreOp::Subtract);
    }

    #[test]
    fn state_variable_type_defaults() {
        let sv: StateVariable = serde_json::from_str(r#"{"name": "visits", "storage": 3}"#).unwrap();
        assert_eq!(sv.declared_type, "any");
        assert_eq!(sv.initial_value, "false");
    }
}
