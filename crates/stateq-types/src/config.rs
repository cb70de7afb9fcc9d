//! Compile options shared by every stage.

use serde::{Deserialize, Serialize};

/// Tuning knobs for code generation. Every field has a default, so
/// `{}` is a valid options document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Maximum arguments in one `sconcat` call before it is left-folded.
    pub concat_arg_limit: usize,
    /// Decimal places kept when rounding PRT score and penalty.
    pub score_decimals: u32,
    /// Errors tolerated in one PRT node before the whole PRT fails.
    pub max_node_errors: u32,
    /// Nesting limit for inline `castext("...")` expansion.
    pub max_inline_depth: usize,
    /// LaTeX environments that switch on math mode.
    pub math_environments: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            concat_arg_limit: 40,
            score_decimals: 3,
            max_node_errors: 1,
            max_inline_depth: 8,
            math_environments: [
                "equation",
                "equation*",
                "align",
                "align*",
                "eqnarray",
                "eqnarray*",
                "multline",
                "multline*",
                "gather",
                "gather*",
                "displaymath",
                "math",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl CompileOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Multiplier used for score rounding, `10^score_decimals`.
    pub fn score_scale(&self) -> i64 {
        10_i64.pow(self.score_decimals.min(9))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let opts = CompileOptions::from_json("{}").unwrap();
        assert_eq!(opts, CompileOptions::default());
        assert_eq!(opts.concat_arg_limit, 40);
        assert_eq!(opts.score_scale(), 1000);
    }

    #[test]
    fn partial_document_overrides_one_field() {
        let opts = CompileOptions::from_json(r#"{"max_node_errors": 3}"#).unwrap();
        assert_eq!(opts.max_node_errors, 3);
        assert_eq!(opts.score_decimals, 3);
        assert!(opts.math_environments.iter().any(|e| e == "align*"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(CompileOptions::from_json(r#"{"concat_arg_limit": "many"}"#).is_err());
    }
}
