//! Machine-readable answer-test table for authoring tools.
//!
//! Generated from the registry, so option editors and static checks in
//! the authoring UI always match what the compiler accepts.

use serde::Serialize;
use stateq_prt::{AnswerTestRegistry, TestDescription};

#[derive(Serialize)]
struct AnswerTestTable {
    version: &'static str,
    total_tests: usize,
    tests: Vec<TestDescription>,
}

/// JSON table of every test in `registry`, sorted by codename.
///
/// ```json
/// {
///   "version": "1",
///   "total_tests": 23,
///   "tests": [
///     { "codename": "AlgEquiv",
///       "options": { "kind": { "type": "none" }, "required": false, "description": "" },
///       "requires_teacher_answer": true,
///       "requires_direct_input": false }
///   ]
/// }
/// ```
pub fn answer_test_table(registry: &AnswerTestRegistry) -> String {
    let tests = registry.describe();
    let table = AnswerTestTable {
        version: crate::ARTIFACT_FORMAT_VERSION,
        total_tests: tests.len(),
        tests,
    };
    serde_json::to_string_pretty(&table).unwrap_or_else(|e| {
        format!(
            r#"{{"version":"{}","total_tests":0,"tests":[],"error":"{}"}}"#,
            crate::ARTIFACT_FORMAT_VERSION,
            e
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lists_whole_catalog() {
        let table: serde_json::Value =
            serde_json::from_str(&answer_test_table(&AnswerTestRegistry::new())).unwrap();
        assert_eq!(table["total_tests"], 23);
        let tests = table["tests"].as_array().unwrap();
        assert_eq!(tests.len(), 23);

        let sigfigs = tests
            .iter()
            .find(|t| t["codename"] == "NumSigFigs")
            .unwrap();
        assert_eq!(sigfigs["requires_direct_input"], true);
        assert_eq!(sigfigs["options"]["required"], true);
    }

    #[test]
    fn test_empty_registry() {
        let table: serde_json::Value =
            serde_json::from_str(&answer_test_table(&AnswerTestRegistry::empty())).unwrap();
        assert_eq!(table["total_tests"], 0);
        assert_eq!(table["version"], crate::ARTIFACT_FORMAT_VERSION);
    }
}
