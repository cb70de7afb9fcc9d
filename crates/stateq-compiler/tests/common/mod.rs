//! Shared fixture: a two-scene question with one state variable.

#![allow(dead_code)]

use serde_json::{json, Value as Json};
use stateq_compiler::{compile_to_result, CompileResult, CompiledQuestion};
use stateq_eval::{EvalError, Evaluator, Value};
use stateq_types::{CompileOptions, ErrorCode, Question};

/// Template JSON for `prefix{#expr#}`.
pub fn inject_text(prefix: &str, expr: &str) -> Json {
    let source = format!("{prefix}{{#{expr}#}}");
    let split = prefix.len();
    let end = source.len();
    json!({
        "source": source,
        "root": {
            "kind": {"type": "root", "children": [
                {"kind": {"type": "raw", "text": prefix}, "position": {"start": 0, "end": split}},
                {"kind": {"type": "inject", "mode": "value", "expression": expr},
                 "position": {"start": split, "end": end}}
            ]},
            "position": {"start": 0, "end": end}
        }
    })
}

/// Template JSON holding plain text only.
pub fn plain_text(text: &str) -> Json {
    json!({
        "source": text,
        "root": {
            "kind": {"type": "root", "children": [
                {"kind": {"type": "raw", "text": text}, "position": {"start": 0, "end": text.len()}}
            ]},
            "position": {"start": 0, "end": text.len()}
        }
    })
}

/// `s1` asks for `b`; a right answer moves to `s2` and counts the visit.
/// `s2` grades a numeric answer and re-enters itself.
pub fn journey() -> Json {
    json!({
        "name": "journey",
        "question_variables": "a: 3; b: a^2",
        "state_variables": [
            {"name": "visits", "storage": 3, "type": "integer", "initial_value": "0"}
        ],
        "scenes": [
            {
                "name": "s1",
                "scene_variables": "c: b + 1",
                "text": inject_text("b is ", "b"),
                "inputs": [{"name": "ans1", "teacher_answer": "b"}],
                "validation_boxes": [
                    {"name": "vb", "kind": "custom", "inputs": ["ans1"], "text": plain_text("Check ans1")}
                ],
                "prts": [{
                    "name": "p1",
                    "root": "n1",
                    "nodes": [{
                        "name": "n1",
                        "test": "AlgEquiv",
                        "sans": "ans1",
                        "tans": "b",
                        "true": {
                            "score": "1",
                            "variables": "visits: visits + 1",
                            "exit": {"kind": "scene", "target": "s2"}
                        },
                        "false": {"score": "0", "feedback": plain_text("Try again")}
                    }]
                }]
            },
            {
                "name": "s2",
                "inputs": [{"name": "ans2", "kind": "numerical"}],
                "prts": [{
                    "name": "p2",
                    "root": "m1",
                    "nodes": [{
                        "name": "m1",
                        "test": "NumRelative",
                        "sans": "ans2",
                        "tans": "3.14",
                        "options": "0.01",
                        "true": {"score": "1", "exit": {"kind": "state_transition"}}
                    }]
                }]
            }
        ]
    })
}

pub fn question(doc: Json) -> Question {
    serde_json::from_value(doc).expect("fixture deserializes")
}

pub fn compile(doc: Json) -> CompileResult {
    compile_to_result(&question(doc), &CompileOptions::default())
}

pub fn compiled(doc: Json) -> CompiledQuestion {
    let result = compile(doc);
    assert!(result.success, "compile failed: {:?}", result.errors.errors);
    result.question.expect("question on success")
}

/// `(code, path)` of every error.
pub fn errors(doc: Json) -> Vec<(ErrorCode, String)> {
    let result = compile(doc);
    assert!(!result.success, "expected compilation to fail");
    assert!(result.question.is_none());
    result
        .errors
        .errors
        .iter()
        .map(|e| (e.code, e.path.to_string()))
        .collect()
}

pub fn has_error(doc: Json, code: ErrorCode, path: &str) -> bool {
    errors(doc).iter().any(|(c, p)| *c == code && p == path)
}

fn at_result(outcome: bool) -> Value {
    Value::List(vec![Value::Bool(outcome), Value::str(""), Value::str("")])
}

/// Evaluator with every definition of `question` loaded and stub tests.
pub fn load(question: &CompiledQuestion) -> Evaluator {
    let mut ev = Evaluator::new();
    ev.register("ATAlgEquiv", |args| match args {
        [sans, tans] => Ok(at_result(sans.loosely_equals(tans))),
        _ => Err(EvalError::Raised("ATAlgEquiv takes two arguments".into())),
    });
    ev.register("ATNumRelative", |args| match args {
        [sans, tans, tol] => {
            let (Some(s), Some(t), Some(tol)) = (sans.as_f64(), tans.as_f64(), tol.as_f64()) else {
                return Err(EvalError::Raised("non-numeric".into()));
            };
            Ok(at_result((s - t).abs() <= tol * t.abs()))
        }
        _ => Err(EvalError::Raised("ATNumRelative takes three arguments".into())),
    });
    ev.run(&question.program())
        .unwrap_or_else(|e| panic!("definitions failed: {e}\n{}", question.program()));
    ev
}
