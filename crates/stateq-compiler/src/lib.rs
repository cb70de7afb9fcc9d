//! stateq compiler: orchestrates the full question pipeline.
//!
//! ```text
//! Question JSON → structure checks → scoping → CASText / PRT compilers → artifacts
//! ```
//!
//! The result is a map from logical key (`qv`, `state-init`,
//! `scene-<s>-variables`, `scene-<s>-text`, `scene-<s>-vbox-<v>`,
//! `scene-<s>-prt-<p>`, `forbiddenkeys`) to a CAS function or key list,
//! plus a content hash the runtime caches compiled questions under.

mod builder;
pub mod reference;
pub mod scope;
pub mod structure;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stateq_castext::TemplateParser;
use stateq_prt::AnswerTestRegistry;
use stateq_types::{CompileErrors, CompileOptions, ErrorCode, Question, QuestionError};
use tracing::debug;

pub use builder::{scene_key, Artifact, QuestionBuilder};

/// Version of the artifact layout. Part of every content hash, so cached
/// artifacts from an older layout never match.
pub const ARTIFACT_FORMAT_VERSION: &str = "1";

/// Everything the runtime needs to serve one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuestion {
    pub name: String,
    pub entry_scene: String,
    pub artifacts: BTreeMap<String, Artifact>,
    /// Hex SHA-256 over the format version and every artifact.
    pub content_hash: String,
}

impl CompiledQuestion {
    pub fn artifact(&self, key: &str) -> Option<&Artifact> {
        self.artifacts.get(key)
    }

    /// Every function definition, in key order.
    pub fn program(&self) -> String {
        self.artifacts
            .values()
            .filter_map(Artifact::code)
            .collect::<Vec<_>>()
            .join(";\n")
    }
}

/// Result of a full compilation, suitable for JSON serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    pub question: Option<CompiledQuestion>,
    /// Errors and warnings, both present on success too.
    pub errors: CompileErrors,
}

/// Hex SHA-256 of `artifacts` under the current format version.
pub fn content_hash(artifacts: &BTreeMap<String, Artifact>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ARTIFACT_FORMAT_VERSION.as_bytes());
    for (key, artifact) in artifacts {
        hasher.update([0]);
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(artifact.content().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Compiles questions with one registry and template parser.
pub struct QuestionCompiler {
    options: CompileOptions,
    registry: AnswerTestRegistry,
    template_parser: Option<Box<dyn TemplateParser>>,
}

impl QuestionCompiler {
    /// The built-in answer-test catalog and no template parser.
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            registry: AnswerTestRegistry::new(),
            template_parser: None,
        }
    }

    pub fn with_registry(mut self, registry: AnswerTestRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Enables inline `castext("...")` expansion.
    pub fn with_template_parser(mut self, parser: Box<dyn TemplateParser>) -> Self {
        self.template_parser = Some(parser);
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn registry(&self) -> &AnswerTestRegistry {
        &self.registry
    }

    pub fn compile(&self, question: &Question) -> Result<CompiledQuestion, CompileErrors> {
        let result = self.compile_to_result(question);
        match result.question {
            Some(compiled) if result.success => Ok(compiled),
            _ => Err(result.errors),
        }
    }

    pub fn compile_to_result(&self, question: &Question) -> CompileResult {
        let (artifacts, errors) = QuestionBuilder::new(question, &self.options, &self.registry)
            .with_template_parser(self.template_parser.as_deref())
            .build();
        if errors.has_errors() {
            return CompileResult {
                success: false,
                question: None,
                errors,
            };
        }

        let content_hash = content_hash(&artifacts);
        debug!(
            question = %question.name,
            artifacts = artifacts.len(),
            hash = %content_hash,
            "compiled question"
        );
        CompileResult {
            success: true,
            question: Some(CompiledQuestion {
                name: question.name.clone(),
                entry_scene: question.entry_scene_name().unwrap_or_default().to_string(),
                artifacts,
                content_hash,
            }),
            errors,
        }
    }

    /// Compile a question given as JSON; returns a JSON `CompileResult`.
    ///
    /// An unreadable document is reported like any other error.
    pub fn compile_json(&self, json: &str) -> String {
        let result = match serde_json::from_str::<Question>(json) {
            Ok(question) => self.compile_to_result(&question),
            Err(e) => {
                let mut errors = CompileErrors::empty();
                errors.push_error(QuestionError::new(
                    ErrorCode::INVALID_DOCUMENT,
                    format!("invalid question document: {e}"),
                ));
                CompileResult {
                    success: false,
                    question: None,
                    errors,
                }
            }
        };
        serde_json::to_string(&result).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"question":null,"errors":{{"errors":[{{"message":"Serialization error: {}"}}],"warnings":[],"total_errors":1,"total_warnings":0}}}}"#,
                e
            )
        })
    }
}

/// Compile with the built-in answer-test catalog.
pub fn compile_question(
    question: &Question,
    options: &CompileOptions,
) -> Result<CompiledQuestion, CompileErrors> {
    QuestionCompiler::new(options.clone()).compile(question)
}

/// Compile with the built-in catalog, returning a serializable result.
pub fn compile_to_result(question: &Question, options: &CompileOptions) -> CompileResult {
    QuestionCompiler::new(options.clone()).compile_to_result(question)
}

/// Compile a JSON question document to a JSON `CompileResult`.
pub fn compile_json(json: &str, options: &CompileOptions) -> String {
    QuestionCompiler::new(options.clone()).compile_json(json)
}
