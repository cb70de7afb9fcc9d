//! Question and scene function builder.
//!
//! Drives every stage over one question and collects the named CAS
//! functions the runtime loads: question variables, state initial
//! values, per scene its variables, text, custom validation boxes and
//! PRTs, plus the identifiers inputs must never be named after.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use stateq_castext::{compile_castext, CasTextContext, TemplateParser};
use stateq_parser::{parse_expression, parse_fragment};
use stateq_prt::{compile_prt, AnswerTestRegistry, PrtContext};
use stateq_types::{
    analyze_expr, analyze_fragment, CasExpr, CasText, CompileErrors, CompileOptions, Fragment,
    Locator, Question, Statement, Usage,
};
use tracing::{debug, trace};

use crate::scope::{is_global_flag, QuestionScope};
use crate::structure;

/// Local holding the outer `simp` across a flagged statement.
const SAVED_SIMP: &str = "%_s";

/// One compiled output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// A zero-argument CAS function definition.
    Function {
        name: String,
        code: String,
        /// Declared inputs the function reads.
        #[serde(default)]
        inputs: Vec<String>,
    },
    /// A compiled PRT; `value` is the PRT's weight within the scene.
    Prt {
        name: String,
        code: String,
        inputs: Vec<String>,
        order: Vec<String>,
        value: f64,
    },
    Keys { names: Vec<String> },
}

impl Artifact {
    /// Text the artifact contributes to the content hash.
    pub fn content(&self) -> String {
        match self {
            Artifact::Function { code, .. } | Artifact::Prt { code, .. } => code.clone(),
            Artifact::Keys { names } => names.join(","),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Artifact::Function { code, .. } | Artifact::Prt { code, .. } => Some(code),
            Artifact::Keys { .. } => None,
        }
    }
}

pub fn scene_key(scene: &str, part: &str) -> String {
    format!("scene-{scene}-{part}")
}

/// Builds the artifact map of one question.
pub struct QuestionBuilder<'a> {
    question: &'a Question,
    options: &'a CompileOptions,
    registry: &'a AnswerTestRegistry,
    template_parser: Option<&'a dyn TemplateParser>,
    errors: CompileErrors,
    artifacts: BTreeMap<String, Artifact>,
    /// Global names written by question and scene variables.
    forbidden: BTreeSet<String>,
}

impl<'a> QuestionBuilder<'a> {
    pub fn new(
        question: &'a Question,
        options: &'a CompileOptions,
        registry: &'a AnswerTestRegistry,
    ) -> Self {
        Self {
            question,
            options,
            registry,
            template_parser: None,
            errors: CompileErrors::empty(),
            artifacts: BTreeMap::new(),
            forbidden: BTreeSet::new(),
        }
    }

    pub fn with_template_parser(mut self, parser: Option<&'a dyn TemplateParser>) -> Self {
        self.template_parser = parser;
        self
    }

    /// Run every stage. Artifacts are kept only when nothing failed.
    pub fn build(mut self) -> (BTreeMap<String, Artifact>, CompileErrors) {
        let question = self.question;
        debug!(question = %question.name, scenes = question.scenes.len(), "building question");

        structure::check(question, &mut self.errors);

        let qv_usage = self.question_variables();
        let state_usage = self.state_init();
        let scope = QuestionScope::new(question, &qv_usage, &state_usage, &mut self.errors);
        self.forbidden.extend(scope.qv_writes.iter().cloned());
        self.forbidden.extend(scope.state_names.iter().cloned());

        let scene_names = question.scene_names();
        for (s, scene) in question.scenes.iter().enumerate() {
            let path = Locator::root().scene(s);
            let inputs = scene.input_names();
            debug!(scene = %scene.name, prts = scene.prts.len(), "building scene");

            let vars_usage = self.scene_variables(s);
            let in_scope = scope.check_scene(s, scene, &vars_usage, &mut self.errors);
            self.forbidden
                .extend(vars_usage.write.iter().filter(|n| !is_global_flag(n)).cloned());

            let text_function = format!("%_scene_{}_text", scene.name);
            self.castext(
                scene_key(&scene.name, "text"),
                text_function,
                &scene.text,
                &inputs,
                &path.field("text"),
            );
            for (v, vbox) in scene.validation_boxes.iter().enumerate() {
                if let Some(text) = &vbox.text {
                    self.castext(
                        scene_key(&scene.name, &format!("vbox-{}", vbox.name)),
                        format!("%_scene_{}_vbox_{}", scene.name, vbox.name),
                        text,
                        &vbox.inputs,
                        &path.validation_box(v).field("text"),
                    );
                }
            }

            if !in_scope {
                debug!(scene = %scene.name, "scoping errors, skipping PRTs");
                continue;
            }
            let ctx = PrtContext::new(self.options, self.registry, &scene.name)
                .with_scene_names(&scene_names)
                .with_inputs(&inputs)
                .with_state_variables(&question.state_variables);
            let ctx = match self.template_parser {
                Some(parser) => ctx.with_template_parser(parser),
                None => ctx,
            };
            for (p, prt) in scene.prts.iter().enumerate() {
                let result = compile_prt(prt, &ctx);
                self.errors.absorb(result.errors, &path.prt(p));
                if let Some(compiled) = result.value {
                    self.insert(
                        scene_key(&scene.name, &format!("prt-{}", prt.name)),
                        Artifact::Prt {
                            name: compiled.function,
                            code: compiled.code,
                            inputs: compiled.inputs,
                            order: compiled.order,
                            value: compiled.value,
                        },
                    );
                }
            }
        }

        let names = std::mem::take(&mut self.forbidden).into_iter().collect();
        self.insert("forbiddenkeys".to_string(), Artifact::Keys { names });

        if self.errors.has_errors() {
            debug!(errors = self.errors.total_errors, "question failed to compile");
            return (BTreeMap::new(), self.errors);
        }
        (self.artifacts, self.errors)
    }

    fn insert(&mut self, key: String, artifact: Artifact) {
        debug!(key = %key, bytes = artifact.content().len(), "artifact");
        self.artifacts.insert(key, artifact);
    }

    // ──────────────────────────────────────────────────────────────────────
    // Question layers
    // ──────────────────────────────────────────────────────────────────────

    fn question_variables(&mut self) -> Usage {
        let question = self.question;
        let path = Locator::root().field("question_variables");
        let Some(fragment) = self.fragment(&question.question_variables, &path) else {
            return Usage::new();
        };
        let usage = analyze_fragment(&fragment);
        self.insert("qv".to_string(), function("%_qv", statements(fragment), &[]));
        usage
    }

    /// `%_state_init() := [[storage, value], ...]`; one usage per state variable.
    fn state_init(&mut self) -> Vec<Usage> {
        let question = self.question;
        let mut usages = Vec::with_capacity(question.state_variables.len());
        let mut pairs = Vec::with_capacity(question.state_variables.len());
        for (i, sv) in question.state_variables.iter().enumerate() {
            let path = Locator::root().state_variable(i).field("initial_value");
            match parse_expression(&sv.initial_value).into_result() {
                Ok(value) => {
                    usages.push(analyze_expr(&value));
                    pairs.push(CasExpr::list(vec![CasExpr::int(i64::from(sv.storage)), value]));
                }
                Err(errors) => {
                    self.errors.absorb(errors, &path);
                    usages.push(Usage::new());
                }
            }
        }
        let expr = CasExpr::define_function("%_state_init", CasExpr::list(pairs));
        self.insert(
            "state-init".to_string(),
            Artifact::Function {
                name: "%_state_init".to_string(),
                code: expr.to_string(),
                inputs: Vec::new(),
            },
        );
        usages
    }

    fn scene_variables(&mut self, s: usize) -> Usage {
        let question = self.question;
        let scene = &question.scenes[s];
        let path = Locator::root().scene(s).field("scene_variables");
        let Some(fragment) = self.fragment(&scene.scene_variables, &path) else {
            return Usage::new();
        };
        let usage = analyze_fragment(&fragment);
        let inputs = scene.input_names();
        let name = format!("%_scene_{}_variables", scene.name);
        self.insert(
            scene_key(&scene.name, "variables"),
            function(&name, statements(fragment), &inputs),
        );
        usage
    }

    fn fragment(&mut self, source: &str, path: &Locator) -> Option<Fragment> {
        let parsed = parse_fragment(source);
        if parsed.errors.has_errors() {
            self.errors.absorb(parsed.errors, path);
            return None;
        }
        parsed.value
    }

    fn castext(&mut self, key: String, name: String, text: &CasText, inputs: &[String], path: &Locator) {
        let ctx = CasTextContext::new(self.options).with_inputs(inputs);
        let ctx = match self.template_parser {
            Some(parser) => ctx.with_template_parser(parser),
            None => ctx,
        };
        match compile_castext(text, &ctx) {
            Ok(compiled) => {
                trace!(key = %key, flat = compiled.flat, "compiled template");
                let expr = CasExpr::define_function(name.as_str(), compiled.expr);
                self.insert(
                    key,
                    Artifact::Function {
                        name,
                        code: expr.to_string(),
                        inputs: read_inputs(&expr, inputs),
                    },
                );
            }
            Err(errors) => self.errors.absorb(errors, path),
        }
    }
}

/// Statement expressions, with `simp` flags applied around their statement.
fn statements(fragment: Fragment) -> Vec<CasExpr> {
    fragment.statements.into_iter().map(with_simp_flag).collect()
}

/// `block([%_s: simp], simp: v, stmt, simp: %_s)` for a statement carrying
/// a `simp` flag; the bare expression otherwise.
fn with_simp_flag(statement: Statement) -> CasExpr {
    let Some(flag) = statement.flag("simp") else {
        return statement.expr;
    };
    let value = flag.value.clone().unwrap_or_else(|| CasExpr::boolean(true));
    CasExpr::block(
        vec![CasExpr::assign(SAVED_SIMP, CasExpr::ident("simp"))],
        vec![
            CasExpr::assign("simp", value),
            statement.expr,
            CasExpr::assign("simp", CasExpr::ident(SAVED_SIMP)),
        ],
    )
}

/// `name() := (statements..., true)`
fn function(name: &str, mut body: Vec<CasExpr>, inputs: &[String]) -> Artifact {
    body.push(CasExpr::boolean(true));
    let expr = CasExpr::define_function(name, CasExpr::group(body));
    Artifact::Function {
        name: name.to_string(),
        code: expr.to_string(),
        inputs: read_inputs(&expr, inputs),
    }
}

fn read_inputs(expr: &CasExpr, inputs: &[String]) -> Vec<String> {
    let read = analyze_expr(expr).read;
    inputs
        .iter()
        .filter(|input| read.contains(input.as_str()))
        .cloned()
        .collect()
}
