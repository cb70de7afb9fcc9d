//! PRT code generation.
//!
//! A PRT compiles to one zero-argument CAS function. Nodes are emitted
//! in reverse postorder as a flat sequence of guarded statements; a
//! node runs when it is the root, or when the path recorded so far holds
//! the token of a branch that exits into it.

use std::collections::BTreeSet;

use serde::Serialize;
use stateq_castext::{compile_castext, CasTextContext, TemplateParser};
use stateq_parser::{parse_expression, parse_fragment};
use stateq_types::{
    analyze_expr, analyze_fragment, BinOp, Branch, CasExpr, CompileErrors, CompileOptions,
    ErrorCode, Exit, Locator, Prt, PrtNode, QuestionError, ScoreMode, ScoreOp, StateVariable,
};
use tracing::{debug, trace, warn};

use crate::answertest::{AnswerTestRegistry, TestCall, RAW_INPUT_PREFIX};
use crate::error::PrtError;
use crate::graph::{self, path_token, Traversal};

const SCORE: &str = "%_score";
const PENALTY: &str = "%_penalty";
const PATH: &str = "%_path";
const RESULTS: &str = "%_results";
const FEEDBACK: &str = "%_feedback";
const ERRORS: &str = "%_errors";
const NEXT_SCENE: &str = "%_next_scene";
const STOP: &str = "%_stop";
const UPDATES: &str = "%_updates";
const TEST_RESULT: &str = "%_at";
const OUTCOME: &str = "%_ok";
const SAVED_SIMP: &str = "%_s";
const BRANCH_RESULT: &str = "%_b";
const NODE_ERRORS: &str = "%_nerr";

/// Note recorded for a test that raised an error.
const TEST_ERROR_NOTE: &str = "ATError";

/// What a PRT compilation may consult besides the PRT itself.
#[derive(Clone, Copy)]
pub struct PrtContext<'a> {
    pub options: &'a CompileOptions,
    pub registry: &'a AnswerTestRegistry,
    /// Name of the scene that owns the PRT.
    pub scene: &'a str,
    /// Every scene a branch may exit to.
    pub scene_names: &'a [String],
    pub inputs: &'a [String],
    pub state_variables: &'a [StateVariable],
    pub template_parser: Option<&'a dyn TemplateParser>,
}

impl<'a> PrtContext<'a> {
    pub fn new(options: &'a CompileOptions, registry: &'a AnswerTestRegistry, scene: &'a str) -> Self {
        Self {
            options,
            registry,
            scene,
            scene_names: &[],
            inputs: &[],
            state_variables: &[],
            template_parser: None,
        }
    }

    pub fn with_scene_names(mut self, scene_names: &'a [String]) -> Self {
        self.scene_names = scene_names;
        self
    }

    pub fn with_inputs(mut self, inputs: &'a [String]) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_state_variables(mut self, state_variables: &'a [StateVariable]) -> Self {
        self.state_variables = state_variables;
        self
    }

    pub fn with_template_parser(mut self, parser: &'a dyn TemplateParser) -> Self {
        self.template_parser = Some(parser);
        self
    }

    fn castext(&self) -> CasTextContext<'a> {
        let ctx = CasTextContext::new(self.options).with_inputs(self.inputs);
        match self.template_parser {
            Some(parser) => ctx.with_template_parser(parser),
            None => ctx,
        }
    }
}

/// A compiled PRT.
///
/// Calling `function()` returns
/// `[score, penalty, path, results, feedback, next_scene, state_updates, errors]`
/// or `[]` when evaluation failed beyond the tolerated error count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledPrt {
    pub name: String,
    /// Name of the generated CAS function.
    pub function: String,
    /// The function definition.
    pub code: String,
    #[serde(skip)]
    pub expr: CasExpr,
    /// Declared inputs the function reads, in declaration order.
    pub inputs: Vec<String>,
    /// Reachable node names in emission order.
    pub order: Vec<String>,
    pub value: f64,
}

/// Output of [`compile_prt`]: the function when there were no errors,
/// plus every diagnostic, located relative to the PRT.
#[derive(Debug, Clone)]
pub struct PrtResult {
    pub value: Option<CompiledPrt>,
    pub errors: CompileErrors,
}

impl PrtResult {
    pub fn into_result(self) -> Result<CompiledPrt, CompileErrors> {
        match self.value {
            Some(compiled) if !self.errors.has_errors() => Ok(compiled),
            _ => Err(self.errors),
        }
    }
}

/// Name of the CAS function generated for `prt` in `scene`.
pub fn function_name(scene: &str, prt: &str) -> String {
    format!("%_prt_{scene}_{prt}")
}

/// Compile a PRT to a CAS function definition.
pub fn compile_prt(prt: &Prt, ctx: &PrtContext<'_>) -> PrtResult {
    debug!(scene = ctx.scene, prt = %prt.name, nodes = prt.nodes.len(), "compiling PRT");
    let mut errors = CompileErrors::empty();

    let traversal = match graph::walk(prt) {
        Ok(traversal) => traversal,
        Err(error) => {
            errors.push_error(error.to_question_error(&graph_error_path(prt, &error)));
            return PrtResult {
                value: None,
                errors,
            };
        }
    };
    for &orphan in &traversal.orphans {
        warn!(prt = %prt.name, node = %prt.nodes[orphan].name, "dropping unreachable node");
        errors.push_warning(
            QuestionError::warning(
                ErrorCode::ORPHAN_NODE,
                format!("node '{}' is not reachable from the root", prt.nodes[orphan].name),
            )
            .at(&Locator::root().node(orphan)),
        );
    }

    let mut compiler = PrtCompiler {
        prt,
        ctx,
        errors,
        writes: BTreeSet::new(),
        transition_writes: BTreeSet::new(),
    };
    let body = compiler.body(&traversal);
    let PrtCompiler {
        errors, writes, ..
    } = compiler;
    if errors.has_errors() {
        return PrtResult {
            value: None,
            errors,
        };
    }

    let function = function_name(ctx.scene, &prt.name);
    let expr = CasExpr::define_function(function.as_str(), CasExpr::block(locals(&writes), body));
    let code = expr.to_string();
    let inputs = read_inputs(&expr, ctx.inputs);
    let order = traversal
        .order
        .iter()
        .map(|&i| prt.nodes[i].name.clone())
        .collect();
    debug!(prt = %prt.name, function = %function, bytes = code.len(), "compiled PRT");

    PrtResult {
        value: Some(CompiledPrt {
            name: prt.name.clone(),
            function,
            code,
            expr,
            inputs,
            order,
            value: prt.value,
        }),
        errors,
    }
}

fn graph_error_path(prt: &Prt, error: &PrtError) -> Locator {
    let node = |name: &str| match prt.node_index(name) {
        Some(i) => Locator::root().node(i),
        None => Locator::root().field("nodes"),
    };
    match error {
        PrtError::MissingRoot { .. } => Locator::root().field("root"),
        PrtError::Cycle { path } => path.first().map_or_else(Locator::root, |n| node(n)),
        PrtError::UnknownExitTarget { node: n, .. } | PrtError::UnknownSceneTarget { node: n, .. } => {
            node(n)
        }
        PrtError::DuplicateNode(_) => Locator::root().field("nodes"),
    }
}

/// Accumulators first, then every name the PRT's own code writes,
/// initialized from its outer value.
fn locals(writes: &BTreeSet<String>) -> Vec<CasExpr> {
    let mut locals = vec![
        CasExpr::assign(SCORE, CasExpr::int(0)),
        CasExpr::assign(PENALTY, CasExpr::int(0)),
        CasExpr::assign(PATH, CasExpr::list(Vec::new())),
        CasExpr::assign(RESULTS, CasExpr::list(Vec::new())),
        CasExpr::assign(FEEDBACK, CasExpr::list(Vec::new())),
        CasExpr::assign(ERRORS, CasExpr::list(Vec::new())),
        CasExpr::assign(NEXT_SCENE, CasExpr::boolean(false)),
        CasExpr::assign(STOP, CasExpr::boolean(false)),
        CasExpr::assign(UPDATES, CasExpr::list(Vec::new())),
        CasExpr::assign(NODE_ERRORS, CasExpr::int(0)),
        CasExpr::ident(TEST_RESULT),
        CasExpr::ident(OUTCOME),
        CasExpr::ident(SAVED_SIMP),
        CasExpr::ident(BRANCH_RESULT),
    ];
    locals.extend(
        writes
            .iter()
            .filter(|name| name.as_str() != "simp")
            .map(|name| CasExpr::assign(name.as_str(), CasExpr::ident(name.as_str()))),
    );
    locals
}

fn read_inputs(expr: &CasExpr, inputs: &[String]) -> Vec<String> {
    let read = analyze_expr(expr).read;
    inputs
        .iter()
        .filter(|input| {
            read.contains(input.as_str()) || read.contains(&format!("{RAW_INPUT_PREFIX}{input}"))
        })
        .cloned()
        .collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Emission helpers
// ══════════════════════════════════════════════════════════════════════════════

fn id(name: &str) -> CasExpr {
    CasExpr::ident(name)
}

fn empty_list() -> CasExpr {
    CasExpr::list(Vec::new())
}

/// `list: endcons(item, list)`
fn append_to(list: &str, item: CasExpr) -> CasExpr {
    CasExpr::assign(list, CasExpr::call("endcons", vec![item, id(list)]))
}

/// `counter: counter + 1`
fn increment(counter: &str) -> CasExpr {
    CasExpr::assign(counter, CasExpr::binary(BinOp::Add, id(counter), CasExpr::int(1)))
}

/// `expr = []`
fn is_empty(expr: CasExpr) -> CasExpr {
    CasExpr::binary(BinOp::Eq, expr, empty_list())
}

fn nth(list: &str, index: i64) -> CasExpr {
    CasExpr::index(id(list), vec![CasExpr::int(index)])
}

/// `if errcatch(stmts..., true) = [] then return([])`
fn abort_on_error(statements: Vec<CasExpr>) -> CasExpr {
    let mut args = statements;
    args.push(CasExpr::boolean(true));
    CasExpr::if_then(
        is_empty(CasExpr::call("errcatch", args)),
        CasExpr::call("return", vec![empty_list()]),
        None,
    )
}

/// `round(max(0, min(1, x)) * scale) / scale`
fn clamp_and_round(name: &str, scale: i64) -> CasExpr {
    let clamped = CasExpr::call(
        "max",
        vec![
            CasExpr::int(0),
            CasExpr::call("min", vec![CasExpr::int(1), id(name)]),
        ],
    );
    let scaled = CasExpr::binary(BinOp::Mul, clamped, CasExpr::int(scale));
    CasExpr::assign(
        name,
        CasExpr::binary(
            BinOp::Div,
            CasExpr::call("round", vec![scaled]),
            CasExpr::int(scale),
        ),
    )
}

// ══════════════════════════════════════════════════════════════════════════════
// PrtCompiler
// ══════════════════════════════════════════════════════════════════════════════

struct PrtCompiler<'p, 'c> {
    prt: &'p Prt,
    ctx: &'c PrtContext<'c>,
    errors: CompileErrors,
    /// Names written by feedback variables and transition code.
    writes: BTreeSet<String>,
    /// The subset written by transition code.
    transition_writes: BTreeSet<String>,
}

impl PrtCompiler<'_, '_> {
    fn body(&mut self, traversal: &Traversal) -> Vec<CasExpr> {
        let prt = self.prt;
        let mut body = Vec::new();

        let (feedback_variables, _) =
            self.fragment(&prt.feedback_variables, &Locator::root().field("feedback_variables"));
        if !feedback_variables.is_empty() {
            body.push(abort_on_error(feedback_variables));
        }

        for &i in &traversal.order {
            let node = &prt.nodes[i];
            let entries = traversal.entries.get(&i).map(Vec::as_slice).unwrap_or(&[]);
            trace!(prt = %prt.name, node = %node.name, entries = entries.len(), "emitting node");
            let guard = guard(traversal.root() == Some(i), entries);
            let statements = self.node(i, node);
            body.push(CasExpr::if_then(guard, CasExpr::group(statements), None));
        }

        body.extend(self.finish());
        body
    }

    /// Parse a statement list; its expressions and the names it writes.
    fn fragment(&mut self, source: &str, path: &Locator) -> (Vec<CasExpr>, BTreeSet<String>) {
        let parsed = parse_fragment(source);
        if parsed.errors.has_errors() {
            self.errors.absorb(parsed.errors, path);
            return (Vec::new(), BTreeSet::new());
        }
        let Some(fragment) = parsed.value else {
            return (Vec::new(), BTreeSet::new());
        };
        let written = analyze_fragment(&fragment).write;
        self.writes.extend(written.iter().cloned());
        let statements = fragment.statements.into_iter().map(|s| s.expr).collect();
        (statements, written)
    }

    fn expression(&mut self, source: &str, path: &Locator) -> Option<CasExpr> {
        match parse_expression(source).into_result() {
            Ok(expr) => Some(expr),
            Err(errors) => {
                self.errors.absorb(errors, path);
                None
            }
        }
    }

    fn optional_expression(&mut self, source: &str, path: &Locator) -> Option<CasExpr> {
        if source.trim().is_empty() {
            None
        } else {
            self.expression(source, path)
        }
    }

    fn node(&mut self, i: usize, node: &PrtNode) -> Vec<CasExpr> {
        let path = Locator::root().node(i);
        let test = self.test_call(&path, node);
        let max_errors = i64::from(self.ctx.options.max_node_errors);

        let mut statements = vec![
            CasExpr::assign(NODE_ERRORS, CasExpr::int(0)),
            CasExpr::assign(SAVED_SIMP, id("simp")),
            CasExpr::assign("simp", CasExpr::boolean(false)),
            CasExpr::assign(TEST_RESULT, CasExpr::call("errcatch", vec![test])),
            CasExpr::assign("simp", id(SAVED_SIMP)),
            CasExpr::if_then(
                is_empty(id(TEST_RESULT)),
                CasExpr::group(vec![
                    append_to(ERRORS, CasExpr::string(format!("{path}/test"))),
                    increment(NODE_ERRORS),
                    CasExpr::assign(
                        TEST_RESULT,
                        CasExpr::list(vec![
                            CasExpr::boolean(false),
                            CasExpr::string(TEST_ERROR_NOTE),
                            CasExpr::string(""),
                        ]),
                    ),
                ]),
                Some(CasExpr::assign(
                    TEST_RESULT,
                    CasExpr::call("first", vec![id(TEST_RESULT)]),
                )),
            ),
            CasExpr::assign(OUTCOME, CasExpr::call("is", vec![nth(TEST_RESULT, 1)])),
            CasExpr::assign(
                PATH,
                CasExpr::call(
                    "cons",
                    vec![
                        CasExpr::if_then(
                            id(OUTCOME),
                            CasExpr::string(path_token(&node.name, true)),
                            Some(CasExpr::string(path_token(&node.name, false))),
                        ),
                        id(PATH),
                    ],
                ),
            ),
            append_to(
                RESULTS,
                CasExpr::list(vec![
                    CasExpr::string(node.name.as_str()),
                    id(OUTCOME),
                    nth(TEST_RESULT, 2),
                ]),
            ),
        ];
        if !node.quiet {
            statements.push(append_to(FEEDBACK, nth(TEST_RESULT, 3)));
        }

        let on_true = self.branch(&path, node, true);
        let on_false = self.branch(&path, node, false);
        if on_true.is_some() || on_false.is_some() {
            let placeholder = || CasExpr::boolean(false);
            statements.push(CasExpr::if_then(
                id(OUTCOME),
                on_true.unwrap_or_else(placeholder),
                Some(on_false.unwrap_or_else(placeholder)),
            ));
        }

        statements.push(CasExpr::if_then(
            CasExpr::binary(BinOp::Greater, id(NODE_ERRORS), CasExpr::int(max_errors)),
            CasExpr::call("return", vec![empty_list()]),
            None,
        ));
        statements
    }

    /// The answer-test call; a placeholder when it cannot be built, the
    /// reason having been recorded.
    fn test_call(&mut self, path: &Locator, node: &PrtNode) -> CasExpr {
        let sans = self.expression(&node.sans, &path.field("sans"));
        let tans = self.optional_expression(&node.tans, &path.field("tans"));
        let options = self.optional_expression(&node.options, &path.field("options"));
        let placeholder = CasExpr::list(Vec::new());

        let registry = self.ctx.registry;
        let test = match registry.get(&node.test) {
            Ok(test) => test,
            Err(error) => {
                for e in error.to_question_errors(path) {
                    self.errors.push_error(e);
                }
                return placeholder;
            }
        };
        let Some(sans) = sans else {
            return placeholder;
        };
        let call = TestCall {
            sans: &sans,
            tans: tans.as_ref(),
            options: options.as_ref(),
            inputs: self.ctx.inputs,
        };
        match test.cascall(&call) {
            Ok(expr) => expr,
            Err(error) => {
                for e in error.to_question_errors(path) {
                    // A teacher answer that failed to parse is already reported.
                    if e.code == ErrorCode::MISSING_TEACHER_ANSWER && !node.tans.trim().is_empty() {
                        continue;
                    }
                    self.errors.push_error(e);
                }
                placeholder
            }
        }
    }

    /// `(%_b: errcatch(...), if %_b = [] then ...)`, or `None` when the
    /// branch does nothing.
    fn branch(&mut self, node_path: &Locator, node: &PrtNode, outcome: bool) -> Option<CasExpr> {
        let path = node_path.branch(outcome);
        let branch = node.branch(outcome);
        let mut statements = Vec::new();

        if self.prt.scoremode != ScoreMode::NoScore {
            if let Some(score) = self.score(branch.score.as_deref(), branch.score_mode, SCORE, &path.field("score")) {
                statements.push(score);
            }
            if let Some(penalty) =
                self.score(branch.penalty.as_deref(), branch.penalty_mode, PENALTY, &path.field("penalty"))
            {
                statements.push(penalty);
            }
        }

        statements.extend(self.exit(&path, node, branch));

        if !branch.feedback.is_empty() {
            match compile_castext(&branch.feedback, &self.ctx.castext()) {
                Ok(compiled) => statements.push(append_to(FEEDBACK, compiled.expr)),
                Err(errors) => self.errors.absorb(errors, &path.field("feedback")),
            }
        }

        if statements.is_empty() {
            return None;
        }
        statements.push(CasExpr::boolean(true));
        Some(CasExpr::group(vec![
            CasExpr::assign(BRANCH_RESULT, CasExpr::call("errcatch", statements)),
            CasExpr::if_then(
                is_empty(id(BRANCH_RESULT)),
                CasExpr::group(vec![
                    append_to(ERRORS, CasExpr::string(path.to_string())),
                    increment(NODE_ERRORS),
                ]),
                None,
            ),
        ]))
    }

    fn score(&mut self, source: Option<&str>, mode: ScoreOp, accumulator: &str, path: &Locator) -> Option<CasExpr> {
        let value = self.optional_expression(source?, path)?;
        let value = match mode {
            ScoreOp::Set => value,
            ScoreOp::Add => CasExpr::binary(BinOp::Add, id(accumulator), value),
            ScoreOp::Subtract => CasExpr::binary(BinOp::Sub, id(accumulator), value),
        };
        Some(CasExpr::assign(accumulator, value))
    }

    /// Scene signal and transition code.
    fn exit(&mut self, path: &Locator, node: &PrtNode, branch: &Branch) -> Vec<CasExpr> {
        let target = match &branch.exit {
            Exit::Scene { target } => {
                if !self.ctx.scene_names.iter().any(|s| s == target) {
                    let error = PrtError::UnknownSceneTarget {
                        node: node.name.clone(),
                        target: target.clone(),
                    };
                    self.errors.push_error(error.to_question_error(&path.field("exit")));
                }
                target.as_str()
            }
            Exit::StateTransition => self.ctx.scene,
            Exit::End | Exit::Node { .. } => {
                if !branch.variables.trim().is_empty() {
                    warn!(prt = %self.prt.name, node = %node.name, "ignoring transition code on a plain exit");
                    self.errors.push_warning(
                        QuestionError::warning(
                            ErrorCode::TRANSITION_ON_PLAIN_EXIT,
                            "transition variables only run on scene and state transitions",
                        )
                        .at(&path.field("variables")),
                    );
                }
                return Vec::new();
            }
        };
        let mut statements = vec![
            CasExpr::assign(NEXT_SCENE, CasExpr::string(target)),
            CasExpr::assign(STOP, CasExpr::boolean(true)),
        ];
        let (code, written) = self.fragment(&branch.variables, &path.field("variables"));
        self.transition_writes.extend(written);
        statements.extend(code);
        statements
    }

    fn finish(&mut self) -> Vec<CasExpr> {
        let mut statements = Vec::new();

        let updates: Vec<CasExpr> = self
            .ctx
            .state_variables
            .iter()
            .filter(|sv| self.transition_writes.contains(&sv.name))
            .map(|sv| CasExpr::list(vec![CasExpr::int(i64::from(sv.storage)), id(&sv.name)]))
            .collect();
        if !updates.is_empty() {
            statements.push(CasExpr::if_then(
                CasExpr::binary(BinOp::NotEq, id(NEXT_SCENE), CasExpr::boolean(false)),
                CasExpr::assign(UPDATES, CasExpr::list(updates)),
                None,
            ));
        }

        if self.prt.scoremode != ScoreMode::NoScore {
            let scale = self.ctx.options.score_scale();
            statements.push(clamp_and_round(SCORE, scale));
            statements.push(clamp_and_round(PENALTY, scale));
        }

        statements.push(CasExpr::list(vec![
            id(SCORE),
            id(PENALTY),
            id(PATH),
            id(RESULTS),
            CasExpr::call(
                "append",
                vec![CasExpr::list(vec![CasExpr::string("%root")]), id(FEEDBACK)],
            ),
            id(NEXT_SCENE),
            id(UPDATES),
            id(ERRORS),
        ]));
        statements
    }
}

/// `not %_stop`, plus membership of any entry token for non-root nodes.
fn guard(is_root: bool, entries: &[String]) -> CasExpr {
    let running = CasExpr::not(id(STOP));
    if is_root {
        return running;
    }
    let reached = CasExpr::fold(
        BinOp::Or,
        entries
            .iter()
            .map(|token| CasExpr::call("member", vec![CasExpr::string(token.as_str()), id(PATH)]))
            .collect(),
    )
    .unwrap_or_else(|| CasExpr::boolean(false));
    CasExpr::binary(BinOp::And, running, reached)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_guard_only_checks_stop() {
        assert_eq!(guard(true, &[]).to_string(), "not %_stop");
    }

    #[test]
    fn test_join_guard_lists_every_entry() {
        let entries = vec!["a-T".to_string(), "b-F".to_string()];
        assert_eq!(
            guard(false, &entries).to_string(),
            "not %_stop and (member(\"a-T\", %_path) or member(\"b-F\", %_path))"
        );
    }

    #[test]
    fn test_score_rounding_expression() {
        assert_eq!(
            clamp_and_round(SCORE, 1000).to_string(),
            "%_score:round(max(0, min(1, %_score))*1000)/1000"
        );
    }
}
