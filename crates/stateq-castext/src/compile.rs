//! Block compilation: one CAS expression per template.

use stateq_types::{
    analyze_expr, BlockNode, CasExpr, CasKind, CasText, CompileErrors, CompileOptions,
    InjectMode, LoopSource, SourceText,
};
use tracing::{debug, trace};

use crate::block::{lower, Block, Injection};
use crate::error::CasTextError;
use crate::mathmode;
use crate::rewrite::rewrite_at_depth;

/// Global flags a template may set but must never localize.
const GLOBAL_FLAGS: &[&str] = &["simp"];

/// Turns the text of an inline `castext("...")` call into a block tree.
///
/// Tokenizing templates is not this crate's job; whoever owns the
/// tokenizer plugs it in here.
pub trait TemplateParser {
    fn parse_template(&self, source: &str) -> Result<BlockNode, String>;
}

/// Everything a template compilation may consult.
#[derive(Clone, Copy)]
pub struct CasTextContext<'a> {
    pub options: &'a CompileOptions,
    /// Input names visible to `reveal` blocks.
    pub inputs: &'a [String],
    pub template_parser: Option<&'a dyn TemplateParser>,
}

impl<'a> CasTextContext<'a> {
    pub fn new(options: &'a CompileOptions) -> Self {
        Self {
            options,
            inputs: &[],
            template_parser: None,
        }
    }

    pub fn with_inputs(mut self, inputs: &'a [String]) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_template_parser(mut self, parser: &'a dyn TemplateParser) -> Self {
        self.template_parser = Some(parser);
        self
    }
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCasText {
    /// Evaluates to a string when `flat`, otherwise to a `["%root", ...]`
    /// list for [`postprocess`](crate::postprocess).
    pub expr: CasExpr,
    pub flat: bool,
}

impl CompiledCasText {
    pub fn code(&self) -> String {
        self.expr.to_string()
    }
}

/// Compile a template to a single CAS expression.
pub fn compile_castext(text: &CasText, ctx: &CasTextContext<'_>) -> Result<CompiledCasText, CompileErrors> {
    compile_at_depth(text, ctx, 0)
}

pub(crate) fn compile_at_depth(
    text: &CasText,
    ctx: &CasTextContext<'_>,
    depth: usize,
) -> Result<CompiledCasText, CompileErrors> {
    let source = SourceText::new(text.source.as_str());
    let mut root = text.root.clone();
    mathmode::annotate(&mut root, &text.source, &ctx.options.math_environments);

    let block = lower(&root, ctx.inputs).map_err(|errors| collect(&errors, &source))?;
    let flat = block.is_flat();

    let mut compiler = BlockCompiler::default();
    let expr = compiler.block(&block);
    let expr = rewrite_at_depth(expr, ctx, depth).map_err(|errors| collect(&errors, &source))?;
    let expr = localize_writes(expr);

    debug!(flat, depth, foreach_blocks = compiler.foreach_count, "compiled castext");
    Ok(CompiledCasText { expr, flat })
}

fn collect(errors: &[CasTextError], source: &SourceText) -> CompileErrors {
    let mut out = CompileErrors::empty();
    for error in errors {
        out.push_error(error.to_question_error(source));
    }
    out
}

/// Declare every variable the template assigns as local to it.
fn localize_writes(expr: CasExpr) -> CasExpr {
    let usage = analyze_expr(&expr);
    let leaked: Vec<CasExpr> = usage
        .write
        .iter()
        .filter(|name| !GLOBAL_FLAGS.contains(&name.as_str()))
        .map(|name| CasExpr::assign(name.as_str(), CasExpr::ident(name.as_str())))
        .collect();
    if leaked.is_empty() {
        expr
    } else {
        trace!(count = leaked.len(), "localizing template writes");
        CasExpr::block(leaked, vec![expr])
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// BlockCompiler
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct BlockCompiler {
    /// Numbers foreach blocks so their helper variables never collide.
    foreach_count: usize,
}

impl BlockCompiler {
    fn block(&mut self, block: &Block) -> CasExpr {
        match block {
            Block::Container(children) => self.container(children, block.is_flat()),
            Block::Text(text) => CasExpr::string(text.as_str()),
            Block::Inject(injection) => self.injection(injection),
            Block::Define(pairs) => {
                if pairs.is_empty() {
                    return CasExpr::string("");
                }
                let mut items: Vec<CasExpr> = pairs
                    .iter()
                    .map(|(name, value)| CasExpr::assign(name.as_str(), value.clone()))
                    .collect();
                items.push(CasExpr::string(""));
                CasExpr::group(items)
            }
            Block::If {
                branches,
                otherwise,
            } => {
                if branches.is_empty() {
                    return otherwise
                        .as_deref()
                        .map_or_else(|| CasExpr::string(""), |b| self.block(b));
                }
                let branches = branches
                    .iter()
                    .map(|(condition, body)| (condition.clone(), self.block(body)))
                    .collect();
                let otherwise = otherwise
                    .as_deref()
                    .map_or_else(|| CasExpr::string(""), |b| self.block(b));
                CasExpr::synthetic(CasKind::If {
                    branches,
                    otherwise: Some(Box::new(otherwise)),
                })
            }
            Block::Foreach { iterators, body } => self.foreach(iterators, body),
            Block::Indexing { style, start, body } => CasExpr::list(vec![
                CasExpr::string("indexing"),
                CasExpr::string(style.to_string()),
                start.clone(),
                self.block(body),
            ]),
            Block::Index => CasExpr::list(vec![CasExpr::string("index")]),
            Block::Reveal { input, value, body } => CasExpr::list(vec![
                CasExpr::string("reveal"),
                CasExpr::string(input.as_str()),
                value.clone(),
                self.block(body),
            ]),
            Block::Lang { codes, body } => CasExpr::list(vec![
                CasExpr::string("lang"),
                CasExpr::string(codes.join(",")),
                self.block(body),
            ]),
        }
    }

    /// Children in order; a container that defines variables keeps them
    /// to itself.
    fn container(&mut self, children: &[Block], flat: bool) -> CasExpr {
        let parts: Vec<CasExpr> = children.iter().map(|c| self.block(c)).collect();
        let body = if flat {
            CasExpr::call("sconcat", parts)
        } else {
            let mut items = Vec::with_capacity(parts.len() + 1);
            items.push(CasExpr::string("%root"));
            items.extend(parts);
            CasExpr::list(items)
        };

        let mut defined: Vec<&str> = Vec::new();
        for child in children {
            if let Block::Define(pairs) = child {
                for (name, _) in pairs {
                    if !defined.contains(&name.as_str()) {
                        defined.push(name);
                    }
                }
            }
        }
        if defined.is_empty() {
            body
        } else {
            let locals = defined
                .into_iter()
                .map(|name| CasExpr::assign(name, CasExpr::ident(name)))
                .collect();
            CasExpr::block(locals, vec![body])
        }
    }

    fn injection(&mut self, injection: &Injection) -> CasExpr {
        let display = |expr: CasExpr| match injection.mode {
            InjectMode::Latex => {
                let style = if injection.math_mode { "" } else { "i" };
                CasExpr::call("stack_disp", vec![expr, CasExpr::string(style)])
            }
            InjectMode::Value => CasExpr::call("string", vec![expr]),
        };
        let shown = match &injection.key {
            Some(key) => CasExpr::group(vec![injection.expr.clone(), display(CasExpr::ident(key.as_str()))]),
            None => display(injection.expr.clone()),
        };
        match injection.simp {
            None => shown,
            Some(flag) => CasExpr::block(
                vec![
                    CasExpr::assign("%_s", CasExpr::ident("simp")),
                    CasExpr::ident("%_r"),
                ],
                vec![
                    CasExpr::assign("simp", CasExpr::boolean(flag)),
                    CasExpr::assign("%_r", shown),
                    CasExpr::assign("simp", CasExpr::ident("%_s")),
                    CasExpr::ident("%_r"),
                ],
            ),
        }
    }

    /// Lockstep iteration over one or more sequences.
    fn foreach(&mut self, iterators: &[(String, CasExpr)], body: &Block) -> CasExpr {
        self.foreach_count += 1;
        let n = self.foreach_count;
        let list = |i: usize| format!("%_fe{n}_l{i}");
        let index = format!("%_fe{n}_i");
        let out = format!("%_fe{n}_o");

        let mut locals: Vec<CasExpr> = iterators
            .iter()
            .enumerate()
            .map(|(i, (_, source))| CasExpr::assign(list(i + 1), source.clone()))
            .collect();
        locals.push(CasExpr::assign(out.as_str(), CasExpr::list(Vec::new())));
        locals.push(CasExpr::ident(index.as_str()));
        locals.extend(iterators.iter().map(|(name, _)| CasExpr::ident(name.as_str())));

        let mut statements: Vec<CasExpr> = (1..=iterators.len())
            .map(|i| {
                let l = CasExpr::ident(list(i));
                CasExpr::assign(
                    list(i),
                    CasExpr::if_then(
                        CasExpr::call("setp", vec![l.clone()]),
                        CasExpr::call("listify", vec![l.clone()]),
                        Some(l),
                    ),
                )
            })
            .collect();

        let count = CasExpr::call(
            "min",
            (1..=iterators.len())
                .map(|i| CasExpr::call("length", vec![CasExpr::ident(list(i))]))
                .collect(),
        );
        let mut step: Vec<CasExpr> = iterators
            .iter()
            .enumerate()
            .map(|(i, (name, _))| {
                CasExpr::assign(
                    name.as_str(),
                    CasExpr::index(CasExpr::ident(list(i + 1)), vec![CasExpr::ident(index.as_str())]),
                )
            })
            .collect();
        step.push(CasExpr::assign(
            out.as_str(),
            CasExpr::call("endcons", vec![self.block(body), CasExpr::ident(out.as_str())]),
        ));
        statements.push(CasExpr::synthetic(CasKind::For {
            var: index.clone(),
            source: LoopSource::Range {
                from: Box::new(CasExpr::int(1)),
                step: None,
                thru: Box::new(count),
            },
            body: Box::new(CasExpr::group(step)),
        }));

        statements.push(if body.is_flat() {
            CasExpr::call("simplode", vec![CasExpr::ident(out.as_str())])
        } else {
            CasExpr::call(
                "append",
                vec![
                    CasExpr::list(vec![CasExpr::string("%root")]),
                    CasExpr::ident(out.as_str()),
                ],
            )
        });
        CasExpr::block(locals, statements)
    }
}
