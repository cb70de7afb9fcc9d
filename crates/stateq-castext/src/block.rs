//! Lowered CASText blocks.
//!
//! [`lower`] validates the tokenizer's [`BlockNode`] tree and parses every
//! embedded expression exactly once. Compile, flatness and postprocess all
//! work on the closed [`Block`] sum type that comes out.

use stateq_lexer::is_identifier;
use stateq_parser::{parse_expression, parse_fragment};
use stateq_types::{
    BinOp, Binding, BlockKind, BlockNode, CasExpr, CasKind, IfBranch, InjectMode, Position,
};

use crate::error::CasTextError;
use crate::indexing::IndexStyle;

/// Named blocks the compiler knows about.
pub const NAMED_BLOCKS: &[&str] = &["indexing", "index", "reveal", "lang"];

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Ordered children; the template root and every block body.
    Container(Vec<Block>),
    /// Literal output: raw text and escapes.
    Text(String),
    Inject(Injection),
    Define(Vec<(String, CasExpr)>),
    If {
        branches: Vec<(CasExpr, Block)>,
        otherwise: Option<Box<Block>>,
    },
    Foreach {
        iterators: Vec<(String, CasExpr)>,
        body: Box<Block>,
    },
    Indexing {
        style: IndexStyle,
        start: CasExpr,
        body: Box<Block>,
    },
    Index,
    Reveal {
        input: String,
        value: CasExpr,
        body: Box<Block>,
    },
    Lang {
        codes: Vec<String>,
        body: Box<Block>,
    },
}

/// A `{@...@}` or `{#...#}` injection.
#[derive(Debug, Clone, PartialEq)]
pub struct Injection {
    pub mode: InjectMode,
    pub expr: CasExpr,
    /// `{@k: v@}` displays `k` after assigning it.
    pub key: Option<String>,
    /// Value of a `simp` evaluation flag.
    pub simp: Option<bool>,
    pub math_mode: bool,
}

impl Block {
    /// A block is flat when it evaluates straight to a string and needs
    /// no postprocessing.
    pub fn is_flat(&self) -> bool {
        match self {
            Block::Container(children) => children.iter().all(Block::is_flat),
            Block::Text(_) | Block::Inject(_) | Block::Define(_) => true,
            Block::If {
                branches,
                otherwise,
            } => {
                branches.iter().all(|(_, body)| body.is_flat())
                    && otherwise.as_ref().is_none_or(|b| b.is_flat())
            }
            Block::Foreach { body, .. } => body.is_flat(),
            Block::Indexing { .. } | Block::Index | Block::Reveal { .. } | Block::Lang { .. } => {
                false
            }
        }
    }

    /// Direct child blocks.
    pub fn children(&self) -> Vec<&Block> {
        match self {
            Block::Container(children) => children.iter().collect(),
            Block::If {
                branches,
                otherwise,
            } => branches
                .iter()
                .map(|(_, b)| b)
                .chain(otherwise.as_deref())
                .collect(),
            Block::Foreach { body, .. }
            | Block::Indexing { body, .. }
            | Block::Reveal { body, .. }
            | Block::Lang { body, .. } => vec![body.as_ref()],
            _ => Vec::new(),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Lowering
// ══════════════════════════════════════════════════════════════════════════════

/// Lower a block tree, collecting every problem rather than stopping at the
/// first.
pub fn lower(root: &BlockNode, inputs: &[String]) -> Result<Block, Vec<CasTextError>> {
    let mut lowerer = Lowerer {
        inputs,
        indexing_depth: 0,
        errors: Vec::new(),
    };
    let block = lowerer.node(root);
    if lowerer.errors.is_empty() {
        Ok(block)
    } else {
        Err(lowerer.errors)
    }
}

struct Lowerer<'a> {
    inputs: &'a [String],
    indexing_depth: usize,
    errors: Vec<CasTextError>,
}

impl Lowerer<'_> {
    fn nodes(&mut self, nodes: &[BlockNode]) -> Block {
        let children = nodes
            .iter()
            .map(|n| self.node(n))
            .filter(|b| !matches!(b, Block::Text(t) if t.is_empty()))
            .collect();
        Block::Container(children)
    }

    fn node(&mut self, node: &BlockNode) -> Block {
        let position = node.position;
        match &node.kind {
            BlockKind::Root { children } => self.nodes(children),
            BlockKind::Raw { text } => Block::Text(text.clone()),
            BlockKind::Escape { value } => Block::Text(value.clone()),
            BlockKind::Comment { .. } => Block::Text(String::new()),
            BlockKind::Inject { mode, expression } => {
                self.injection(*mode, expression, node.math_mode, position)
            }
            BlockKind::Define { bindings } => {
                let pairs = self.bindings("define", bindings, position);
                Block::Define(pairs)
            }
            BlockKind::If { branches } => self.if_block(branches, position),
            BlockKind::Foreach {
                iterators,
                children,
            } => {
                if iterators.is_empty() {
                    self.errors.push(CasTextError::MissingParam {
                        block: "foreach".into(),
                        param: "iterator".into(),
                        position,
                    });
                }
                let iterators = self.bindings("foreach", iterators, position);
                let body = self.nodes(children);
                Block::Foreach {
                    iterators,
                    body: Box::new(body),
                }
            }
            BlockKind::Named {
                name,
                params,
                children,
            } => self.named(name, params, children, position),
        }
    }

    fn injection(&mut self, mode: InjectMode, source: &str, math_mode: bool, position: Position) -> Block {
        let parsed = parse_fragment(source);
        if let Some(error) = parsed.errors.errors.first() {
            self.errors.push(CasTextError::Expression {
                code: error.code,
                message: error.message.clone(),
                source_text: source.to_string(),
                position,
            });
            return Block::Text(String::new());
        }
        let mut statements = parsed.value.map(|f| f.statements).unwrap_or_default();
        if statements.len() != 1 {
            self.errors.push(CasTextError::StatementCount {
                count: statements.len(),
                position,
            });
            return Block::Text(String::new());
        }
        let statement = statements.remove(0);

        let mut simp = None;
        for flag in &statement.flags {
            let value = match &flag.value {
                None => Some(true),
                Some(v) => match v.kind {
                    CasKind::Bool(b) => Some(b),
                    _ => None,
                },
            };
            match (flag.name.as_str(), value) {
                ("simp", Some(v)) => simp = Some(v),
                _ => self.errors.push(CasTextError::InvalidEvalFlag {
                    flag: flag.name.clone(),
                    position,
                }),
            }
        }

        let key = match &statement.expr.kind {
            CasKind::Binary {
                op: BinOp::Assign,
                left,
                ..
            } => left.as_ident().map(str::to_string),
            _ => None,
        };

        Block::Inject(Injection {
            mode,
            expr: statement.expr,
            key,
            simp,
            math_mode,
        })
    }

    fn expression(&mut self, source: &str, position: Position) -> Option<CasExpr> {
        let parsed = parse_expression(source);
        match parsed.into_result() {
            Ok(expr) => Some(expr),
            Err(errors) => {
                if let Some(error) = errors.errors.first() {
                    self.errors.push(CasTextError::Expression {
                        code: error.code,
                        message: error.message.clone(),
                        source_text: source.to_string(),
                        position,
                    });
                }
                None
            }
        }
    }

    /// `name="expr"` pairs whose names must be plain identifiers.
    fn bindings(&mut self, block: &str, bindings: &[Binding], position: Position) -> Vec<(String, CasExpr)> {
        let mut out = Vec::new();
        for binding in bindings {
            if !is_identifier(&binding.name) {
                self.errors.push(CasTextError::InvalidParam {
                    block: block.to_string(),
                    message: format!("'{}' is not a variable name", binding.name),
                    position,
                });
                continue;
            }
            if let Some(expr) = self.expression(&binding.value, position) {
                out.push((binding.name.clone(), expr));
            }
        }
        out
    }

    fn if_block(&mut self, branches: &[IfBranch], position: Position) -> Block {
        let mut lowered = Vec::new();
        let mut otherwise = None;
        for (i, branch) in branches.iter().enumerate() {
            match &branch.condition {
                Some(condition) => {
                    if otherwise.is_some() {
                        self.errors.push(CasTextError::MisplacedElse {
                            position: branch.position,
                        });
                    }
                    let condition = self.expression(condition, branch.position);
                    let body = self.nodes(&branch.children);
                    if let Some(condition) = condition {
                        lowered.push((condition, body));
                    }
                }
                None => {
                    if i == 0 || otherwise.is_some() {
                        self.errors.push(CasTextError::MisplacedElse {
                            position: branch.position,
                        });
                    }
                    otherwise = Some(Box::new(self.nodes(&branch.children)));
                }
            }
        }
        if branches.is_empty() {
            self.errors.push(CasTextError::MissingParam {
                block: "if".into(),
                param: "test".into(),
                position,
            });
        }
        Block::If {
            branches: lowered,
            otherwise,
        }
    }

    fn named(&mut self, name: &str, params: &[Binding], children: &[BlockNode], position: Position) -> Block {
        let allowed: &[&str] = match name {
            "indexing" => &["style", "start"],
            "index" => &[],
            "reveal" => &["input", "value"],
            "lang" => &["code"],
            _ => {
                self.errors.push(CasTextError::UnknownBlock {
                    name: name.to_string(),
                    position,
                });
                return Block::Text(String::new());
            }
        };
        for param in params {
            if !allowed.contains(&param.name.as_str()) {
                self.errors.push(CasTextError::InvalidParam {
                    block: name.to_string(),
                    message: format!("unknown parameter '{}'", param.name),
                    position,
                });
            }
        }
        let param = |key: &str| params.iter().find(|p| p.name == key).map(|p| p.value.as_str());

        match name {
            "indexing" => {
                let pattern = param("style").unwrap_or("1");
                let style = IndexStyle::parse(pattern).unwrap_or_else(|| {
                    self.errors.push(CasTextError::InvalidIndexStyle {
                        style: pattern.to_string(),
                        position,
                    });
                    IndexStyle::Plain
                });
                let start = param("start")
                    .and_then(|s| self.expression(s, position))
                    .unwrap_or_else(|| CasExpr::int(1));
                self.indexing_depth += 1;
                let body = self.nodes(children);
                self.indexing_depth -= 1;
                Block::Indexing {
                    style,
                    start,
                    body: Box::new(body),
                }
            }
            "index" => {
                if self.indexing_depth == 0 {
                    self.errors
                        .push(CasTextError::IndexOutsideIndexing { position });
                }
                Block::Index
            }
            "reveal" => {
                let input = match param("input") {
                    Some(input) => {
                        if !self.inputs.iter().any(|i| i == input) {
                            self.errors.push(CasTextError::UnknownRevealInput {
                                input: input.to_string(),
                                position,
                            });
                        }
                        input.to_string()
                    }
                    None => {
                        self.missing(name, "input", position);
                        String::new()
                    }
                };
                let value = match param("value") {
                    Some(v) => self.expression(v, position),
                    None => {
                        self.missing(name, "value", position);
                        None
                    }
                };
                let body = self.nodes(children);
                Block::Reveal {
                    input,
                    value: value.unwrap_or_else(|| CasExpr::boolean(false)),
                    body: Box::new(body),
                }
            }
            _ => {
                let codes: Vec<String> = match param("code") {
                    Some(codes) => codes
                        .split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect(),
                    None => {
                        self.missing(name, "code", position);
                        Vec::new()
                    }
                };
                let body = self.nodes(children);
                Block::Lang {
                    codes,
                    body: Box::new(body),
                }
            }
        }
    }

    fn missing(&mut self, block: &str, param: &str, position: Position) {
        self.errors.push(CasTextError::MissingParam {
            block: block.to_string(),
            param: param.to_string(),
            position,
        });
    }
}
