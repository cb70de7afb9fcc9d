//! Shared helpers: a small template tokenizer and evaluation shortcuts.
//!
//! The tokenizer understands `{@e@}`, `{#e#}`, `[[name k="v"]]...[[/name]]`,
//! self-closing `[[name k="v"/]]`, `[[if]]` with `[[elif]]`/`[[else]]`,
//! `[[comment]]` and `[[escape]]`. Attribute values may use `"` or `'`.

#![allow(dead_code)]

use stateq_castext::{
    compile_castext, postprocess, CasTextContext, CompiledCasText, NoProcessor,
    PostprocessContext, TemplateParser,
};
use stateq_eval::{Evaluator, Value};
use stateq_types::{
    Binding, BlockKind, BlockNode, CasText, CompileErrors, CompileOptions, IfBranch, InjectMode,
    Position,
};

// ══════════════════════════════════════════════════════════════════════════════
// Tokenizer
// ══════════════════════════════════════════════════════════════════════════════

pub fn tokenize(source: &str) -> Result<BlockNode, String> {
    let mut tok = Tokenizer { src: source, pos: 0 };
    let (children, term) = tok.nodes()?;
    match term {
        Term::Eof => Ok(BlockNode::new(
            BlockKind::Root { children },
            Position::new(0, source.len()),
        )),
        Term::Close { name, .. } => Err(format!("unexpected [[/{name}]]")),
        Term::Branch(header) => Err(format!("[[{}]] outside if", header.name)),
    }
}

pub struct MiniTemplates;

impl TemplateParser for MiniTemplates {
    fn parse_template(&self, source: &str) -> Result<BlockNode, String> {
        tokenize(source)
    }
}

struct Header {
    name: String,
    attrs: Vec<Binding>,
    self_closing: bool,
    start: usize,
    end: usize,
}

impl Header {
    fn attr(&self, name: &str) -> Option<String> {
        self.attrs.iter().find(|b| b.name == name).map(|b| b.value.clone())
    }
}

enum Term {
    Eof,
    Close { name: String, start: usize, end: usize },
    Branch(Header),
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn find(&self, needle: &str) -> Result<usize, String> {
        self.rest()
            .find(needle)
            .map(|i| self.pos + i)
            .ok_or_else(|| format!("missing '{needle}'"))
    }

    fn nodes(&mut self) -> Result<(Vec<BlockNode>, Term), String> {
        let mut nodes = Vec::new();
        let mut text_start = self.pos;
        loop {
            let rest = self.rest();
            let at_block = rest.starts_with("{@") || rest.starts_with("{#") || rest.starts_with("[[");
            if rest.is_empty() || at_block {
                if self.pos > text_start {
                    nodes.push(BlockNode::new(
                        BlockKind::Raw {
                            text: self.src[text_start..self.pos].to_string(),
                        },
                        Position::new(text_start, self.pos),
                    ));
                }
            }
            if rest.is_empty() {
                return Ok((nodes, Term::Eof));
            }
            if !at_block {
                self.pos += rest.chars().next().map_or(1, char::len_utf8);
                continue;
            }

            let start = self.pos;
            if rest.starts_with("{@") || rest.starts_with("{#") {
                let (mode, close) = if rest.starts_with("{@") {
                    (InjectMode::Latex, "@}")
                } else {
                    (InjectMode::Value, "#}")
                };
                self.pos += 2;
                let end = self.find(close)?;
                let expression = self.src[start + 2..end].to_string();
                self.pos = end + 2;
                nodes.push(BlockNode::new(
                    BlockKind::Inject { mode, expression },
                    Position::new(start, self.pos),
                ));
            } else if rest.starts_with("[[/") {
                let end = self.find("]]")?;
                let name = self.src[start + 3..end].trim().to_string();
                self.pos = end + 2;
                return Ok((
                    nodes,
                    Term::Close {
                        name,
                        start,
                        end: self.pos,
                    },
                ));
            } else {
                let header = self.header()?;
                match header.name.as_str() {
                    "elif" | "else" => return Ok((nodes, Term::Branch(header))),
                    _ => nodes.push(self.block(header)?),
                }
            }
            text_start = self.pos;
        }
    }

    fn header(&mut self) -> Result<Header, String> {
        let start = self.pos;
        self.pos += 2;
        let name_len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(self.rest().len());
        let name = self.rest()[..name_len].to_string();
        self.pos += name_len;
        let mut attrs = Vec::new();
        loop {
            let trimmed = self.rest().trim_start();
            self.pos = self.src.len() - trimmed.len();
            if let Some(after) = trimmed.strip_prefix("/]]") {
                self.pos = self.src.len() - after.len();
                return Ok(Header { name, attrs, self_closing: true, start, end: self.pos });
            }
            if let Some(after) = trimmed.strip_prefix("]]") {
                self.pos = self.src.len() - after.len();
                return Ok(Header { name, attrs, self_closing: false, start, end: self.pos });
            }
            let eq = self.find("=")?;
            let key = self.src[self.pos..eq].trim().to_string();
            let quote = self.src[eq + 1..]
                .chars()
                .next()
                .filter(|c| *c == '"' || *c == '\'')
                .ok_or_else(|| format!("attribute '{key}' is not quoted"))?;
            self.pos = eq + 2;
            let close = self.find(&quote.to_string())?;
            attrs.push(Binding::new(key, &self.src[eq + 2..close]));
            self.pos = close + 1;
        }
    }

    fn body(&mut self, name: &str) -> Result<(Vec<BlockNode>, usize), String> {
        match self.nodes()? {
            (children, Term::Close { name: n, end, .. }) if n == name => Ok((children, end)),
            _ => Err(format!("unclosed [[{name}]]")),
        }
    }

    fn raw_until(&mut self, close: &str) -> Result<String, String> {
        let end = self.find(close)?;
        let text = self.src[self.pos..end].to_string();
        self.pos = end + close.len();
        Ok(text)
    }

    fn block(&mut self, header: Header) -> Result<BlockNode, String> {
        let start = header.start;
        let kind = match header.name.as_str() {
            "if" => return self.if_block(header),
            "define" => BlockKind::Define {
                bindings: header.attrs,
            },
            "comment" => BlockKind::Comment {
                text: self.raw_until("[[/comment]]")?,
            },
            "escape" if header.self_closing => BlockKind::Escape {
                value: header.attr("value").unwrap_or_default(),
            },
            "escape" => BlockKind::Escape {
                value: self.raw_until("[[/escape]]")?,
            },
            "foreach" => {
                let (children, _) = self.body("foreach")?;
                BlockKind::Foreach {
                    iterators: header.attrs,
                    children,
                }
            }
            _ if header.self_closing => BlockKind::Named {
                name: header.name,
                params: header.attrs,
                children: Vec::new(),
            },
            _ => {
                let (children, _) = self.body(&header.name)?;
                BlockKind::Named {
                    name: header.name,
                    params: header.attrs,
                    children,
                }
            }
        };
        Ok(BlockNode::new(kind, Position::new(start, self.pos)))
    }

    fn if_block(&mut self, header: Header) -> Result<BlockNode, String> {
        let mut branches = Vec::new();
        let mut condition = header.attr("test");
        let mut branch_start = header.start;
        loop {
            let (children, term) = self.nodes()?;
            match term {
                Term::Close { name, start, end } if name == "if" => {
                    branches.push(IfBranch {
                        condition,
                        children,
                        position: Position::new(branch_start, start),
                    });
                    return Ok(BlockNode::new(
                        BlockKind::If { branches },
                        Position::new(header.start, end),
                    ));
                }
                Term::Branch(next) => {
                    branches.push(IfBranch {
                        condition,
                        children,
                        position: Position::new(branch_start, next.start),
                    });
                    condition = if next.name == "else" { None } else { next.attr("test") };
                    branch_start = next.start;
                }
                _ => return Err("unclosed [[if]]".into()),
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Shortcuts
// ══════════════════════════════════════════════════════════════════════════════

pub fn template(source: &str) -> CasText {
    let root = tokenize(source).unwrap_or_else(|e| panic!("bad test template {source:?}: {e}"));
    CasText::new(source, root)
}

pub fn try_compile_with(source: &str, options: &CompileOptions, inputs: &[String]) -> Result<CompiledCasText, CompileErrors> {
    let ctx = CasTextContext::new(options)
        .with_inputs(inputs)
        .with_template_parser(&MiniTemplates);
    compile_castext(&template(source), &ctx)
}

pub fn try_compile(source: &str) -> Result<CompiledCasText, CompileErrors> {
    try_compile_with(source, &CompileOptions::default(), &[])
}

pub fn compile(source: &str) -> CompiledCasText {
    try_compile(source).unwrap_or_else(|e| panic!("compile of {source:?} failed: {e:?}"))
}

/// Evaluate the printed code, so printing and reparsing are exercised too.
pub fn evaluate_with(compiled: &CompiledCasText, ev: &mut Evaluator) -> Value {
    let code = compiled.code();
    ev.run(&code)
        .unwrap_or_else(|e| panic!("evaluating {code} failed: {e}"))
}

pub fn render_with(source: &str, ev: &mut Evaluator) -> String {
    let compiled = compile(source);
    let value = evaluate_with(&compiled, ev).to_cas_value();
    let mut ctx = PostprocessContext::new();
    postprocess(&value, &NoProcessor, &mut ctx)
        .unwrap_or_else(|e| panic!("postprocess of {source:?} failed: {e}"))
}

pub fn render(source: &str) -> String {
    render_with(source, &mut Evaluator::new())
}
