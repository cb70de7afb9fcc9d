//! Rewrite pass over compiled CAS code.
//!
//! The expression is loaded into an arena of nodes with parent links and
//! rewritten bottom-up from a worklist until nothing changes:
//!
//! - `sconcat` absorbs nested `sconcat` calls and merges adjacent string
//!   literals, dropping empty ones;
//! - `sconcat` of a single string-valued argument becomes that argument;
//! - `["%root", ...]` lists get the same treatment after their tag;
//! - `castext("literal")` calls are replaced by the compiled template.
//!
//! Converting back splits `sconcat` calls that exceed the argument limit
//! into a left fold.

use stateq_types::{
    BinOp, CasExpr, CasKind, CasText, CompileErrors, LoopSource, PostfixOp, PrefixOp, QuestionError,
};
use tracing::{debug, trace};

use crate::compile::{compile_at_depth, CasTextContext};
use crate::error::CasTextError;

const ROOT_TAG: &str = "%root";

/// Calls whose result is always a string.
const STRING_FUNCTIONS: &[&str] = &["sconcat", "simplode", "stack_disp", "string"];

/// Run the rewrite pass on arbitrary CAS code.
pub fn rewrite(expr: CasExpr, ctx: &CasTextContext<'_>) -> Result<CasExpr, CompileErrors> {
    rewrite_at_depth(expr, ctx, 0).map_err(|errors| {
        let mut out = CompileErrors::empty();
        for error in &errors {
            out.push_error(QuestionError::new(error.code(), error.to_string()));
        }
        out
    })
}

pub(crate) fn rewrite_at_depth(
    expr: CasExpr,
    ctx: &CasTextContext<'_>,
    depth: usize,
) -> Result<CasExpr, Vec<CasTextError>> {
    let mut arena = Arena::default();
    let root = arena.insert(&expr, None);
    let mut pass = Pass {
        arena,
        ctx,
        depth,
        errors: Vec::new(),
    };
    let steps = pass.run();
    debug!(nodes = pass.arena.nodes.len(), steps, "rewrite pass finished");
    if !pass.errors.is_empty() {
        return Err(pass.errors);
    }
    let limit = ctx.options.concat_arg_limit.max(2);
    Ok(pass.arena.extract(root, limit))
}

// ══════════════════════════════════════════════════════════════════════════════
// Arena
// ══════════════════════════════════════════════════════════════════════════════

type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
enum Head {
    Number(String),
    Str(String),
    Bool(bool),
    Ident(String),
    Call(String),
    /// Children: target, indices...
    Index,
    List,
    Set,
    Group,
    Prefix(PrefixOp),
    Postfix(PostfixOp),
    Binary(BinOp),
    /// Children: condition, body pairs, then the else branch if present.
    If { has_else: bool },
    /// Children: list, body.
    ForIn(String),
    /// Children: from, step if present, thru, body.
    ForRange { var: String, has_step: bool },
}

#[derive(Debug)]
struct Node {
    head: Head,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    /// Ids are handed out in preorder: a child always has a larger id
    /// than its parent.
    fn insert(&mut self, expr: &CasExpr, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            head: Head::Group,
            children: Vec::new(),
            parent,
        });
        let (head, children): (Head, Vec<&CasExpr>) = match &expr.kind {
            CasKind::Number(n) => (Head::Number(n.clone()), Vec::new()),
            CasKind::Str(s) => (Head::Str(s.clone()), Vec::new()),
            CasKind::Bool(b) => (Head::Bool(*b), Vec::new()),
            CasKind::Ident(name) => (Head::Ident(name.clone()), Vec::new()),
            CasKind::Call { name, args } => (Head::Call(name.clone()), args.iter().collect()),
            CasKind::Index { target, indices } => (
                Head::Index,
                std::iter::once(target.as_ref()).chain(indices.iter()).collect(),
            ),
            CasKind::List(items) => (Head::List, items.iter().collect()),
            CasKind::Set(items) => (Head::Set, items.iter().collect()),
            CasKind::Group(items) => (Head::Group, items.iter().collect()),
            CasKind::Prefix { op, operand } => (Head::Prefix(*op), vec![operand.as_ref()]),
            CasKind::Postfix { op, operand } => (Head::Postfix(*op), vec![operand.as_ref()]),
            CasKind::Binary { op, left, right } => {
                (Head::Binary(*op), vec![left.as_ref(), right.as_ref()])
            }
            CasKind::If {
                branches,
                otherwise,
            } => {
                let mut children = Vec::with_capacity(branches.len() * 2 + 1);
                for (cond, body) in branches {
                    children.push(cond);
                    children.push(body);
                }
                if let Some(otherwise) = otherwise {
                    children.push(otherwise.as_ref());
                }
                (
                    Head::If {
                        has_else: otherwise.is_some(),
                    },
                    children,
                )
            }
            CasKind::For { var, source, body } => match source {
                LoopSource::In(list) => (Head::ForIn(var.clone()), vec![list.as_ref(), body.as_ref()]),
                LoopSource::Range { from, step, thru } => {
                    let mut children = vec![from.as_ref()];
                    if let Some(step) = step {
                        children.push(step.as_ref());
                    }
                    children.push(thru.as_ref());
                    children.push(body.as_ref());
                    (
                        Head::ForRange {
                            var: var.clone(),
                            has_step: step.is_some(),
                        },
                        children,
                    )
                }
            },
        };
        let ids = children.into_iter().map(|c| self.insert(c, Some(id))).collect();
        self.nodes[id].head = head;
        self.nodes[id].children = ids;
        id
    }

    fn str_value(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].head {
            Head::Str(s) => Some(s),
            _ => None,
        }
    }

    fn is_call(&self, id: NodeId, name: &str) -> bool {
        matches!(&self.nodes[id].head, Head::Call(n) if n == name)
    }

    /// Does the node always evaluate to a string?
    fn yields_string(&self, id: NodeId) -> bool {
        match &self.nodes[id].head {
            Head::Str(_) => true,
            Head::Call(name) => STRING_FUNCTIONS.contains(&name.as_str()),
            _ => false,
        }
    }

    fn is_root_list(&self, id: NodeId) -> bool {
        self.nodes[id].head == Head::List
            && self.nodes[id]
                .children
                .first()
                .is_some_and(|&first| self.str_value(first) == Some(ROOT_TAG))
    }

    /// Give `id` new contents, keeping its slot and parent.
    fn set(&mut self, id: NodeId, head: Head, children: Vec<NodeId>) {
        for &child in &children {
            self.nodes[child].parent = Some(id);
        }
        self.nodes[id].head = head;
        self.nodes[id].children = children;
    }

    /// Replace `id` with a freshly inserted expression.
    fn graft(&mut self, id: NodeId, expr: &CasExpr) {
        let parent = self.nodes[id].parent;
        let fresh = self.insert(expr, parent);
        let head = self.nodes[fresh].head.clone();
        let children = std::mem::take(&mut self.nodes[fresh].children);
        self.set(id, head, children);
    }

    /// Merge a run of string children: drop empties, join neighbours and
    /// splice nested runs picked out by `nested`. Returns the new list
    /// and whether anything changed.
    fn merge_strings(
        &mut self,
        children: &[NodeId],
        nested: impl Fn(&Arena, NodeId) -> Option<usize>,
    ) -> (Vec<NodeId>, bool) {
        let mut out: Vec<NodeId> = Vec::with_capacity(children.len());
        let mut changed = false;
        let mut pending: Vec<NodeId> = children.iter().rev().copied().collect();
        while let Some(child) = pending.pop() {
            if let Some(skip) = nested(self, child) {
                pending.extend(self.nodes[child].children[skip..].iter().rev().copied());
                changed = true;
                continue;
            }
            match self.str_value(child) {
                Some("") => changed = true,
                Some(text) => {
                    let text = text.to_string();
                    match out.last().copied() {
                        Some(last) if self.str_value(last).is_some() => {
                            if let Head::Str(prev) = &mut self.nodes[last].head {
                                prev.push_str(&text);
                            }
                            changed = true;
                        }
                        _ => out.push(child),
                    }
                }
                None => out.push(child),
            }
        }
        (out, changed)
    }

    fn extract(&self, id: NodeId, limit: usize) -> CasExpr {
        let node = &self.nodes[id];
        let child = |i: usize| self.extract(node.children[i], limit);
        let all = || -> Vec<CasExpr> { node.children.iter().map(|&c| self.extract(c, limit)).collect() };
        let kind = match &node.head {
            Head::Number(n) => CasKind::Number(n.clone()),
            Head::Str(s) => CasKind::Str(s.clone()),
            Head::Bool(b) => CasKind::Bool(*b),
            Head::Ident(name) => CasKind::Ident(name.clone()),
            Head::Call(name) if name == "sconcat" && node.children.len() > limit => {
                return fold_sconcat(all(), limit);
            }
            Head::Call(name) => CasKind::Call {
                name: name.clone(),
                args: all(),
            },
            Head::Index => {
                let mut items = all();
                let target = items.remove(0);
                CasKind::Index {
                    target: Box::new(target),
                    indices: items,
                }
            }
            Head::List => CasKind::List(all()),
            Head::Set => CasKind::Set(all()),
            Head::Group => CasKind::Group(all()),
            Head::Prefix(op) => CasKind::Prefix {
                op: *op,
                operand: Box::new(child(0)),
            },
            Head::Postfix(op) => CasKind::Postfix {
                op: *op,
                operand: Box::new(child(0)),
            },
            Head::Binary(op) => CasKind::Binary {
                op: *op,
                left: Box::new(child(0)),
                right: Box::new(child(1)),
            },
            Head::If { has_else } => {
                let mut items = all();
                let otherwise = if *has_else { items.pop().map(Box::new) } else { None };
                let mut branches = Vec::with_capacity(items.len() / 2);
                let mut iter = items.into_iter();
                while let (Some(cond), Some(body)) = (iter.next(), iter.next()) {
                    branches.push((cond, body));
                }
                CasKind::If {
                    branches,
                    otherwise,
                }
            }
            Head::ForIn(var) => CasKind::For {
                var: var.clone(),
                source: LoopSource::In(Box::new(child(0))),
                body: Box::new(child(1)),
            },
            Head::ForRange { var, has_step } => {
                let mut items = all();
                let body = items.pop().map(Box::new);
                let thru = items.pop().map(Box::new);
                let from = items.first().cloned().map(Box::new);
                let step = if *has_step { items.get(1).cloned().map(Box::new) } else { None };
                match (from, thru, body) {
                    (Some(from), Some(thru), Some(body)) => CasKind::For {
                        var: var.clone(),
                        source: LoopSource::Range { from, step, thru },
                        body,
                    },
                    _ => CasKind::Group(Vec::new()),
                }
            }
        };
        CasExpr::synthetic(kind)
    }
}

/// `sconcat(a1..aN)` with at most `limit` arguments per call:
/// `sconcat(sconcat(sconcat(a1..aL), ...), ...)`.
fn fold_sconcat(args: Vec<CasExpr>, limit: usize) -> CasExpr {
    let mut iter = args.into_iter();
    let first: Vec<CasExpr> = iter.by_ref().take(limit).collect();
    let mut acc = CasExpr::call("sconcat", first);
    loop {
        let chunk: Vec<CasExpr> = iter.by_ref().take(limit - 1).collect();
        if chunk.is_empty() {
            return acc;
        }
        let mut args = Vec::with_capacity(chunk.len() + 1);
        args.push(acc);
        args.extend(chunk);
        acc = CasExpr::call("sconcat", args);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Pass
// ══════════════════════════════════════════════════════════════════════════════

struct Pass<'a, 'c> {
    arena: Arena,
    ctx: &'a CasTextContext<'c>,
    depth: usize,
    errors: Vec<CasTextError>,
}

impl Pass<'_, '_> {
    fn run(&mut self) -> usize {
        let mut queued = vec![true; self.arena.nodes.len()];
        let mut worklist: Vec<NodeId> = (0..self.arena.nodes.len()).collect();
        let mut steps = 0;
        while let Some(id) = worklist.pop() {
            queued[id] = false;
            steps += 1;
            if !self.apply(id) {
                continue;
            }
            trace!(node = id, "rewrote node");
            queued.resize(self.arena.nodes.len(), false);
            let mut requeue = vec![id];
            if let Some(parent) = self.arena.nodes[id].parent {
                requeue.insert(0, parent);
            }
            for next in requeue {
                if !queued[next] {
                    queued[next] = true;
                    worklist.push(next);
                }
            }
        }
        steps
    }

    /// Apply the first matching rule at `id`.
    fn apply(&mut self, id: NodeId) -> bool {
        match self.arena.nodes[id].head.clone() {
            Head::Call(name) if name == "sconcat" => self.sconcat(id),
            Head::Call(name) if name == "castext" => self.inline_castext(id),
            Head::List if self.arena.is_root_list(id) => self.root_list(id),
            _ => false,
        }
    }

    fn sconcat(&mut self, id: NodeId) -> bool {
        let children = self.arena.nodes[id].children.clone();
        let (merged, changed) = self.arena.merge_strings(&children, |arena, child| {
            arena.is_call(child, "sconcat").then_some(0)
        });
        match merged.as_slice() {
            [] => {
                self.arena.set(id, Head::Str(String::new()), Vec::new());
                true
            }
            [only] if self.arena.yields_string(*only) => {
                let head = self.arena.nodes[*only].head.clone();
                let children = std::mem::take(&mut self.arena.nodes[*only].children);
                self.arena.set(id, head, children);
                true
            }
            _ => {
                if changed {
                    self.arena.set(id, Head::Call("sconcat".to_string()), merged);
                }
                changed
            }
        }
    }

    fn root_list(&mut self, id: NodeId) -> bool {
        let children = self.arena.nodes[id].children.clone();
        let (tag, rest) = match children.split_first() {
            Some((tag, rest)) => (*tag, rest),
            None => return false,
        };
        let (merged, changed) = self.arena.merge_strings(rest, |arena, child| {
            arena.is_root_list(child).then_some(1)
        });
        if changed {
            let mut items = Vec::with_capacity(merged.len() + 1);
            items.push(tag);
            items.extend(merged);
            self.arena.set(id, Head::List, items);
        }
        changed
    }

    fn inline_castext(&mut self, id: NodeId) -> bool {
        let source = match self.arena.nodes[id].children.as_slice() {
            [only] => match self.arena.str_value(*only) {
                Some(text) => text.to_string(),
                None => return false,
            },
            _ => return false,
        };
        let Some(parser) = self.ctx.template_parser else {
            self.errors.push(CasTextError::TemplateParserUnavailable);
            return false;
        };
        let limit = self.ctx.options.max_inline_depth;
        if self.depth + 1 > limit {
            self.errors.push(CasTextError::InlineDepth(limit));
            return false;
        }
        let root = match parser.parse_template(&source) {
            Ok(root) => root,
            Err(message) => {
                self.errors.push(CasTextError::InlineTemplate(message));
                return false;
            }
        };
        let text = CasText::new(source, root);
        match compile_at_depth(&text, self.ctx, self.depth + 1) {
            Ok(compiled) => {
                trace!(depth = self.depth + 1, "inlined castext literal");
                self.arena.graft(id, &compiled.expr);
                true
            }
            Err(errors) => {
                let message = errors
                    .errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "compilation failed".to_string());
                self.errors.push(CasTextError::InlineTemplate(message));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stateq_types::CompileOptions;

    fn run(expr: CasExpr) -> String {
        let options = CompileOptions::default();
        let ctx = CasTextContext::new(&options);
        rewrite_at_depth(expr, &ctx, 0).unwrap().to_string()
    }

    fn s(text: &str) -> CasExpr {
        CasExpr::string(text)
    }

    #[test]
    fn test_nested_sconcat_flattens_and_merges() {
        let inner = CasExpr::call("sconcat", vec![s("b"), s(""), s("c")]);
        let expr = CasExpr::call("sconcat", vec![s("a"), inner, CasExpr::ident("x"), s("d")]);
        assert_eq!(run(expr), "sconcat(\"abc\", x, \"d\")");
    }

    #[test]
    fn test_root_lists_splice() {
        let inner = CasExpr::list(vec![s("%root"), s("b"), CasExpr::list(vec![s("index")])]);
        let expr = CasExpr::list(vec![s("%root"), s("a"), inner, s(""), s("c")]);
        assert_eq!(run(expr), "[\"%root\", \"ab\", [\"index\"], \"c\"]");
    }

    #[test]
    fn test_rewrites_reach_into_control_flow() {
        let body = CasExpr::call("sconcat", vec![s("x"), s("y")]);
        let expr = CasExpr::if_then(CasExpr::ident("c"), body, Some(s("")));
        assert_eq!(run(expr), "if c then \"xy\" else \"\"");
    }

    #[test]
    fn test_fold_respects_limit() {
        let args: Vec<CasExpr> = (0..7).map(|i| CasExpr::ident(format!("v{i}"))).collect();
        let folded = fold_sconcat(args, 3);
        assert_eq!(
            folded.to_string(),
            "sconcat(sconcat(sconcat(v0, v1, v2), v3, v4), v5, v6)"
        );
    }
}
