//! Variable-usage analysis over parsed CAS code.
//!
//! Reports which identifiers a piece of code reads, writes, and calls.
//! Names bound locally (by `block`, `lambda`, function parameters, or loop
//! variables) are not reported. Results compose by set union, which is how
//! the builders reason about code fragments concatenated across scopes.

use std::collections::BTreeSet;

use crate::cas::*;

/// Identifiers read, written, and invoked by some code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub read: BTreeSet<String>,
    pub write: BTreeSet<String>,
    pub calls: BTreeSet<String>,
}

impl Usage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of two usage sets.
    pub fn compose(mut self, other: &Usage) -> Usage {
        self.merge(other);
        self
    }

    /// In-place union.
    pub fn merge(&mut self, other: &Usage) {
        self.read.extend(other.read.iter().cloned());
        self.write.extend(other.write.iter().cloned());
        self.calls.extend(other.calls.iter().cloned());
    }

    /// Names that are read or written.
    pub fn references(&self) -> BTreeSet<String> {
        self.read.union(&self.write).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty() && self.calls.is_empty()
    }
}

/// Analyze every statement of a fragment.
pub fn analyze_fragment(fragment: &Fragment) -> Usage {
    let mut walker = Walker::default();
    for statement in &fragment.statements {
        walker.statement(statement);
    }
    walker.usage
}

/// Analyze a single expression.
pub fn analyze_expr(expr: &CasExpr) -> Usage {
    let mut walker = Walker::default();
    walker.expr(expr);
    walker.usage
}

// ══════════════════════════════════════════════════════════════════════════════
// Walker
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Walker {
    usage: Usage,
    /// Stack of locally bound name sets.
    locals: Vec<BTreeSet<String>>,
}

impl Walker {
    fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|scope| scope.contains(name))
    }

    fn read(&mut self, name: &str) {
        if !self.is_local(name) {
            self.usage.read.insert(name.to_string());
        }
    }

    fn write(&mut self, name: &str) {
        if !self.is_local(name) {
            self.usage.write.insert(name.to_string());
        }
    }

    fn statement(&mut self, statement: &Statement) {
        self.expr(&statement.expr);
        for flag in &statement.flags {
            if let Some(value) = &flag.value {
                self.expr(value);
            }
        }
    }

    fn expr(&mut self, expr: &CasExpr) {
        match &expr.kind {
            CasKind::Number(_) | CasKind::Str(_) | CasKind::Bool(_) => {}
            CasKind::Ident(name) => self.read(name),
            CasKind::Call { name, args } => self.call(name, args),
            CasKind::Index { target, indices } => {
                self.expr(target);
                indices.iter().for_each(|i| self.expr(i));
            }
            CasKind::List(items) | CasKind::Set(items) | CasKind::Group(items) => {
                items.iter().for_each(|i| self.expr(i));
            }
            CasKind::Prefix {
                op: PrefixOp::Quote,
                ..
            } => {}
            CasKind::Prefix { operand, .. } | CasKind::Postfix { operand, .. } => {
                self.expr(operand)
            }
            CasKind::Binary {
                op: BinOp::Assign,
                left,
                right,
            } => {
                self.expr(right);
                self.assign_target(left);
            }
            CasKind::Binary {
                op: BinOp::Define,
                left,
                right,
            } => self.function_definition(left, right),
            CasKind::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            CasKind::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    self.expr(cond);
                    self.expr(body);
                }
                if let Some(otherwise) = otherwise {
                    self.expr(otherwise);
                }
            }
            CasKind::For { var, source, body } => {
                match source {
                    LoopSource::In(list) => self.expr(list),
                    LoopSource::Range { from, step, thru } => {
                        self.expr(from);
                        if let Some(step) = step {
                            self.expr(step);
                        }
                        self.expr(thru);
                    }
                }
                self.locals.push(BTreeSet::from([var.clone()]));
                self.expr(body);
                self.locals.pop();
            }
        }
    }

    fn assign_target(&mut self, target: &CasExpr) {
        match &target.kind {
            CasKind::Ident(name) => self.write(name),
            CasKind::Index { target, indices } => {
                indices.iter().for_each(|i| self.expr(i));
                match target.as_ident() {
                    Some(name) => self.write(name),
                    None => self.expr(target),
                }
            }
            // Destructuring `[a, b]: [1, 2]`.
            CasKind::List(items) => items.iter().for_each(|i| self.assign_target(i)),
            _ => self.expr(target),
        }
    }

    /// `f(x, y) := body` defines `f`; the parameters are local to the body.
    fn function_definition(&mut self, head: &CasExpr, body: &CasExpr) {
        match &head.kind {
            CasKind::Call { name, args } => {
                self.write(name);
                let params = args.iter().filter_map(param_name).collect();
                self.locals.push(params);
                self.expr(body);
                self.locals.pop();
            }
            _ => {
                self.assign_target(head);
                self.expr(body);
            }
        }
    }

    fn call(&mut self, name: &str, args: &[CasExpr]) {
        match name {
            "block" | "lambda" if !args.is_empty() => {
                let mut bound = BTreeSet::new();
                let rest = match args[0].kind {
                    CasKind::List(ref decls) => {
                        for decl in decls {
                            match &decl.kind {
                                CasKind::Binary {
                                    op: BinOp::Assign,
                                    left,
                                    right,
                                } => {
                                    // The initial value is evaluated outside.
                                    self.expr(right);
                                    if let Some(n) = left.as_ident() {
                                        bound.insert(n.to_string());
                                    }
                                }
                                _ => {
                                    if let Some(n) = param_name(decl) {
                                        bound.insert(n);
                                    }
                                }
                            }
                        }
                        &args[1..]
                    }
                    _ => args,
                };
                if name == "lambda" {
                    self.usage.calls.insert("lambda".to_string());
                }
                self.locals.push(bound);
                rest.iter().for_each(|a| self.expr(a));
                self.locals.pop();
            }
            _ => {
                if !self.is_local(name) {
                    self.usage.calls.insert(name.to_string());
                }
                args.iter().for_each(|a| self.expr(a));
            }
        }
    }
}

/// Name of a formal parameter: `x` or the list form `[x]` for varargs.
fn param_name(param: &CasExpr) -> Option<String> {
    match &param.kind {
        CasKind::Ident(name) => Some(name.clone()),
        CasKind::List(items) if items.len() == 1 => items[0].as_ident().map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> CasExpr {
        CasExpr::ident(name)
    }

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn assignment_reads_value_and_writes_target() {
        let e = CasExpr::assign("b", CasExpr::binary(BinOp::Add, id("a"), CasExpr::int(1)));
        let usage = analyze_expr(&e);
        assert_eq!(names(&usage.read), vec!["a"]);
        assert_eq!(names(&usage.write), vec!["b"]);
        assert!(usage.calls.is_empty());
    }

    #[test]
    fn block_locals_are_hidden() {
        let e = CasExpr::block(
            vec![id("t"), CasExpr::assign("k", id("outer"))],
            vec![
                CasExpr::assign("t", id("k")),
                CasExpr::assign("g", id("t")),
            ],
        );
        let usage = analyze_expr(&e);
        assert_eq!(names(&usage.read), vec!["outer"]);
        assert_eq!(names(&usage.write), vec!["g"]);
        assert!(usage.calls.is_empty());
    }

    #[test]
    fn function_definition_writes_name_and_binds_params() {
        let head = CasExpr::call("f", vec![id("x")]);
        let body = CasExpr::binary(BinOp::Mul, id("x"), id("k"));
        let e = CasExpr::binary(BinOp::Define, head, body);
        let usage = analyze_expr(&e);
        assert_eq!(names(&usage.write), vec!["f"]);
        assert_eq!(names(&usage.read), vec!["k"]);
    }

    #[test]
    fn calls_are_tracked_separately() {
        let e = CasExpr::call("rand", vec![id("n")]);
        let usage = analyze_expr(&e);
        assert_eq!(names(&usage.calls), vec!["rand"]);
        assert_eq!(names(&usage.read), vec!["n"]);
    }

    #[test]
    fn indexed_assignment_writes_base() {
        let target = CasExpr::index(id("l"), vec![id("i")]);
        let e = CasExpr::binary(BinOp::Assign, target, CasExpr::int(0));
        let usage = analyze_expr(&e);
        assert_eq!(names(&usage.write), vec!["l"]);
        assert_eq!(names(&usage.read), vec!["i"]);
    }

    #[test]
    fn loop_variable_is_local() {
        let e = CasExpr::synthetic(CasKind::For {
            var: "x".into(),
            source: LoopSource::In(Box::new(id("xs"))),
            body: Box::new(CasExpr::assign("s", CasExpr::binary(BinOp::Add, id("s"), id("x")))),
        });
        let usage = analyze_expr(&e);
        assert_eq!(names(&usage.read), vec!["s", "xs"]);
        assert_eq!(names(&usage.write), vec!["s"]);
    }

    #[test]
    fn compose_is_union() {
        let a = analyze_expr(&CasExpr::assign("a", id("x")));
        let b = analyze_expr(&CasExpr::assign("b", id("y")));
        let both = a.compose(&b);
        assert_eq!(names(&both.write), vec!["a", "b"]);
        assert_eq!(names(&both.read), vec!["x", "y"]);
        assert_eq!(
            both.references().into_iter().collect::<Vec<_>>(),
            vec!["a", "b", "x", "y"]
        );
    }

    #[test]
    fn quoted_names_are_not_reads() {
        let e = CasExpr::prefix(PrefixOp::Quote, id("x"));
        assert!(analyze_expr(&e).is_empty());
    }
}
