//! Canonical printer for the CAS AST.
//!
//! Output reparses to the same tree. Parentheses are inserted only where
//! precedence requires them, and the printer never reorders anything, so
//! identical trees always print identical text.

use std::fmt::{self, Write};

use crate::cas::*;

impl fmt::Display for CasExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, 0)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, &self.expr, 0)?;
        for flag in &self.flags {
            write!(f, ", {}", flag.name)?;
            if let Some(value) = &flag.value {
                f.write_char('=')?;
                write_expr(f, value, prec::RELATIONAL + 1)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, statement) in self.statements.iter().enumerate() {
            if i > 0 {
                f.write_str(";\n")?;
            }
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

/// Binding power of the node's outermost construct.
fn precedence(expr: &CasExpr) -> u8 {
    match &expr.kind {
        CasKind::Binary { op, .. } => op.precedence(),
        CasKind::Prefix { op, .. } => op.precedence(),
        CasKind::Postfix { .. } => prec::POSTFIX,
        CasKind::If { .. } | CasKind::For { .. } => prec::CONTROL,
        _ => prec::ATOM,
    }
}

fn is_negation(expr: &CasExpr) -> bool {
    matches!(
        expr.kind,
        CasKind::Prefix {
            op: PrefixOp::Neg,
            ..
        }
    )
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &CasExpr, min_prec: u8) -> fmt::Result {
    let own = precedence(expr);
    if own < min_prec {
        f.write_char('(')?;
        write_bare(f, expr)?;
        f.write_char(')')
    } else {
        write_bare(f, expr)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[CasExpr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_expr(f, item, 0)?;
    }
    Ok(())
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for ch in s.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            _ => f.write_char(ch)?,
        }
    }
    f.write_char('"')
}

fn write_bare(f: &mut fmt::Formatter<'_>, expr: &CasExpr) -> fmt::Result {
    match &expr.kind {
        CasKind::Number(text) => f.write_str(text),
        CasKind::Str(s) => write_string_literal(f, s),
        CasKind::Bool(true) => f.write_str("true"),
        CasKind::Bool(false) => f.write_str("false"),
        CasKind::Ident(name) => f.write_str(name),
        CasKind::Call { name, args } => {
            write!(f, "{name}(")?;
            write_list(f, args)?;
            f.write_char(')')
        }
        CasKind::Index { target, indices } => {
            write_expr(f, target, prec::POSTFIX)?;
            f.write_char('[')?;
            write_list(f, indices)?;
            f.write_char(']')
        }
        CasKind::List(items) => {
            f.write_char('[')?;
            write_list(f, items)?;
            f.write_char(']')
        }
        CasKind::Set(items) => {
            f.write_char('{')?;
            write_list(f, items)?;
            f.write_char('}')
        }
        CasKind::Group(items) => {
            f.write_char('(')?;
            write_list(f, items)?;
            f.write_char(')')
        }
        CasKind::Prefix { op, operand } => {
            match op {
                PrefixOp::Neg => f.write_char('-')?,
                PrefixOp::Not => f.write_str("not ")?,
                PrefixOp::Quote => f.write_char('\'')?,
            }
            if *op == PrefixOp::Neg && is_negation(operand) {
                f.write_char('(')?;
                write_bare(f, operand)?;
                return f.write_char(')');
            }
            write_expr(f, operand, op.precedence())
        }
        CasKind::Postfix { op, operand } => {
            write_expr(f, operand, prec::POSTFIX)?;
            match op {
                PostfixOp::Factorial => f.write_char('!'),
            }
        }
        CasKind::Binary { op, left, right } => {
            let p = op.precedence();
            let (left_min, right_min) = if op.is_relational() {
                (p + 1, p + 1)
            } else if op.is_right_assoc() {
                (p + 1, p)
            } else {
                (p, p + 1)
            };
            write_expr(f, left, left_min)?;
            f.write_str(op.symbol())?;
            if is_negation(right) {
                f.write_char('(')?;
                write_bare(f, right)?;
                f.write_char(')')
            } else {
                write_expr(f, right, right_min)
            }
        }
        CasKind::If {
            branches,
            otherwise,
        } => {
            for (i, (cond, body)) in branches.iter().enumerate() {
                f.write_str(if i == 0 { "if " } else { " elseif " })?;
                write_expr(f, cond, prec::CONTROL + 1)?;
                f.write_str(" then ")?;
                write_expr(f, body, prec::CONTROL + 1)?;
            }
            if let Some(otherwise) = otherwise {
                f.write_str(" else ")?;
                write_expr(f, otherwise, 0)?;
            }
            Ok(())
        }
        CasKind::For { var, source, body } => {
            write!(f, "for {var}")?;
            match source {
                LoopSource::In(list) => {
                    f.write_str(" in ")?;
                    write_expr(f, list, prec::CONTROL + 1)?;
                }
                LoopSource::Range { from, step, thru } => {
                    f.write_char(':')?;
                    write_expr(f, from, prec::CONTROL + 1)?;
                    if let Some(step) = step {
                        f.write_str(" step ")?;
                        write_expr(f, step, prec::CONTROL + 1)?;
                    }
                    f.write_str(" thru ")?;
                    write_expr(f, thru, prec::CONTROL + 1)?;
                }
            }
            f.write_str(" do ")?;
            write_expr(f, body, 0)
        }
    }
}
