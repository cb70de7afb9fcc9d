//! AST for the CAS expression dialect.
//!
//! The same tree serves parsed author fragments and generated code: the
//! compilers build [`CasExpr`] values through the constructors below and
//! print them with the [`Display`](std::fmt::Display) impl in `print.rs`.
//! Equality ignores spans so that parsed and synthesized trees compare
//! structurally.

use crate::Span;

// ══════════════════════════════════════════════════════════════════════════════
// Fragments & Statements
// ══════════════════════════════════════════════════════════════════════════════

/// A parsed piece of author code: zero or more statements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fragment {
    pub statements: Vec<Statement>,
}

impl Fragment {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The statement expressions in order, dropping evaluation flags.
    pub fn expressions(&self) -> impl Iterator<Item = &CasExpr> {
        self.statements.iter().map(|s| &s.expr)
    }
}

/// A top-level statement: `expr` optionally followed by `, flag[=value]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub expr: CasExpr,
    pub flags: Vec<EvalFlag>,
    pub span: Span,
}

impl Statement {
    pub fn new(expr: CasExpr) -> Self {
        let span = expr.span;
        Self {
            expr,
            flags: Vec::new(),
            span,
        }
    }

    /// Look up an evaluation flag by name.
    pub fn flag(&self, name: &str) -> Option<&EvalFlag> {
        self.flags.iter().find(|f| f.name == name)
    }
}

/// An evaluation flag: `simp` or `simp=false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalFlag {
    pub name: String,
    pub value: Option<CasExpr>,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// An expression node.
#[derive(Debug, Clone, Eq)]
pub struct CasExpr {
    pub kind: CasKind,
    pub span: Span,
}

impl PartialEq for CasExpr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasKind {
    /// Numeric literal, source text preserved (`3`, `0.05`, `1e-3`).
    Number(String),
    /// `"text"`
    Str(String),
    /// `true` / `false`
    Bool(bool),
    Ident(String),
    /// `f(a, b)`
    Call { name: String, args: Vec<CasExpr> },
    /// `a[i, j]`
    Index {
        target: Box<CasExpr>,
        indices: Vec<CasExpr>,
    },
    /// `[a, b]`
    List(Vec<CasExpr>),
    /// `{a, b}`
    Set(Vec<CasExpr>),
    /// `(a, b, c)`: evaluates in order, value of the last.
    Group(Vec<CasExpr>),
    Prefix {
        op: PrefixOp,
        operand: Box<CasExpr>,
    },
    Postfix {
        op: PostfixOp,
        operand: Box<CasExpr>,
    },
    Binary {
        op: BinOp,
        left: Box<CasExpr>,
        right: Box<CasExpr>,
    },
    /// `if c1 then a elseif c2 then b else d`
    If {
        branches: Vec<(CasExpr, CasExpr)>,
        otherwise: Option<Box<CasExpr>>,
    },
    /// `for v in L do body` / `for v: a step s thru b do body`
    For {
        var: String,
        source: LoopSource,
        body: Box<CasExpr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopSource {
    In(Box<CasExpr>),
    Range {
        from: Box<CasExpr>,
        step: Option<Box<CasExpr>>,
        thru: Box<CasExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefixOp {
    Neg,
    Not,
    /// `'x`: noun form, prevents evaluation.
    Quote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostfixOp {
    Factorial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// `:`
    Assign,
    /// `:=`
    Define,
    Or,
    And,
    /// `=`
    Eq,
    /// `#`
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Add,
    Sub,
    Mul,
    Div,
    /// `.` non-commutative product
    Dot,
    /// `^` (also written `**`)
    Pow,
}

/// Binding power of compound constructs, shared by the parser and printer.
pub mod prec {
    pub const CONTROL: u8 = 5;
    pub const ASSIGN: u8 = 10;
    pub const OR: u8 = 20;
    pub const AND: u8 = 30;
    pub const NOT: u8 = 35;
    pub const RELATIONAL: u8 = 40;
    pub const ADDITIVE: u8 = 50;
    pub const MULTIPLICATIVE: u8 = 60;
    pub const NEG: u8 = 65;
    pub const POWER: u8 = 70;
    pub const POSTFIX: u8 = 80;
    pub const QUOTE: u8 = 85;
    pub const ATOM: u8 = 100;
}

impl BinOp {
    pub fn precedence(self) -> u8 {
        match self {
            Self::Assign | Self::Define => prec::ASSIGN,
            Self::Or => prec::OR,
            Self::And => prec::AND,
            Self::Eq | Self::NotEq | Self::Less | Self::Greater | Self::LessEq | Self::GreaterEq => {
                prec::RELATIONAL
            }
            Self::Add | Self::Sub => prec::ADDITIVE,
            Self::Mul | Self::Div | Self::Dot => prec::MULTIPLICATIVE,
            Self::Pow => prec::POWER,
        }
    }

    pub fn is_right_assoc(self) -> bool {
        matches!(self, Self::Assign | Self::Define | Self::Pow)
    }

    pub fn is_relational(self) -> bool {
        self.precedence() == prec::RELATIONAL
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Assign => ":",
            Self::Define => " := ",
            Self::Or => " or ",
            Self::And => " and ",
            Self::Eq => "=",
            Self::NotEq => "#",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEq => "<=",
            Self::GreaterEq => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Dot => " . ",
            Self::Pow => "^",
        }
    }
}

impl PrefixOp {
    pub fn precedence(self) -> u8 {
        match self {
            Self::Neg => prec::NEG,
            Self::Not => prec::NOT,
            Self::Quote => prec::QUOTE,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Construction helpers
// ══════════════════════════════════════════════════════════════════════════════

impl CasExpr {
    pub fn new(kind: CasKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// A node with no source position.
    pub fn synthetic(kind: CasKind) -> Self {
        Self::new(kind, Span::synthetic())
    }

    pub fn int(value: i64) -> Self {
        let lit = Self::synthetic(CasKind::Number(value.unsigned_abs().to_string()));
        if value < 0 {
            Self::prefix(PrefixOp::Neg, lit)
        } else {
            lit
        }
    }

    pub fn float(value: f64) -> Self {
        let lit = Self::synthetic(CasKind::Number(format_number(value.abs())));
        if value < 0.0 {
            Self::prefix(PrefixOp::Neg, lit)
        } else {
            lit
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::synthetic(CasKind::Str(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::synthetic(CasKind::Bool(value))
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::synthetic(CasKind::Ident(name.into()))
    }

    pub fn call(name: impl Into<String>, args: Vec<CasExpr>) -> Self {
        Self::synthetic(CasKind::Call {
            name: name.into(),
            args,
        })
    }

    pub fn list(items: Vec<CasExpr>) -> Self {
        Self::synthetic(CasKind::List(items))
    }

    pub fn group(items: Vec<CasExpr>) -> Self {
        Self::synthetic(CasKind::Group(items))
    }

    pub fn index(target: CasExpr, indices: Vec<CasExpr>) -> Self {
        Self::synthetic(CasKind::Index {
            target: Box::new(target),
            indices,
        })
    }

    pub fn prefix(op: PrefixOp, operand: CasExpr) -> Self {
        Self::synthetic(CasKind::Prefix {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn not(operand: CasExpr) -> Self {
        Self::prefix(PrefixOp::Not, operand)
    }

    pub fn binary(op: BinOp, left: CasExpr, right: CasExpr) -> Self {
        Self::synthetic(CasKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// `target: value`
    pub fn assign(target: impl Into<String>, value: CasExpr) -> Self {
        Self::binary(BinOp::Assign, Self::ident(target), value)
    }

    /// `name() := body`
    pub fn define_function(name: impl Into<String>, body: CasExpr) -> Self {
        Self::binary(BinOp::Define, Self::call(name, Vec::new()), body)
    }

    /// `if cond then then_branch [else otherwise]`
    pub fn if_then(cond: CasExpr, then_branch: CasExpr, otherwise: Option<CasExpr>) -> Self {
        Self::synthetic(CasKind::If {
            branches: vec![(cond, then_branch)],
            otherwise: otherwise.map(Box::new),
        })
    }

    /// `block([locals], body...)`
    pub fn block(locals: Vec<CasExpr>, body: Vec<CasExpr>) -> Self {
        let mut args = Vec::with_capacity(body.len() + 1);
        args.push(Self::list(locals));
        args.extend(body);
        Self::call("block", args)
    }

    /// Fold `items` with a left-associative binary operator.
    pub fn fold(op: BinOp, items: Vec<CasExpr>) -> Option<CasExpr> {
        let mut iter = items.into_iter();
        let first = iter.next()?;
        Some(iter.fold(first, |acc, item| Self::binary(op, acc, item)))
    }

    // ── Inspection ────────────────────────────────────────────────────────

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            CasKind::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            CasKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Numeric value of a literal, including a negated literal.
    pub fn as_number(&self) -> Option<f64> {
        match &self.kind {
            CasKind::Number(text) => text.parse().ok(),
            CasKind::Prefix {
                op: PrefixOp::Neg,
                operand,
            } => operand.as_number().map(|n| -n),
            _ => None,
        }
    }

    /// If this is a call to `name`, its arguments.
    pub fn call_args(&self, name: &str) -> Option<&[CasExpr]> {
        match &self.kind {
            CasKind::Call { name: n, args } if n == name => Some(args),
            _ => None,
        }
    }

    /// `true` for literals that need no evaluation.
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            CasKind::Number(_) | CasKind::Str(_) | CasKind::Bool(_)
        )
    }
}

/// Canonical textual form of a non-negative number.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_spans() {
        let a = CasExpr::new(CasKind::Ident("x".into()), Span::new(1, 1, 1, 2));
        let b = CasExpr::ident("x");
        assert_eq!(a, b);
    }

    #[test]
    fn negative_numbers_become_prefix_nodes() {
        let e = CasExpr::int(-3);
        assert!(matches!(
            e.kind,
            CasKind::Prefix {
                op: PrefixOp::Neg,
                ..
            }
        ));
        assert_eq!(e.as_number(), Some(-3.0));
        assert_eq!(CasExpr::float(0.05).as_number(), Some(0.05));
    }

    #[test]
    fn format_number_drops_integral_fraction() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(0.125), "0.125");
        assert_eq!(format_number(1000.0), "1000");
    }

    #[test]
    fn fold_builds_left_associative_chain() {
        let e = CasExpr::fold(
            BinOp::Or,
            vec![CasExpr::ident("a"), CasExpr::ident("b"), CasExpr::ident("c")],
        )
        .unwrap();
        match e.kind {
            CasKind::Binary { op, left, .. } => {
                assert_eq!(op, BinOp::Or);
                assert!(matches!(left.kind, CasKind::Binary { op: BinOp::Or, .. }));
            }
            _ => panic!("expected binary"),
        }
        assert!(CasExpr::fold(BinOp::Or, Vec::new()).is_none());
    }
}
