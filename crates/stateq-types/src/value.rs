//! Typed values read back from CAS output.

use std::fmt;

use serde::Serialize;

use crate::cas::{CasExpr, CasKind, PrefixOp};

/// A CAS result in the shapes the compilers care about. Anything else is
/// kept as printed text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CasValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<CasValue>),
    Set(Vec<CasValue>),
    Other(String),
}

impl CasValue {
    pub fn from_expr(expr: &CasExpr) -> CasValue {
        match &expr.kind {
            CasKind::Str(s) => CasValue::Str(s.clone()),
            CasKind::Bool(b) => CasValue::Bool(*b),
            CasKind::Number(text) => number_value(text, false).unwrap_or_else(|| CasValue::Other(text.clone())),
            CasKind::Prefix {
                op: PrefixOp::Neg,
                operand,
            } => match &operand.kind {
                CasKind::Number(text) => {
                    number_value(text, true).unwrap_or_else(|| CasValue::Other(expr.to_string()))
                }
                _ => CasValue::Other(expr.to_string()),
            },
            CasKind::List(items) => CasValue::List(items.iter().map(CasValue::from_expr).collect()),
            CasKind::Set(items) => CasValue::Set(items.iter().map(CasValue::from_expr).collect()),
            _ => CasValue::Other(expr.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CasValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[CasValue]> {
        match self {
            CasValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            CasValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CasValue::Int(n) => Some(*n as f64),
            CasValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CasValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The tag of a `["tag", ...]` marker list.
    pub fn marker_tag(&self) -> Option<&str> {
        self.as_list()?.first()?.as_str()
    }
}

fn number_value(text: &str, negative: bool) -> Option<CasValue> {
    let sign = if negative { "-" } else { "" };
    if let Ok(n) = format!("{sign}{text}").parse::<i64>() {
        return Some(CasValue::Int(n));
    }
    format!("{sign}{text}").parse::<f64>().ok().map(CasValue::Float)
}

impl fmt::Display for CasValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CasValue::Str(s) => f.write_str(s),
            CasValue::Int(n) => write!(f, "{n}"),
            CasValue::Float(x) => write!(f, "{x}"),
            CasValue::Bool(b) => write!(f, "{b}"),
            CasValue::List(items) | CasValue::Set(items) => {
                let (open, close) = if matches!(self, CasValue::List(_)) {
                    ('[', ']')
                } else {
                    ('{', '}')
                };
                write!(f, "{open}")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "{close}")
            }
            CasValue::Other(text) => f.write_str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_convert() {
        assert_eq!(CasValue::from_expr(&CasExpr::int(-4)), CasValue::Int(-4));
        assert_eq!(CasValue::from_expr(&CasExpr::float(0.5)), CasValue::Float(0.5));
        assert_eq!(CasValue::from_expr(&CasExpr::string("a")), CasValue::Str("a".into()));
    }

    #[test]
    fn marker_tag_reads_first_string() {
        let v = CasValue::from_expr(&CasExpr::list(vec![CasExpr::string("%root"), CasExpr::string("x")]));
        assert_eq!(v.marker_tag(), Some("%root"));
        assert_eq!(CasValue::Int(1).marker_tag(), None);
    }

    #[test]
    fn non_literal_falls_back_to_text() {
        let v = CasValue::from_expr(&CasExpr::call("sin", vec![CasExpr::ident("x")]));
        assert_eq!(v, CasValue::Other("sin(x)".into()));
    }
}
