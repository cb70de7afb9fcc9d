//! Runtime values.

use std::fmt;

use stateq_types::CasValue;

/// A value produced by evaluation.
///
/// Identifiers without a binding evaluate to [`Value::Symbol`], the way a
/// CAS treats free variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    List(Vec<Value>),
    /// Kept sorted by printed form and free of duplicates.
    Set(Vec<Value>),
    Symbol(String),
}

impl Value {
    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    pub fn empty_list() -> Self {
        Value::List(Vec::new())
    }

    pub fn set(mut items: Vec<Value>) -> Self {
        items.sort_by_key(|v| v.to_string());
        items.dedup_by(|a, b| a.loosely_equals(b));
        Value::Set(items)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Symbol(_) => "symbol",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Structural equality, with integers and floats compared by value.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            _ => self == other,
        }
    }

    /// Text used when the value is concatenated into a string.
    pub fn display_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_cas_value(&self) -> CasValue {
        match self {
            Value::Int(n) => CasValue::Int(*n),
            Value::Float(x) => CasValue::Float(*x),
            Value::Str(s) => CasValue::Str(s.clone()),
            Value::Bool(b) => CasValue::Bool(*b),
            Value::List(items) => CasValue::List(items.iter().map(Value::to_cas_value).collect()),
            Value::Set(items) => CasValue::Set(items.iter().map(Value::to_cas_value).collect()),
            Value::Symbol(name) => CasValue::Other(name.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Symbol(name) => f.write_str(name),
            Value::List(items) | Value::Set(items) => {
                let (open, close) = if matches!(self, Value::List(_)) {
                    ("[", "]")
                } else {
                    ("{", "}")
                };
                f.write_str(open)?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(close)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_sorted_and_deduplicated() {
        let set = Value::set(vec![Value::Int(3), Value::Int(1), Value::Float(3.0)]);
        assert_eq!(set, Value::Set(vec![Value::Int(1), Value::Int(3)]));
    }

    #[test]
    fn test_display_text_leaves_strings_bare() {
        assert_eq!(Value::str("a b").display_text(), "a b");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::str("x")]).display_text(),
            "[1, \"x\"]"
        );
    }

    #[test]
    fn test_loose_numeric_equality() {
        assert!(Value::Int(2).loosely_equals(&Value::Float(2.0)));
        assert!(!Value::Int(2).loosely_equals(&Value::str("2")));
    }
}
