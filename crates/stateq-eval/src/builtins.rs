//! Builtin functions and operators.

use stateq_types::BinOp;

use crate::error::{EvalError, EvalResult};
use crate::evaluator::arity;
use crate::value::Value;

/// Names [`call`] resolves.
pub const BUILTINS: &[&str] = &[
    "append", "cons", "emptyp", "endcons", "error", "first", "float", "is", "last", "length",
    "listify", "max", "member", "min", "rest", "round", "sconcat", "setp", "simplode",
    "stack_disp", "string", "stringp", "listp",
];

pub(crate) fn call(name: &str, args: Vec<Value>) -> EvalResult<Value> {
    match name {
        "sconcat" => Ok(Value::Str(args.iter().map(Value::display_text).collect())),
        "simplode" => match args.as_slice() {
            [Value::List(items)] => Ok(Value::Str(items.iter().map(Value::display_text).collect())),
            [Value::List(items), Value::Str(sep)] => Ok(Value::Str(
                items
                    .iter()
                    .map(Value::display_text)
                    .collect::<Vec<_>>()
                    .join(sep),
            )),
            _ => Err(mismatch(name, &args)),
        },
        "string" => {
            let [value] = one(name, &args)?;
            Ok(Value::Str(value.display_text()))
        }
        "stack_disp" => match args.as_slice() {
            [value, Value::Str(mode)] => {
                let text = value.display_text();
                Ok(Value::Str(match mode.as_str() {
                    "i" => format!("\\({text}\\)"),
                    "d" => format!("\\[{text}\\]"),
                    _ => text,
                }))
            }
            _ => Err(mismatch(name, &args)),
        },
        "error" => Err(EvalError::Raised(
            args.iter().map(Value::display_text).collect::<Vec<_>>().join(" "),
        )),
        "is" => {
            let [value] = one(name, &args)?;
            Ok(Value::Bool(value.as_bool().unwrap_or(false)))
        }

        // ── Lists and sets ────────────────────────────────────────────────
        "length" => {
            let [value] = one(name, &args)?;
            match value {
                Value::List(items) | Value::Set(items) => Ok(Value::Int(items.len() as i64)),
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(EvalError::TypeMismatch(format!("length of {}", other.type_name()))),
            }
        }
        "first" | "last" | "rest" | "emptyp" => {
            let [value] = one(name, &args)?;
            let items = value
                .as_list()
                .ok_or_else(|| EvalError::TypeMismatch(format!("{name} of {}", value.type_name())))?;
            match name {
                "emptyp" => Ok(Value::Bool(items.is_empty())),
                "rest" => Ok(Value::List(items.iter().skip(1).cloned().collect())),
                _ => {
                    let item = if name == "first" { items.first() } else { items.last() };
                    item.cloned()
                        .ok_or_else(|| EvalError::IndexOutOfRange { index: 1, len: 0 })
                }
            }
        }
        "cons" => match args.as_slice() {
            [item, Value::List(items)] => {
                let mut out = Vec::with_capacity(items.len() + 1);
                out.push(item.clone());
                out.extend(items.iter().cloned());
                Ok(Value::List(out))
            }
            _ => Err(mismatch(name, &args)),
        },
        "endcons" => match args.as_slice() {
            [item, Value::List(items)] => {
                let mut out = items.clone();
                out.push(item.clone());
                Ok(Value::List(out))
            }
            _ => Err(mismatch(name, &args)),
        },
        "append" => {
            let mut out = Vec::new();
            for arg in &args {
                match arg {
                    Value::List(items) => out.extend(items.iter().cloned()),
                    _ => return Err(mismatch(name, &args)),
                }
            }
            Ok(Value::List(out))
        }
        "member" => match args.as_slice() {
            [item, Value::List(items) | Value::Set(items)] => {
                Ok(Value::Bool(items.iter().any(|v| v.loosely_equals(item))))
            }
            _ => Err(mismatch(name, &args)),
        },
        "listify" => {
            let [value] = one(name, &args)?;
            match value {
                Value::Set(items) | Value::List(items) => Ok(Value::List(items.clone())),
                other => Err(EvalError::TypeMismatch(format!("listify of {}", other.type_name()))),
            }
        }
        "setp" | "listp" | "stringp" => {
            let [value] = one(name, &args)?;
            Ok(Value::Bool(matches!(
                (name, value),
                ("setp", Value::Set(_)) | ("listp", Value::List(_)) | ("stringp", Value::Str(_))
            )))
        }

        // ── Numbers ───────────────────────────────────────────────────────
        "min" | "max" => {
            let mut best: Option<Value> = None;
            for arg in &args {
                let x = numeric(name, arg)?;
                let replace = match &best {
                    None => true,
                    Some(current) => {
                        let c = numeric(name, current)?;
                        if name == "min" { x < c } else { x > c }
                    }
                };
                if replace {
                    best = Some(arg.clone());
                }
            }
            best.ok_or_else(|| arity(name, "at least 1", 0))
        }
        "round" => {
            let [value] = one(name, &args)?;
            match value {
                Value::Int(n) => Ok(Value::Int(*n)),
                other => Ok(Value::Int(numeric(name, other)?.round() as i64)),
            }
        }
        "float" => {
            let [value] = one(name, &args)?;
            Ok(Value::Float(numeric(name, value)?))
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn one<'a>(name: &str, args: &'a [Value]) -> EvalResult<&'a [Value; 1]> {
    args.try_into().map_err(|_| arity(name, "1", args.len()))
}

fn mismatch(name: &str, args: &[Value]) -> EvalError {
    let types: Vec<&str> = args.iter().map(Value::type_name).collect();
    EvalError::TypeMismatch(format!("{name}({})", types.join(", ")))
}

fn numeric(name: &str, value: &Value) -> EvalResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| EvalError::TypeMismatch(format!("{name} of {}", value.type_name())))
}

/// 1-based indexing into a list.
pub(crate) fn index(target: &Value, index: &Value) -> EvalResult<Value> {
    let (Value::List(items), Value::Int(i)) = (target, index) else {
        return Err(EvalError::TypeMismatch(format!(
            "{}[{}]",
            target.type_name(),
            index.type_name()
        )));
    };
    usize::try_from(*i)
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or(EvalError::IndexOutOfRange {
            index: *i,
            len: items.len(),
        })
}

pub(crate) fn negate(value: &Value) -> EvalResult<Value> {
    match value {
        Value::Int(n) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::Arithmetic("integer overflow".into())),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(EvalError::TypeMismatch(format!("-{}", other.type_name()))),
    }
}

pub(crate) fn factorial(value: &Value) -> EvalResult<Value> {
    match value {
        Value::Int(n) if *n >= 0 => (1..=*n)
            .try_fold(1i64, |acc, k| acc.checked_mul(k))
            .map(Value::Int)
            .ok_or_else(|| EvalError::Arithmetic("integer overflow".into())),
        other => Err(EvalError::TypeMismatch(format!("{}!", other.type_name()))),
    }
}

/// Values of `for v: from step s thru t`.
pub(crate) fn range(from: &Value, step: &Value, thru: &Value) -> EvalResult<Vec<Value>> {
    match (from, step, thru) {
        (Value::Int(from), Value::Int(step), Value::Int(thru)) if *step != 0 => {
            let mut out = Vec::new();
            let mut i = *from;
            while (*step > 0 && i <= *thru) || (*step < 0 && i >= *thru) {
                out.push(Value::Int(i));
                i += step;
            }
            Ok(out)
        }
        _ => Err(EvalError::Unsupported(format!(
            "loop range over {}, {}, {}",
            from.type_name(),
            step.type_name(),
            thru.type_name()
        ))),
    }
}

pub(crate) fn binary(op: BinOp, l: &Value, r: &Value) -> EvalResult<Value> {
    match op {
        BinOp::Eq => Ok(Value::Bool(l.loosely_equals(r))),
        BinOp::NotEq => Ok(Value::Bool(!l.loosely_equals(r))),
        BinOp::Less | BinOp::Greater | BinOp::LessEq | BinOp::GreaterEq => {
            let (a, b) = numbers(op, l, r)?;
            Ok(Value::Bool(match op {
                BinOp::Less => a < b,
                BinOp::Greater => a > b,
                BinOp::LessEq => a <= b,
                _ => a >= b,
            }))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            if let (Value::Int(a), Value::Int(b)) = (l, r) {
                let result = match op {
                    BinOp::Add => a.checked_add(*b),
                    BinOp::Sub => a.checked_sub(*b),
                    _ => a.checked_mul(*b),
                };
                return result
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Arithmetic("integer overflow".into()));
            }
            let (a, b) = numbers(op, l, r)?;
            Ok(Value::Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                _ => a * b,
            }))
        }
        BinOp::Div => {
            let (a, b) = numbers(op, l, r)?;
            if b == 0.0 {
                return Err(EvalError::Arithmetic("division by zero".into()));
            }
            match (l, r) {
                (Value::Int(x), Value::Int(y)) if x.checked_rem(*y) == Some(0) => x
                    .checked_div(*y)
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Arithmetic("integer overflow".into())),
                _ => Ok(Value::Float(a / b)),
            }
        }
        BinOp::Pow => match (l, r) {
            (Value::Int(base), Value::Int(exp)) if *exp >= 0 => u32::try_from(*exp)
                .ok()
                .and_then(|e| base.checked_pow(e))
                .map(Value::Int)
                .ok_or_else(|| EvalError::Arithmetic("integer overflow".into())),
            _ => {
                let (a, b) = numbers(op, l, r)?;
                Ok(Value::Float(a.powf(b)))
            }
        },
        BinOp::Dot | BinOp::Assign | BinOp::Define | BinOp::And | BinOp::Or => {
            Err(EvalError::Unsupported(format!("operator '{}'", op.symbol().trim())))
        }
    }
}

fn numbers(op: BinOp, l: &Value, r: &Value) -> EvalResult<(f64, f64)> {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(EvalError::TypeMismatch(format!(
            "{} {} {}",
            l.type_name(),
            op.symbol().trim(),
            r.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_division_stays_integer() {
        assert_eq!(binary(BinOp::Div, &Value::Int(1000), &Value::Int(1000)).unwrap(), Value::Int(1));
        assert_eq!(binary(BinOp::Div, &Value::Int(1), &Value::Int(2)).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_index_is_one_based() {
        let list = Value::List(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(index(&list, &Value::Int(2)).unwrap(), Value::Int(20));
        assert!(index(&list, &Value::Int(0)).is_err());
        assert!(index(&list, &Value::Int(3)).is_err());
    }

    #[test]
    fn test_range_with_negative_step() {
        let values = range(&Value::Int(3), &Value::Int(-1), &Value::Int(1)).unwrap();
        assert_eq!(values, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }
}
