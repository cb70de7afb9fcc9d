//! Core expression evaluator.

use std::collections::BTreeMap;

use stateq_parser::{parse_expression, parse_fragment};
use stateq_types::{BinOp, CasExpr, CasKind, LoopSource, PostfixOp, PrefixOp, Statement};
use tracing::trace;

use crate::builtins;
use crate::env::Environment;
use crate::error::{EvalError, EvalResult};
use crate::value::Value;

/// Default step budget.
pub const DEFAULT_GAS_LIMIT: u64 = 1_000_000;

/// A host function callable from evaluated code.
pub type NativeFn = Box<dyn Fn(&[Value]) -> EvalResult<Value>>;

#[derive(Debug, Clone)]
struct Function {
    params: Vec<String>,
    body: CasExpr,
}

/// Tree-walking evaluator over parsed CAS code.
pub struct Evaluator {
    pub env: Environment,
    functions: BTreeMap<String, Function>,
    natives: BTreeMap<String, NativeFn>,
    /// Steps taken so far.
    pub gas: u64,
    pub gas_limit: u64,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_gas_limit(DEFAULT_GAS_LIMIT)
    }

    pub fn with_gas_limit(gas_limit: u64) -> Self {
        Self {
            env: Environment::new(),
            functions: BTreeMap::new(),
            natives: BTreeMap::new(),
            gas: 0,
            gas_limit,
        }
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.gas += 1;
        if self.gas > self.gas_limit {
            Err(EvalError::GasExhausted)
        } else {
            Ok(())
        }
    }

    /// Make a host function callable by name. Host functions take
    /// precedence over builtins and defined functions.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        function: impl Fn(&[Value]) -> EvalResult<Value> + 'static,
    ) {
        self.natives.insert(name.into(), Box::new(function));
    }

    pub fn set_var(&mut self, name: &str, value: Value) {
        self.env.set(name, value);
    }

    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.env.get(name)
    }

    pub fn is_defined(&self, function: &str) -> bool {
        self.functions.contains_key(function)
    }

    /// Parse and run a statement list; the value of the last statement.
    pub fn run(&mut self, source: &str) -> EvalResult<Value> {
        let parsed = parse_fragment(source);
        if let Some(error) = parsed.errors.errors.first() {
            return Err(EvalError::Parse(error.message.clone()));
        }
        let mut last = Value::Bool(false);
        for statement in parsed.value.map(|f| f.statements).unwrap_or_default() {
            last = self.statement(&statement)?;
        }
        Ok(last)
    }

    /// Parse and evaluate a single expression.
    pub fn eval_str(&mut self, source: &str) -> EvalResult<Value> {
        let expr = parse_expression(source)
            .into_result()
            .map_err(|errors| {
                EvalError::Parse(
                    errors
                        .errors
                        .first()
                        .map(|e| e.message.clone())
                        .unwrap_or_default(),
                )
            })?;
        self.eval(&expr)
    }

    /// Call a function by name with evaluated arguments.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        if let Some(native) = self.natives.get(name) {
            return native(&args);
        }
        if let Some(function) = self.functions.get(name).cloned() {
            return self.call_defined(name, &function, args);
        }
        builtins::call(name, args)
    }

    fn statement(&mut self, statement: &Statement) -> EvalResult<Value> {
        let Some(flag) = statement.flag("simp") else {
            return self.eval(&statement.expr);
        };
        let simp = match &flag.value {
            Some(value) => self.eval(value)?,
            None => Value::Bool(true),
        };
        let saved = self.env.get("simp").cloned().unwrap_or(Value::Bool(true));
        self.env.set("simp", simp);
        let result = self.eval(&statement.expr);
        self.env.set("simp", saved);
        result
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expression evaluation
    // ══════════════════════════════════════════════════════════════════════

    pub fn eval(&mut self, expr: &CasExpr) -> EvalResult<Value> {
        self.tick()?;
        match &expr.kind {
            CasKind::Number(text) => number(text),
            CasKind::Str(s) => Ok(Value::Str(s.clone())),
            CasKind::Bool(b) => Ok(Value::Bool(*b)),
            CasKind::Ident(name) => Ok(self
                .env
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::Symbol(name.clone()))),
            CasKind::Call { name, args } => self.eval_call(name, args),
            CasKind::Index { target, indices } => {
                let mut value = self.eval(target)?;
                for index in indices {
                    let index = self.eval(index)?;
                    value = builtins::index(&value, &index)?;
                }
                Ok(value)
            }
            CasKind::List(items) => Ok(Value::List(self.eval_all(items)?)),
            CasKind::Set(items) => Ok(Value::set(self.eval_all(items)?)),
            CasKind::Group(items) => {
                let mut last = Value::Bool(false);
                for item in items {
                    last = self.eval(item)?;
                }
                Ok(last)
            }
            CasKind::Prefix { op, operand } => self.eval_prefix(*op, operand),
            CasKind::Postfix {
                op: PostfixOp::Factorial,
                operand,
            } => {
                let value = self.eval(operand)?;
                builtins::factorial(&value)
            }
            CasKind::Binary { op, left, right } => self.eval_binary(*op, left, right),
            CasKind::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.condition(condition)? {
                        return self.eval(body);
                    }
                }
                match otherwise {
                    Some(body) => self.eval(body),
                    None => Ok(Value::Bool(false)),
                }
            }
            CasKind::For { var, source, body } => self.eval_for(var, source, body),
        }
    }

    fn eval_all(&mut self, items: &[CasExpr]) -> EvalResult<Vec<Value>> {
        items.iter().map(|item| self.eval(item)).collect()
    }

    fn condition(&mut self, expr: &CasExpr) -> EvalResult<bool> {
        let value = self.eval(expr)?;
        value.as_bool().ok_or_else(|| {
            EvalError::TypeMismatch(format!("condition evaluated to {}", value.type_name()))
        })
    }

    fn eval_prefix(&mut self, op: PrefixOp, operand: &CasExpr) -> EvalResult<Value> {
        match op {
            PrefixOp::Quote => Ok(Value::Symbol(operand.to_string())),
            PrefixOp::Not => {
                let b = self.condition(operand)?;
                Ok(Value::Bool(!b))
            }
            PrefixOp::Neg => {
                let value = self.eval(operand)?;
                builtins::negate(&value)
            }
        }
    }

    fn eval_binary(&mut self, op: BinOp, left: &CasExpr, right: &CasExpr) -> EvalResult<Value> {
        match op {
            BinOp::Assign => {
                let name = left.as_ident().ok_or_else(|| {
                    EvalError::Unsupported(format!("assignment to '{left}'"))
                })?;
                let value = self.eval(right)?;
                self.env.set(name, value.clone());
                Ok(value)
            }
            BinOp::Define => {
                let CasKind::Call { name, args } = &left.kind else {
                    return Err(EvalError::Unsupported(format!("definition of '{left}'")));
                };
                let params = args
                    .iter()
                    .map(|a| {
                        a.as_ident().map(str::to_string).ok_or_else(|| {
                            EvalError::Unsupported(format!("parameter '{a}'"))
                        })
                    })
                    .collect::<EvalResult<Vec<_>>>()?;
                trace!(function = %name, params = params.len(), "defined function");
                self.functions.insert(
                    name.clone(),
                    Function {
                        params,
                        body: right.clone(),
                    },
                );
                Ok(Value::Symbol(name.clone()))
            }
            BinOp::And => Ok(Value::Bool(self.condition(left)? && self.condition(right)?)),
            BinOp::Or => Ok(Value::Bool(self.condition(left)? || self.condition(right)?)),
            _ => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                builtins::binary(op, &l, &r)
            }
        }
    }

    fn eval_for(&mut self, var: &str, source: &LoopSource, body: &CasExpr) -> EvalResult<Value> {
        let items: Vec<Value> = match source {
            LoopSource::In(list) => match self.eval(list)? {
                Value::List(items) | Value::Set(items) => items,
                other => {
                    return Err(EvalError::TypeMismatch(format!(
                        "for ... in over {}",
                        other.type_name()
                    )))
                }
            },
            LoopSource::Range { from, step, thru } => {
                let from = self.eval(from)?;
                let step = match step {
                    Some(step) => self.eval(step)?,
                    None => Value::Int(1),
                };
                let thru = self.eval(thru)?;
                builtins::range(&from, &step, &thru)?
            }
        };
        self.env.push_scope();
        let result = self.loop_body(var, items, body);
        self.env.pop_scope();
        result.map(|_| Value::Symbol("done".to_string()))
    }

    fn loop_body(&mut self, var: &str, items: Vec<Value>, body: &CasExpr) -> EvalResult<()> {
        for item in items {
            self.env.define(var, item);
            self.eval(body)?;
        }
        Ok(())
    }

    // ── Calls ─────────────────────────────────────────────────────────────

    fn eval_call(&mut self, name: &str, args: &[CasExpr]) -> EvalResult<Value> {
        match name {
            "block" => self.eval_block(args),
            "errcatch" => {
                let mut last = Value::Bool(false);
                for arg in args {
                    match self.eval(arg) {
                        Ok(value) => last = value,
                        Err(error) if error.is_catchable() => {
                            trace!(%error, "errcatch trapped");
                            return Ok(Value::empty_list());
                        }
                        Err(error) => return Err(error),
                    }
                }
                Ok(Value::List(vec![last]))
            }
            "return" => {
                let value = match args {
                    [] => Value::Bool(false),
                    [value] => self.eval(value)?,
                    _ => return Err(arity("return", "0 or 1", args.len())),
                };
                Err(EvalError::Return(value))
            }
            _ => {
                let values = self.eval_all(args)?;
                self.call(name, values)
            }
        }
    }

    /// `block([locals], body...)`; a local written `x: v` starts at `v`.
    fn eval_block(&mut self, args: &[CasExpr]) -> EvalResult<Value> {
        let (locals, body) = match args.split_first() {
            Some((first, rest)) => match &first.kind {
                CasKind::List(locals) => (locals.as_slice(), rest),
                _ => (&[][..], args),
            },
            None => return Ok(Value::Bool(false)),
        };

        let mut initial = Vec::with_capacity(locals.len());
        for local in locals {
            match &local.kind {
                CasKind::Ident(name) => initial.push((name.clone(), Value::Symbol(name.clone()))),
                CasKind::Binary {
                    op: BinOp::Assign,
                    left,
                    right,
                } => {
                    let name = left.as_ident().ok_or_else(|| {
                        EvalError::Unsupported(format!("block local '{left}'"))
                    })?;
                    initial.push((name.to_string(), self.eval(right)?));
                }
                _ => return Err(EvalError::Unsupported(format!("block local '{local}'"))),
            }
        }

        self.env.push_scope();
        for (name, value) in initial {
            self.env.define(&name, value);
        }
        let mut result = Ok(Value::Bool(false));
        for statement in body {
            result = self.eval(statement);
            if result.is_err() {
                break;
            }
        }
        self.env.pop_scope();
        match result {
            Err(EvalError::Return(value)) => Ok(value),
            other => other,
        }
    }

    fn call_defined(&mut self, name: &str, function: &Function, args: Vec<Value>) -> EvalResult<Value> {
        if function.params.len() != args.len() {
            return Err(arity(name, &function.params.len().to_string(), args.len()));
        }
        self.env.push_scope();
        for (param, value) in function.params.iter().zip(args) {
            self.env.define(param, value);
        }
        let result = self.eval(&function.body);
        self.env.pop_scope();
        result
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn arity(name: &str, expected: &str, found: usize) -> EvalError {
    EvalError::Arity {
        name: name.to_string(),
        expected: expected.to_string(),
        found,
    }
}

fn number(text: &str) -> EvalResult<Value> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::Int(n));
    }
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| EvalError::Parse(format!("invalid number '{text}'")))
}
