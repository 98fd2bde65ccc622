//! Tree-walking evaluator.
//!
//! Variables live in a flat map. Values are copied on assignment, so
//! `ys = xs; ys[0] = 9` leaves `xs` untouched. Every statement, expression
//! node and produced element costs one step against the budget, and every
//! value that gets built or copied costs its [`Value::weight`] on top, so
//! the budget also bounds how much memory a program can allocate.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use super::builtins::{self, Builtin};
use super::parser::{BinOp, CmpOp, Expr, Stmt, Target, UnaryOp};
use super::value::{iterate, py_eq, range_len, Number, Value};
use super::{Limits, SandboxError};

/// Steps between wall-clock checks against the deadline.
const CLOCK_INTERVAL: u64 = 1024;

/// What a finished program left behind.
#[derive(Debug)]
pub struct Outcome {
    /// Everything passed to `print`
    pub output: String,
    /// Value of the last statement, if it was an expression
    pub value: Option<Value>,
}

pub struct Interpreter {
    vars: HashMap<String, Value>,
    output: String,
    steps: u64,
    limits: Limits,
    deadline: Option<Instant>,
    next_clock_check: u64,
}

impl Interpreter {
    pub fn new(limits: Limits, deadline: Option<Instant>) -> Self {
        let mut vars = HashMap::new();
        vars.insert("math".to_string(), Value::Module("math"));
        Self {
            vars,
            output: String::new(),
            steps: 0,
            limits,
            deadline,
            next_clock_check: CLOCK_INTERVAL,
        }
    }

    pub fn run(mut self, program: &[Stmt]) -> Result<Outcome, SandboxError> {
        let mut value = None;
        for stmt in program {
            value = self.exec(stmt)?;
        }
        Ok(Outcome {
            output: self.output,
            value,
        })
    }

    pub(super) fn limits(&self) -> &Limits {
        &self.limits
    }

    pub(super) fn tick(&mut self) -> Result<(), SandboxError> {
        self.spend(1)
    }

    /// Charge the allocation behind `value`. Scalars are covered by the
    /// step that produced them.
    pub(super) fn charge(&mut self, value: &Value) -> Result<(), SandboxError> {
        match value.weight() {
            0 | 1 => Ok(()),
            w => self.spend(w - 1),
        }
    }

    fn spend(&mut self, units: u64) -> Result<(), SandboxError> {
        self.steps = self.steps.saturating_add(units);
        if self.steps > self.limits.max_steps {
            return Err(SandboxError::StepLimit(self.limits.max_steps));
        }
        if self.steps >= self.next_clock_check {
            self.next_clock_check = self.steps.saturating_add(CLOCK_INTERVAL);
            if self.deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(SandboxError::Deadline);
            }
        }
        Ok(())
    }

    pub(super) fn write_output(&mut self, text: &str) -> Result<(), SandboxError> {
        if self.output.len() + text.len() > self.limits.max_collection_len {
            return Err(SandboxError::TooLarge(self.limits.max_collection_len));
        }
        self.output.push_str(text);
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Option<Value>, SandboxError> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => Ok(Some(self.eval(expr)?)),
            Stmt::Import(module) => {
                if module != "math" {
                    return Err(SandboxError::ForbiddenImport(module.clone()));
                }
                self.vars.insert(module.clone(), Value::Module("math"));
                Ok(None)
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
                Ok(None)
            }
            Stmt::AugAssign { target, op, value } => {
                let current = self.read_target(target)?;
                let rhs = self.eval(value)?;
                let updated = binary(*op, &current, &rhs, &self.limits)?;
                self.charge(&updated)?;
                self.assign(target, updated)?;
                Ok(None)
            }
        }
    }

    fn read_target(&mut self, target: &Target) -> Result<Value, SandboxError> {
        match target {
            Target::Name(name) => self.fetch(name),
            Target::Index { name, index } => {
                let base = self.fetch(name)?;
                let index = self.eval(index)?;
                subscript(&base, &index)
            }
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), SandboxError> {
        match target {
            Target::Name(name) => {
                self.vars.insert(name.clone(), value);
                Ok(())
            }
            Target::Index { name, index } => {
                let index = self.eval(index)?;
                let slot = self
                    .vars
                    .get_mut(name)
                    .ok_or_else(|| not_defined(name))?;
                match slot {
                    Value::List(items) => {
                        let i = list_index(&index, items.len(), "list assignment")?;
                        items[i] = value;
                        Ok(())
                    }
                    Value::Dict(entries) => {
                        if !index.is_hashable() {
                            return Err(unhashable(&index));
                        }
                        match entries.iter().position(|(k, _)| py_eq(k, &index)) {
                            Some(i) => entries[i].1 = value,
                            None => entries.push((index, value)),
                        }
                        Ok(())
                    }
                    other => Err(SandboxError::Runtime(format!(
                        "'{}' object does not support item assignment",
                        other.type_name()
                    ))),
                }
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, SandboxError> {
        if let Some(value) = self.vars.get(name) {
            return Ok(value.clone());
        }
        Builtin::from_name(name)
            .map(Value::Builtin)
            .ok_or_else(|| not_defined(name))
    }

    /// Copy a variable out, paying for the copy.
    fn fetch(&mut self, name: &str) -> Result<Value, SandboxError> {
        let value = self.lookup(name)?;
        self.charge(&value)?;
        Ok(value)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, SandboxError> {
        self.tick()?;
        match expr {
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => {
                let value = Value::Str(s.clone());
                self.charge(&value)?;
                Ok(value)
            }
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::Name(name) => self.fetch(name),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Dict(pairs) => {
                let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = self.eval(k)?;
                    let value = self.eval(v)?;
                    if !key.is_hashable() {
                        return Err(unhashable(&key));
                    }
                    match entries.iter().position(|(existing, _)| py_eq(existing, &key)) {
                        Some(i) => entries[i].1 = value,
                        None => entries.push((key, value)),
                    }
                }
                Ok(Value::Dict(entries))
            }
            Expr::ListComp {
                element,
                var,
                iter,
                cond,
            } => self.eval_comprehension(element, var, iter, cond.as_deref()),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                unary(*op, &value)
            }
            Expr::Binary(op, left, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                let value = binary(*op, &l, &r, &self.limits)?;
                self.charge(&value)?;
                Ok(value)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, right) in rest {
                    let right = self.eval(right)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(left, right) => {
                let l = self.eval(left)?;
                if !l.truthy() {
                    return Ok(l);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let l = self.eval(left)?;
                if l.truthy() {
                    return Ok(l);
                }
                self.eval(right)
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.truthy())),
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee)?;
                let args = args
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = match callee {
                    Value::Builtin(b) => builtins::call(self, b, args)?,
                    Value::MathFn(f) => builtins::call_math(self, f, args)?,
                    other => {
                        return Err(SandboxError::Runtime(format!(
                            "'{}' object is not callable",
                            other.type_name()
                        )));
                    }
                };
                self.charge(&value)?;
                Ok(value)
            }
            Expr::Index(base, index) => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                let value = subscript(&base, &index)?;
                self.charge(&value)?;
                Ok(value)
            }
            Expr::Attr(base, attr) => match self.eval(base)? {
                Value::Module(module) => builtins::math_attr(attr).ok_or_else(|| {
                    SandboxError::Runtime(format!(
                        "module '{module}' has no attribute '{attr}'"
                    ))
                }),
                other => Err(SandboxError::Runtime(format!(
                    "'{}' object has no attribute '{attr}'",
                    other.type_name()
                ))),
            },
        }
    }

    fn eval_comprehension(
        &mut self,
        element: &Expr,
        var: &str,
        iter: &Expr,
        cond: Option<&Expr>,
    ) -> Result<Value, SandboxError> {
        let source = self.eval(iter)?;
        let items = iterate(&source, self.limits.max_collection_len)?;
        self.spend(items.iter().map(Value::weight).sum())?;
        let shadowed = self.vars.remove(var);

        let result = (|| -> Result<Value, SandboxError> {
            let mut out = Vec::new();
            for item in items {
                self.tick()?;
                self.vars.insert(var.to_string(), item);
                if let Some(cond) = cond {
                    if !self.eval(cond)?.truthy() {
                        continue;
                    }
                }
                out.push(self.eval(element)?);
            }
            Ok(Value::List(out))
        })();

        match shadowed {
            Some(previous) => self.vars.insert(var.to_string(), previous),
            None => self.vars.remove(var),
        };
        result
    }
}

fn not_defined(name: &str) -> SandboxError {
    SandboxError::Runtime(format!("name '{name}' is not defined"))
}

fn unhashable(value: &Value) -> SandboxError {
    SandboxError::Runtime(format!("unhashable type: '{}'", value.type_name()))
}

fn overflow() -> SandboxError {
    SandboxError::Runtime("integer overflow".into())
}

fn unsupported(op: BinOp, a: &Value, b: &Value) -> SandboxError {
    SandboxError::Runtime(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

/// Resolve a possibly negative index against a sequence length.
fn list_index(index: &Value, len: usize, what: &str) -> Result<usize, SandboxError> {
    let i = match index {
        Value::Int(i) => *i,
        Value::Bool(b) => *b as i64,
        other => {
            return Err(SandboxError::Runtime(format!(
                "{what} indices must be integers, not {}",
                other.type_name()
            )));
        }
    };
    let len = len as i64;
    let resolved = if i < 0 { i + len } else { i };
    if resolved < 0 || resolved >= len {
        return Err(SandboxError::Runtime(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

fn subscript(base: &Value, index: &Value) -> Result<Value, SandboxError> {
    match base {
        Value::List(items) => Ok(items[list_index(index, items.len(), "list")?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = list_index(index, chars.len(), "string")?;
            Ok(Value::Str(chars[i].to_string()))
        }
        Value::Range { start, stop, step } => {
            let len = range_len(*start, *stop, *step).min(usize::MAX as u64) as usize;
            let i = list_index(index, len, "range object")?;
            Ok(Value::Int((*start as i128 + *step as i128 * i as i128) as i64))
        }
        Value::Dict(entries) => entries
            .iter()
            .find(|(k, _)| py_eq(k, index))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| SandboxError::Runtime(format!("KeyError: {}", index.repr()))),
        other => Err(SandboxError::Runtime(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value, SandboxError> {
    let number = value.as_number().ok_or_else(|| {
        SandboxError::Runtime(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            value.type_name()
        ))
    })?;
    Ok(match (op, number) {
        (UnaryOp::Pos, n) => n.into_value(),
        (UnaryOp::Neg, Number::Int(i)) => Value::Int(i.checked_neg().ok_or_else(overflow)?),
        (UnaryOp::Neg, Number::Float(f)) => Value::Float(-f),
    })
}

fn check_len(len: usize, limits: &Limits) -> Result<(), SandboxError> {
    if len > limits.max_collection_len {
        return Err(SandboxError::TooLarge(limits.max_collection_len));
    }
    Ok(())
}

/// Repetition count for `seq * n`, clamped at zero like Python.
fn repeat_count(n: i64, item_len: usize, limits: &Limits) -> Result<usize, SandboxError> {
    let n = n.max(0) as u64;
    let total = n.saturating_mul(item_len as u64);
    check_len(total.min(usize::MAX as u64) as usize, limits)?;
    Ok(n as usize)
}

pub(super) fn binary(op: BinOp, a: &Value, b: &Value, limits: &Limits) -> Result<Value, SandboxError> {
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => {
            check_len(x.len() + y.len(), limits)?;
            Ok(Value::Str(format!("{x}{y}")))
        }
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            check_len(x.len() + y.len(), limits)?;
            Ok(Value::List(x.iter().chain(y).cloned().collect()))
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            let count = repeat_count(*n, s.len(), limits)?;
            Ok(Value::Str(s.repeat(count)))
        }
        (BinOp::Mul, Value::List(items), Value::Int(n))
        | (BinOp::Mul, Value::Int(n), Value::List(items)) => {
            let count = repeat_count(*n, items.len(), limits)?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::List(out))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => arithmetic(op, x, y).map(Number::into_value),
            _ => Err(unsupported(op, a, b)),
        },
    }
}

fn arithmetic(op: BinOp, x: Number, y: Number) -> Result<Number, SandboxError> {
    if let (Number::Int(a), Number::Int(b)) = (x, y) {
        return int_arithmetic(op, a, b);
    }
    let (a, b) = (x.to_f64(), y.to_f64());
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(SandboxError::Runtime("float division by zero".into()));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(SandboxError::Runtime("float floor division by zero".into()));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(SandboxError::Runtime("float modulo by zero".into()));
            }
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        }
        BinOp::Pow => float_pow(a, b)?,
    };
    Ok(Number::Float(result))
}

fn int_arithmetic(op: BinOp, a: i64, b: i64) -> Result<Number, SandboxError> {
    let value = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(SandboxError::Runtime("division by zero".into()));
            }
            return Ok(Number::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(SandboxError::Runtime(
                    "integer division or modulo by zero".into(),
                ));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(SandboxError::Runtime("integer modulo by zero".into()));
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
        }
        BinOp::Pow => {
            if b < 0 {
                return float_pow(a as f64, b as f64).map(Number::Float);
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Number::Int(value))
}

fn float_pow(a: f64, b: f64) -> Result<f64, SandboxError> {
    if a == 0.0 && b < 0.0 {
        return Err(SandboxError::Runtime(
            "0.0 cannot be raised to a negative power".into(),
        ));
    }
    if a < 0.0 && b.fract() != 0.0 {
        return Err(SandboxError::Runtime(
            "negative number cannot be raised to a fractional power".into(),
        ));
    }
    let result = a.powf(b);
    if result.is_infinite() && a.is_finite() && b.is_finite() {
        return Err(SandboxError::Runtime("numerical result out of range".into()));
    }
    Ok(result)
}

/// Python ordering. `None` means unordered (a NaN was involved).
pub(super) fn py_cmp(a: &Value, b: &Value) -> Result<Option<Ordering>, SandboxError> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) => {
            for (l, r) in x.iter().zip(y) {
                if !py_eq(l, r) {
                    return py_cmp(l, r);
                }
            }
            Ok(Some(x.len().cmp(&y.len())))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(Number::Int(x)), Some(Number::Int(y))) => Ok(Some(x.cmp(&y))),
            (Some(x), Some(y)) => Ok(x.to_f64().partial_cmp(&y.to_f64())),
            _ => Err(SandboxError::Runtime(format!(
                "'<' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, SandboxError> {
    match container {
        Value::List(items) => Ok(items.iter().any(|v| py_eq(v, item))),
        Value::Dict(entries) => Ok(entries.iter().any(|(k, _)| py_eq(k, item))),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_str())),
            other => Err(SandboxError::Runtime(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::Range { start, stop, step } => match item.as_number() {
            Some(Number::Int(i)) => {
                let in_bounds = if *step > 0 {
                    *start <= i && i < *stop
                } else {
                    *stop < i && i <= *start
                };
                Ok(in_bounds && (i as i128 - *start as i128) % *step as i128 == 0)
            }
            _ => Ok(false),
        },
        other => Err(SandboxError::Runtime(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, SandboxError> {
    Ok(match op {
        CmpOp::Eq => py_eq(a, b),
        CmpOp::NotEq => !py_eq(a, b),
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Lt => py_cmp(a, b)? == Some(Ordering::Less),
        CmpOp::LtEq => matches!(py_cmp(a, b)?, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => py_cmp(a, b)? == Some(Ordering::Greater),
        CmpOp::GtEq => matches!(py_cmp(a, b)?, Some(Ordering::Greater | Ordering::Equal)),
    })
}
