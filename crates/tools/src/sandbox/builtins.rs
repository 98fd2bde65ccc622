//! Whitelisted builtin functions and the `math` module.
//!
//! This is the entire surface a program can reach. There is no `open`,
//! no `__import__` and no attribute access beyond `math.<name>`.

use super::interp::{binary, py_cmp, Interpreter};
use super::parser::BinOp;
use super::value::{iterate, py_eq, range_len, Number, Value};
use super::SandboxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Min,
    Max,
    Sum,
    Round,
    Len,
    Range,
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Print,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "sum" => Builtin::Sum,
            "round" => Builtin::Round,
            "len" => Builtin::Len,
            "range" => Builtin::Range,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "float" => Builtin::Float,
            "bool" => Builtin::Bool,
            "list" => Builtin::List,
            "dict" => Builtin::Dict,
            "print" => Builtin::Print,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Round => "round",
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::List => "list",
            Builtin::Dict => "dict",
            Builtin::Print => "print",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Log,
    Log10,
    Log2,
    Exp,
    Floor,
    Ceil,
    Trunc,
    Pow,
    Fabs,
    Factorial,
    Gcd,
    Hypot,
    Degrees,
    Radians,
}

impl MathFn {
    pub fn name(self) -> &'static str {
        match self {
            MathFn::Sqrt => "sqrt",
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Asin => "asin",
            MathFn::Acos => "acos",
            MathFn::Atan => "atan",
            MathFn::Atan2 => "atan2",
            MathFn::Log => "log",
            MathFn::Log10 => "log10",
            MathFn::Log2 => "log2",
            MathFn::Exp => "exp",
            MathFn::Floor => "floor",
            MathFn::Ceil => "ceil",
            MathFn::Trunc => "trunc",
            MathFn::Pow => "pow",
            MathFn::Fabs => "fabs",
            MathFn::Factorial => "factorial",
            MathFn::Gcd => "gcd",
            MathFn::Hypot => "hypot",
            MathFn::Degrees => "degrees",
            MathFn::Radians => "radians",
        }
    }
}

const MATH_FNS: [MathFn; 22] = [
    MathFn::Sqrt,
    MathFn::Sin,
    MathFn::Cos,
    MathFn::Tan,
    MathFn::Asin,
    MathFn::Acos,
    MathFn::Atan,
    MathFn::Atan2,
    MathFn::Log,
    MathFn::Log10,
    MathFn::Log2,
    MathFn::Exp,
    MathFn::Floor,
    MathFn::Ceil,
    MathFn::Trunc,
    MathFn::Pow,
    MathFn::Fabs,
    MathFn::Factorial,
    MathFn::Gcd,
    MathFn::Hypot,
    MathFn::Degrees,
    MathFn::Radians,
];

/// Resolve `math.<name>`.
pub fn math_attr(name: &str) -> Option<Value> {
    let constant = match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        "tau" => Some(std::f64::consts::TAU),
        "inf" => Some(f64::INFINITY),
        "nan" => Some(f64::NAN),
        _ => None,
    };
    if let Some(c) = constant {
        return Some(Value::Float(c));
    }
    MATH_FNS
        .iter()
        .find(|f| f.name() == name)
        .map(|f| Value::MathFn(*f))
}

fn runtime(message: impl Into<String>) -> SandboxError {
    SandboxError::Runtime(message.into())
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), SandboxError> {
    let n = args.len();
    if n < min || n > max {
        let expected = if min == max {
            format!("exactly {min}")
        } else if n < min {
            format!("at least {min}")
        } else {
            format!("at most {max}")
        };
        let noun = if min == max && min == 1 { "argument" } else { "arguments" };
        return Err(runtime(format!(
            "{name}() takes {expected} {noun} ({n} given)"
        )));
    }
    Ok(())
}

fn int_arg(value: &Value) -> Result<i64, SandboxError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(*b as i64),
        other => Err(runtime(format!(
            "'{}' object cannot be interpreted as an integer",
            other.type_name()
        ))),
    }
}

fn float_arg(value: &Value) -> Result<f64, SandboxError> {
    value
        .as_f64()
        .ok_or_else(|| runtime(format!("must be real number, not {}", value.type_name())))
}

fn float_to_int(f: f64) -> Result<i64, SandboxError> {
    if f.is_nan() {
        return Err(runtime("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(runtime("cannot convert float infinity to integer"));
    }
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(runtime("integer overflow"));
    }
    Ok(f as i64)
}

pub fn call(
    interp: &mut Interpreter,
    builtin: Builtin,
    args: Vec<Value>,
) -> Result<Value, SandboxError> {
    let name = builtin.name();
    let max_len = interp.limits().max_collection_len;

    match builtin {
        Builtin::Abs => {
            expect_args(name, &args, 1, 1)?;
            match args[0].as_number() {
                Some(Number::Int(i)) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| runtime("integer overflow")),
                Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
                None => Err(runtime(format!(
                    "bad operand type for abs(): '{}'",
                    args[0].type_name()
                ))),
            }
        }
        Builtin::Min | Builtin::Max => {
            if args.is_empty() {
                return Err(runtime(format!("{name} expected at least 1 argument, got 0")));
            }
            let items = if args.len() == 1 {
                iterate(&args[0], max_len)?
            } else {
                args
            };
            let mut best: Option<Value> = None;
            for item in items {
                interp.tick()?;
                let replace = match &best {
                    None => true,
                    Some(current) => {
                        let ord = py_cmp(&item, current)?;
                        if builtin == Builtin::Min {
                            ord == Some(std::cmp::Ordering::Less)
                        } else {
                            ord == Some(std::cmp::Ordering::Greater)
                        }
                    }
                };
                if replace {
                    best = Some(item);
                }
            }
            best.ok_or_else(|| runtime(format!("{name}() arg is an empty sequence")))
        }
        Builtin::Sum => {
            expect_args(name, &args, 1, 2)?;
            let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
            if matches!(total, Value::Str(_)) {
                return Err(runtime("sum() can't sum strings [use ''.join(seq) instead]"));
            }
            for item in iterate(&args[0], max_len)? {
                interp.tick()?;
                total = binary(BinOp::Add, &total, &item, interp.limits())?;
                interp.charge(&total)?;
            }
            Ok(total)
        }
        Builtin::Round => {
            expect_args(name, &args, 1, 2)?;
            let digits = match args.get(1) {
                None | Some(Value::None) => None,
                Some(d) => Some(int_arg(d)?),
            };
            round(&args[0], digits)
        }
        Builtin::Len => {
            expect_args(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count() as u64,
                Value::List(items) => items.len() as u64,
                Value::Dict(entries) => entries.len() as u64,
                Value::Range { start, stop, step } => range_len(*start, *stop, *step),
                other => {
                    return Err(runtime(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            i64::try_from(len)
                .map(Value::Int)
                .map_err(|_| runtime("integer overflow"))
        }
        Builtin::Range => {
            expect_args(name, &args, 1, 3)?;
            let ints = args.iter().map(int_arg).collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match *ints.as_slice() {
                [] => (0, 0, 1),
                [stop] => (0, stop, 1),
                [start, stop] => (start, stop, 1),
                [start, stop, step, ..] => (start, stop, step),
            };
            if step == 0 {
                return Err(runtime("range() arg 3 must not be zero"));
            }
            Ok(Value::Range { start, stop, step })
        }
        Builtin::Str => {
            expect_args(name, &args, 0, 1)?;
            Ok(Value::Str(
                args.first().map(|v| v.to_string()).unwrap_or_default(),
            ))
        }
        Builtin::Int => {
            expect_args(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Int(i)) => Ok(Value::Int(*i)),
                Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
                Some(Value::Float(f)) => float_to_int(f.trunc()).map(Value::Int),
                Some(Value::Str(s)) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| {
                        runtime(format!(
                            "invalid literal for int() with base 10: {}",
                            Value::Str(s.clone()).repr()
                        ))
                    }),
                Some(other) => Err(runtime(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::Float => {
            expect_args(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                    runtime(format!(
                        "could not convert string to float: {}",
                        Value::Str(s.clone()).repr()
                    ))
                }),
                Some(other) => other.as_f64().map(Value::Float).ok_or_else(|| {
                    runtime(format!(
                        "float() argument must be a string or a real number, not '{}'",
                        other.type_name()
                    ))
                }),
            }
        }
        Builtin::Bool => {
            expect_args(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }
        Builtin::List => {
            expect_args(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::List(Vec::new())),
                Some(v) => Ok(Value::List(iterate(v, max_len)?)),
            }
        }
        Builtin::Dict => {
            expect_args(name, &args, 0, 1)?;
            match args.into_iter().next() {
                None => Ok(Value::Dict(Vec::new())),
                Some(Value::Dict(entries)) => Ok(Value::Dict(entries)),
                Some(source) => {
                    let mut entries: Vec<(Value, Value)> = Vec::new();
                    for (i, item) in iterate(&source, max_len)?.into_iter().enumerate() {
                        interp.tick()?;
                        let Value::List(mut pair) = item else {
                            return Err(runtime(format!(
                                "cannot convert dictionary update sequence element #{i} to a sequence"
                            )));
                        };
                        if pair.len() != 2 {
                            return Err(runtime(format!(
                                "dictionary update sequence element #{i} has length {}; 2 is required",
                                pair.len()
                            )));
                        }
                        let value = pair.pop().unwrap_or(Value::None);
                        let key = pair.pop().unwrap_or(Value::None);
                        if !key.is_hashable() {
                            return Err(runtime(format!(
                                "unhashable type: '{}'",
                                key.type_name()
                            )));
                        }
                        match entries.iter().position(|(k, _)| py_eq(k, &key)) {
                            Some(at) => entries[at].1 = value,
                            None => entries.push((key, value)),
                        }
                    }
                    Ok(Value::Dict(entries))
                }
            }
        }
        Builtin::Print => {
            let line = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            interp.write_output(&line)?;
            interp.write_output("\n")?;
            Ok(Value::None)
        }
    }
}

/// Python's `round`: ties go to the even neighbour.
fn round(value: &Value, digits: Option<i64>) -> Result<Value, SandboxError> {
    let number = value.as_number().ok_or_else(|| {
        runtime(format!(
            "type {} doesn't define __round__ method",
            value.type_name()
        ))
    })?;

    match (number, digits) {
        (Number::Int(i), None) => Ok(Value::Int(i)),
        (Number::Int(i), Some(d)) if d >= 0 => Ok(Value::Int(i)),
        (Number::Int(i), Some(d)) => {
            let scale = 10f64.powi(d.clamp(-308, 0).unsigned_abs() as i32);
            float_to_int((i as f64 / scale).round_ties_even() * scale).map(Value::Int)
        }
        (Number::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Number::Float(f), Some(d)) => {
            let d = d.clamp(-308, 308) as i32;
            let scale = 10f64.powi(d);
            let rounded = (f * scale).round_ties_even() / scale;
            Ok(Value::Float(if rounded.is_finite() { rounded } else { f }))
        }
    }
}

fn domain_error() -> SandboxError {
    runtime("math domain error")
}

pub fn call_math(
    interp: &mut Interpreter,
    func: MathFn,
    args: Vec<Value>,
) -> Result<Value, SandboxError> {
    let name = func.name();

    let unary = |args: &[Value]| -> Result<f64, SandboxError> {
        expect_args(name, args, 1, 1)?;
        float_arg(&args[0])
    };
    let binary_args = |args: &[Value]| -> Result<(f64, f64), SandboxError> {
        expect_args(name, args, 2, 2)?;
        Ok((float_arg(&args[0])?, float_arg(&args[1])?))
    };

    let result = match func {
        MathFn::Sqrt => {
            let x = unary(&args)?;
            if x < 0.0 {
                return Err(domain_error());
            }
            x.sqrt()
        }
        MathFn::Sin => unary(&args)?.sin(),
        MathFn::Cos => unary(&args)?.cos(),
        MathFn::Tan => unary(&args)?.tan(),
        MathFn::Asin | MathFn::Acos => {
            let x = unary(&args)?;
            if !(-1.0..=1.0).contains(&x) {
                return Err(domain_error());
            }
            if func == MathFn::Asin { x.asin() } else { x.acos() }
        }
        MathFn::Atan => unary(&args)?.atan(),
        MathFn::Atan2 => {
            let (y, x) = binary_args(&args)?;
            y.atan2(x)
        }
        MathFn::Log => {
            expect_args(name, &args, 1, 2)?;
            let x = float_arg(&args[0])?;
            if x <= 0.0 {
                return Err(domain_error());
            }
            match args.get(1) {
                None => x.ln(),
                Some(base) => {
                    let base = float_arg(base)?;
                    if base <= 0.0 || base == 1.0 {
                        return Err(domain_error());
                    }
                    x.ln() / base.ln()
                }
            }
        }
        MathFn::Log10 | MathFn::Log2 => {
            let x = unary(&args)?;
            if x <= 0.0 {
                return Err(domain_error());
            }
            if func == MathFn::Log10 { x.log10() } else { x.log2() }
        }
        MathFn::Exp => {
            let x = unary(&args)?;
            let y = x.exp();
            if y.is_infinite() && x.is_finite() {
                return Err(runtime("math range error"));
            }
            y
        }
        MathFn::Floor | MathFn::Ceil | MathFn::Trunc => {
            expect_args(name, &args, 1, 1)?;
            if let Some(Number::Int(i)) = args[0].as_number() {
                return Ok(Value::Int(i));
            }
            let x = float_arg(&args[0])?;
            let r = match func {
                MathFn::Floor => x.floor(),
                MathFn::Ceil => x.ceil(),
                _ => x.trunc(),
            };
            return float_to_int(r).map(Value::Int);
        }
        MathFn::Pow => {
            let (x, y) = binary_args(&args)?;
            if x == 0.0 && y < 0.0 {
                return Err(domain_error());
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err(domain_error());
            }
            let r = x.powf(y);
            if r.is_infinite() && x.is_finite() && y.is_finite() {
                return Err(runtime("math range error"));
            }
            r
        }
        MathFn::Fabs => unary(&args)?.abs(),
        MathFn::Hypot => {
            let (x, y) = binary_args(&args)?;
            x.hypot(y)
        }
        MathFn::Degrees => unary(&args)?.to_degrees(),
        MathFn::Radians => unary(&args)?.to_radians(),
        MathFn::Factorial => {
            expect_args(name, &args, 1, 1)?;
            let n = int_arg(&args[0])?;
            if n < 0 {
                return Err(runtime("factorial() not defined for negative values"));
            }
            let mut acc: i64 = 1;
            for k in 2..=n {
                interp.tick()?;
                acc = acc.checked_mul(k).ok_or_else(|| runtime("integer overflow"))?;
            }
            return Ok(Value::Int(acc));
        }
        MathFn::Gcd => {
            let mut acc: i64 = 0;
            for arg in &args {
                interp.tick()?;
                let mut b = int_arg(arg)?.checked_abs().ok_or_else(|| runtime("integer overflow"))?;
                let mut a = acc;
                while b != 0 {
                    (a, b) = (b, a % b);
                }
                acc = a;
            }
            return Ok(Value::Int(acc));
        }
    };

    Ok(Value::Float(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_math_function_resolves_by_name() {
        for f in MATH_FNS {
            assert!(matches!(math_attr(f.name()), Some(Value::MathFn(g)) if g == f));
        }
        assert!(matches!(math_attr("pi"), Some(Value::Float(_))));
        assert!(math_attr("system").is_none());
        assert!(math_attr("__loader__").is_none());
    }

    #[test]
    fn dangerous_names_are_not_builtins() {
        for name in ["open", "eval", "exec", "__import__", "compile", "input", "globals"] {
            assert!(Builtin::from_name(name).is_none(), "{name} must not resolve");
        }
    }

    #[test]
    fn rounding_is_bankers() {
        assert!(matches!(round(&Value::Float(2.5), None), Ok(Value::Int(2))));
        assert!(matches!(round(&Value::Float(3.5), None), Ok(Value::Int(4))));
        assert!(matches!(round(&Value::Int(1250), Some(-2)), Ok(Value::Int(1200))));
        let Ok(Value::Float(f)) = round(&Value::Float(3.14159), Some(2)) else {
            panic!("expected float");
        };
        assert!((f - 3.14).abs() < 1e-12);
    }

    #[test]
    fn arity_messages() {
        let err = expect_args("abs", &[], 1, 1).unwrap_err();
        assert_eq!(err.to_string(), "abs() takes exactly 1 argument (0 given)");
        let err = expect_args("range", &vec![Value::None; 4], 1, 3).unwrap_err();
        assert_eq!(err.to_string(), "range() takes at most 3 arguments (4 given)");
    }
}
