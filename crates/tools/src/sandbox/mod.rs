//! A small, explicitly whitelisted evaluator for Python-flavoured
//! arithmetic snippets.
//!
//! Programs come from model output and are untrusted. The language has no
//! loops, no function definitions, no I/O and a single importable module
//! (`math`). Work is bounded by a step budget, which also pays for every
//! value built or copied, a cap on collection sizes and an optional
//! deadline checked from inside the evaluator.

mod builtins;
mod interp;
mod lexer;
mod parser;
mod value;

use std::time::Instant;

pub use interp::Outcome;
pub use value::Value;

/// Resource limits for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: u64,
    pub max_collection_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_collection_len: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SandboxError {
    #[error("invalid syntax: {0}")]
    Syntax(String),

    #[error("{0}")]
    Runtime(String),

    #[error("import of module '{0}' is not allowed")]
    ForbiddenImport(String),

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    #[error("result too large (limit {0} elements)")]
    TooLarge(usize),

    #[error("evaluation exceeded its time limit")]
    Deadline,

    #[error("code produced no output and has no value")]
    NoValue,
}

/// Parse and run `source`, giving up with [`SandboxError::Deadline`] once
/// `deadline` has passed.
pub fn run(source: &str, limits: Limits, deadline: Option<Instant>) -> Result<Outcome, SandboxError> {
    let tokens = lexer::tokenize(source)?;
    let program = parser::parse(&tokens)?;
    interp::Interpreter::new(limits, deadline).run(&program)
}

/// Run `source` and reduce the outcome to the text a caller sees.
///
/// Printed output wins over the value of the last expression.
pub fn evaluate(source: &str, limits: Limits) -> Result<String, SandboxError> {
    evaluate_until(source, limits, None)
}

/// [`evaluate`] with a wall-clock deadline.
pub fn evaluate_until(
    source: &str,
    limits: Limits,
    deadline: Option<Instant>,
) -> Result<String, SandboxError> {
    let outcome = run(source, limits, deadline)?;
    if !outcome.output.is_empty() {
        return Ok(outcome.output.trim_end_matches('\n').to_string());
    }
    outcome
        .value
        .map(|v| v.to_string())
        .ok_or(SandboxError::NoValue)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str) -> Result<String, SandboxError> {
        evaluate(src, Limits::default())
    }

    fn ok(src: &str) -> String {
        eval(src).unwrap_or_else(|e| panic!("{src:?} failed: {e}"))
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(ok("2+2"), "4");
        assert_eq!(ok("2 + 3 * 4"), "14");
        assert_eq!(ok("(2 + 3) * 4"), "20");
        assert_eq!(ok("2 ** 10"), "1024");
        assert_eq!(ok("-2 ** 2"), "-4");
        assert_eq!(ok("2 ** -1"), "0.5");
        assert_eq!(ok("17 // 5"), "3");
        assert_eq!(ok("17 % 5"), "2");
    }

    #[test]
    fn true_division_is_float() {
        assert_eq!(ok("10 / 4"), "2.5");
        assert_eq!(ok("8 / 2"), "4.0");
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(eval("1/0").unwrap_err().to_string(), "division by zero");
        assert!(eval("1 // 0").is_err());
        assert!(eval("1.5 % 0").is_err());
    }

    #[test]
    fn math_module_without_import() {
        assert_eq!(ok("math.sqrt(16)"), "4.0");
        assert_eq!(ok("math.floor(2.7)"), "2");
        assert_eq!(ok("math.factorial(5)"), "120");
        assert_eq!(ok("math.gcd(12, 18)"), "6");
        assert_eq!(ok("round(math.pi, 2)"), "3.14");
    }

    #[test]
    fn import_math_is_accepted() {
        assert_eq!(ok("import math\nmath.ceil(1.2)"), "2");
    }

    #[test]
    fn other_imports_are_rejected() {
        assert_eq!(
            eval("import os").unwrap_err(),
            SandboxError::ForbiddenImport("os".into())
        );
        assert!(eval("__import__('os')").is_err());
        assert!(eval("open('/etc/passwd')").is_err());
        assert!(eval("math.__dict__").is_err());
    }

    #[test]
    fn math_domain_error() {
        assert_eq!(
            eval("math.sqrt(-1)").unwrap_err().to_string(),
            "math domain error"
        );
        assert!(eval("math.log(0)").is_err());
    }

    #[test]
    fn statements_and_variables() {
        assert_eq!(ok("x = 5; y = x * 2; y + 1"), "11");
        assert_eq!(ok("total = 0\ntotal += 10\ntotal -= 3\ntotal"), "7");
        assert_eq!(ok("xs = [1, 2, 3]\nxs[0] = 10\nxs"), "[10, 2, 3]");
        assert_eq!(ok("d = {}\nd['a'] = 1\nd"), "{'a': 1}");
    }

    #[test]
    fn undefined_name() {
        assert_eq!(
            eval("y + 1").unwrap_err().to_string(),
            "name 'y' is not defined"
        );
    }

    #[test]
    fn print_output_wins_over_value() {
        assert_eq!(ok("print('hello')"), "hello");
        assert_eq!(ok("print(1, 2)\nprint(3)\n42"), "1 2\n3");
        assert_eq!(ok("print(True, None, 1.0)"), "True None 1.0");
    }

    #[test]
    fn statement_without_value_is_an_error() {
        assert_eq!(eval("x = 5").unwrap_err(), SandboxError::NoValue);
        assert_eq!(eval("").unwrap_err(), SandboxError::NoValue);
    }

    #[test]
    fn builtins() {
        assert_eq!(ok("abs(-3)"), "3");
        assert_eq!(ok("min(4, 2, 8)"), "2");
        assert_eq!(ok("max([4, 2, 8])"), "8");
        assert_eq!(ok("sum([1, 2, 3])"), "6");
        assert_eq!(ok("sum(range(101))"), "5050");
        assert_eq!(ok("len('hello')"), "5");
        assert_eq!(ok("list(range(3))"), "[0, 1, 2]");
        assert_eq!(ok("range(5)"), "range(0, 5)");
        assert_eq!(ok("int('42') + 1"), "43");
        assert_eq!(ok("float('2.5') * 2"), "5.0");
        assert_eq!(ok("str(12) + 'px'"), "12px");
        assert_eq!(ok("bool(0)"), "False");
        assert_eq!(ok("dict([['a', 1], ['b', 2]])"), "{'a': 1, 'b': 2}");
        assert_eq!(ok("round(2.5)"), "2");
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(ok("1 < 2 < 3"), "True");
        assert_eq!(ok("1 < 3 < 2"), "False");
        assert_eq!(ok("3 in [1, 2, 3]"), "True");
        assert_eq!(ok("'x' not in 'abc'"), "True");
        assert_eq!(ok("0 or 'default'"), "default");
        assert_eq!(ok("not 1 == 1"), "False");
        assert_eq!(ok("'big' if 10 > 5 else 'small'"), "big");
    }

    #[test]
    fn comprehensions() {
        assert_eq!(ok("[x * x for x in range(5)]"), "[0, 1, 4, 9, 16]");
        assert_eq!(ok("sum([x for x in range(10) if x % 2 == 0])"), "20");
        assert_eq!(ok("x = 'kept'\n[x for x in [1]]\nx"), "kept");
    }

    #[test]
    fn strings() {
        assert_eq!(ok("'ab' * 3"), "ababab");
        assert_eq!(ok("'hello'[-1]"), "o");
        assert_eq!(ok("['a', \"it's\"]"), "['a', \"it's\"]");
    }

    #[test]
    fn step_budget_stops_runaway_work() {
        let limits = Limits {
            max_steps: 1_000,
            max_collection_len: 1_000_000,
        };
        assert_eq!(
            evaluate("sum(range(100000))", limits).unwrap_err(),
            SandboxError::StepLimit(1_000)
        );
    }

    #[test]
    fn many_large_values_exhaust_the_budget() {
        let src = "xs = ['x' * 100000 for i in range(3000)]\nsum([len(s) for s in xs])";
        assert!(matches!(
            eval(src),
            Err(SandboxError::StepLimit(_) | SandboxError::TooLarge(_))
        ));
        assert!(matches!(
            eval("big = list(range(100000))\n[big for i in range(1000)]"),
            Err(SandboxError::StepLimit(_))
        ));
        assert_eq!(ok("len(['x' * 1000 for i in range(100)])"), "100");
    }

    #[test]
    fn deadline_stops_evaluation_from_inside() {
        let limits = Limits {
            max_steps: u64::MAX,
            max_collection_len: 100_000,
        };
        let src = "[sum([j for j in range(100000)]) for i in range(100000)]";
        let started = std::time::Instant::now();
        let deadline = started + std::time::Duration::from_millis(50);
        assert_eq!(
            evaluate_until(src, limits, Some(deadline)).unwrap_err(),
            SandboxError::Deadline
        );
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn passed_deadline_does_not_affect_short_programs() {
        let deadline = std::time::Instant::now();
        assert_eq!(
            evaluate_until("2 + 2", Limits::default(), Some(deadline)).unwrap(),
            "4"
        );
    }

    #[test]
    fn collection_cap_stops_huge_values() {
        assert!(matches!(
            eval("list(range(10 ** 9))"),
            Err(SandboxError::TooLarge(_))
        ));
        assert!(matches!(eval("'x' * 10 ** 9"), Err(SandboxError::TooLarge(_))));
        assert!(matches!(eval("[0] * 10 ** 9"), Err(SandboxError::TooLarge(_))));
    }

    #[test]
    fn overflow_reports_instead_of_wrapping() {
        assert_eq!(
            eval("9223372036854775807 + 1").unwrap_err().to_string(),
            "integer overflow"
        );
        assert!(eval("2 ** 64").is_err());
    }

    #[test]
    fn syntax_error_message() {
        let err = eval("2 +").unwrap_err();
        assert!(err.to_string().starts_with("invalid syntax"));
    }
}
