//! Tree-walking evaluator over [`Expr`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::ast::{BinaryOp, Expr, Function};
use super::env::{Environment, Value};
use crate::error::{FormulaError, FormulaResult};

/// Largest ROUND precision a Decimal supports.
const MAX_ROUND_PLACES: u32 = 28;

/// Evaluates a compiled formula against an environment.
///
/// `IF` evaluates only the selected branch; `AND` / `OR` stop at the first
/// argument that decides the result.
pub fn evaluate(expr: &Expr, env: &Environment) -> FormulaResult<Value> {
    match expr {
        Expr::Number(number) => Ok(Value::Number(*number)),
        Expr::Bool(flag) => Ok(Value::Bool(*flag)),
        Expr::Variable(name) => env.lookup(name),
        Expr::Neg(operand) => Ok(Value::Number(-evaluate(operand, env)?.as_number()?)),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, env)?;
            let rhs = evaluate(rhs, env)?;
            binary(*op, lhs, rhs)
        }
        Expr::Call { function, args } => call(*function, args, env),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> FormulaResult<Value> {
    match op {
        BinaryOp::Eq => equals(lhs, rhs).map(Value::Bool),
        BinaryOp::Neq => equals(lhs, rhs).map(|eq| Value::Bool(!eq)),
        BinaryOp::Add => arithmetic(lhs, rhs, Decimal::checked_add),
        BinaryOp::Sub => arithmetic(lhs, rhs, Decimal::checked_sub),
        BinaryOp::Mul => arithmetic(lhs, rhs, Decimal::checked_mul),
        BinaryOp::Div => {
            if rhs.as_number()?.is_zero() {
                return Err(FormulaError::DivisionByZero);
            }
            arithmetic(lhs, rhs, Decimal::checked_div)
        }
        BinaryOp::Mod => {
            if rhs.as_number()?.is_zero() {
                return Err(FormulaError::DivisionByZero);
            }
            arithmetic(lhs, rhs, Decimal::checked_rem)
        }
        BinaryOp::Gt => compare(lhs, rhs, |a, b| a > b),
        BinaryOp::Lt => compare(lhs, rhs, |a, b| a < b),
        BinaryOp::Geq => compare(lhs, rhs, |a, b| a >= b),
        BinaryOp::Leq => compare(lhs, rhs, |a, b| a <= b),
    }
}

fn arithmetic(
    lhs: Value,
    rhs: Value,
    checked: fn(Decimal, Decimal) -> Option<Decimal>,
) -> FormulaResult<Value> {
    checked(lhs.as_number()?, rhs.as_number()?)
        .map(Value::Number)
        .ok_or(FormulaError::Overflow)
}

fn compare(lhs: Value, rhs: Value, test: fn(Decimal, Decimal) -> bool) -> FormulaResult<Value> {
    Ok(Value::Bool(test(lhs.as_number()?, rhs.as_number()?)))
}

fn equals(lhs: Value, rhs: Value) -> FormulaResult<bool> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (expected, found) => Err(FormulaError::TypeMismatch {
            expected: expected.type_name().to_string(),
            found: found.type_name().to_string(),
        }),
    }
}

fn call(function: Function, args: &[Expr], env: &Environment) -> FormulaResult<Value> {
    match function {
        Function::If => {
            let [condition, then, otherwise] = args else {
                return Err(arity(function, "3", args.len()));
            };
            if evaluate(condition, env)?.is_truthy() {
                evaluate(then, env)
            } else {
                evaluate(otherwise, env)
            }
        }
        Function::And => {
            for arg in args {
                if !evaluate(arg, env)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Function::Or => {
            for arg in args {
                if evaluate(arg, env)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Function::Not => match args {
            [operand] => Ok(Value::Bool(!evaluate(operand, env)?.is_truthy())),
            _ => Err(arity(function, "1", args.len())),
        },
        Function::Min | Function::Max => {
            let mut best: Option<Decimal> = None;
            for arg in args {
                let next = evaluate(arg, env)?.as_number()?;
                best = Some(match best {
                    None => next,
                    Some(best) if function == Function::Min => best.min(next),
                    Some(best) => best.max(next),
                });
            }
            best.map(Value::Number)
                .ok_or_else(|| arity(function, "at least 1", 0))
        }
        Function::Round => {
            let (value, places) = match args {
                [value] => (evaluate(value, env)?.as_number()?, 0),
                [value, places] => (
                    evaluate(value, env)?.as_number()?,
                    round_places(evaluate(places, env)?.as_number()?)?,
                ),
                _ => return Err(arity(function, "1-2", args.len())),
            };
            Ok(Value::Number(value.round_dp_with_strategy(
                places,
                RoundingStrategy::MidpointAwayFromZero,
            )))
        }
        Function::Abs => match args {
            [operand] => Ok(Value::Number(evaluate(operand, env)?.as_number()?.abs())),
            _ => Err(arity(function, "1", args.len())),
        },
    }
}

fn round_places(places: Decimal) -> FormulaResult<u32> {
    places
        .fract()
        .is_zero()
        .then(|| places.to_u32())
        .flatten()
        .filter(|places| *places <= MAX_ROUND_PLACES)
        .ok_or_else(|| FormulaError::TypeMismatch {
            expected: format!("whole number of places between 0 and {}", MAX_ROUND_PLACES),
            found: places.to_string(),
        })
}

fn arity(function: Function, expected: &str, found: usize) -> FormulaError {
    FormulaError::Arity {
        function: function.name().to_string(),
        expected: expected.to_string(),
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ast::compile;
    use crate::DEFAULT_MAX_FORMULA_DEPTH;

    fn d(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    fn eval_with(text: &str, env: &Environment) -> FormulaResult<Value> {
        evaluate(&compile(text, DEFAULT_MAX_FORMULA_DEPTH)?, env)
    }

    fn eval(text: &str) -> FormulaResult<Value> {
        eval_with(text, &Environment::new())
    }

    #[test]
    fn test_arithmetic_is_decimal() {
        assert_eq!(eval("0.1 + 0.2").unwrap(), Value::Number(d("0.3")));
        assert_eq!(eval("2 / 4").unwrap(), Value::Number(d("0.5")));
        assert_eq!(eval("7 % 4").unwrap(), Value::Number(d("3")));
        assert_eq!(eval("-(2 * 3) + 1").unwrap(), Value::Number(d("-5")));
    }

    #[test]
    fn test_two_thirds_keeps_precision() {
        let value = eval("2/3").unwrap().as_number().unwrap();
        assert_eq!(value.round_dp(6), d("0.666667"));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("1 / 0"), Err(FormulaError::DivisionByZero));
        assert_eq!(eval("1 % 0"), Err(FormulaError::DivisionByZero));
    }

    #[test]
    fn test_overflow() {
        let env = {
            let mut env = Environment::new();
            env.bind("big", Decimal::MAX);
            env
        };
        assert_eq!(eval_with("big * 2", &env), Err(FormulaError::Overflow));
        assert_eq!(eval_with("big + big", &env), Err(FormulaError::Overflow));
    }

    #[test]
    fn test_if_is_lazy() {
        // The unselected branch would fail if evaluated.
        assert_eq!(eval("IF(1 > 0, 5, 1 / 0)").unwrap(), Value::Number(d("5")));
        assert_eq!(eval("IF(0, missing, 6)").unwrap(), Value::Number(d("6")));
    }

    #[test]
    fn test_and_or_short_circuit() {
        assert_eq!(eval("AND(0, 1 / 0)").unwrap(), Value::Bool(false));
        assert_eq!(eval("OR(1, missing)").unwrap(), Value::Bool(true));
        assert_eq!(eval("AND(1, 2 > 1, true)").unwrap(), Value::Bool(true));
        assert_eq!(eval("NOT(0)").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 > 2 || 3 > 2").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_min_max_round_abs() {
        assert_eq!(eval("MIN(3, 1, 2)").unwrap(), Value::Number(d("1")));
        assert_eq!(eval("MAX(3, 1, 2)").unwrap(), Value::Number(d("3")));
        assert_eq!(eval("ROUND(2.345, 2)").unwrap(), Value::Number(d("2.35")));
        assert_eq!(eval("ROUND(-2.5)").unwrap(), Value::Number(d("-3")));
        assert_eq!(eval("ABS(-0.25)").unwrap(), Value::Number(d("0.25")));
        assert!(matches!(eval("ROUND(1, 0.5)"), Err(FormulaError::TypeMismatch { .. })));
    }

    #[test]
    fn test_type_mismatch() {
        assert!(matches!(eval("true + 1"), Err(FormulaError::TypeMismatch { .. })));
        assert!(matches!(eval("(1 > 0) == 1"), Err(FormulaError::TypeMismatch { .. })));
        assert_eq!(eval("(1 > 0) == true").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_unknown_variable() {
        assert_eq!(
            eval("subTotal * 0.16"),
            Err(FormulaError::UnknownVariable { name: "subTotal".into() })
        );
    }

    #[test]
    fn test_argentine_scale() {
        let escala = "IF(AND(subTotal>0,subTotal<=5000), 0.05, IF(subTotal<=10000,0.09,IF(subTotal<=15000,0.12,IF(subTotal<=20000,0.15,IF(subTotal<=30000,0.19,IF(subTotal<=40000,0.23,IF(subTotal<=60000,0.27,0.31)))))))";
        let cases = [("1000", "0.05"), ("12000", "0.12"), ("100000", "0.31")];
        for (sub_total, expected) in cases {
            let mut env = Environment::new();
            env.bind("subTotal", d(sub_total));
            assert_eq!(eval_with(escala, &env).unwrap(), Value::Number(d(expected)));
        }
    }
}
