// Expression evaluation against a single table row

use std::cmp::Ordering;

use acstools_table::{Row, Value};

use crate::parser::{too_deep, Expr, Op, MAX_DEPTH};

/// Evaluate an expression for one row.
///
/// Missing values (`Empty`) propagate through arithmetic the way a NaN
/// would, and division by zero yields `Empty` rather than an error.
/// Errors are reserved for things a rule author got wrong: unknown
/// columns or functions, wrong arity, text where a number is required.
pub fn evaluate(expr: &Expr, row: &Row<'_>) -> Result<Value, String> {
    if expr.height() > MAX_DEPTH {
        return Err(too_deep());
    }
    eval_node(expr, row)
}

fn eval_node(expr: &Expr, row: &Row<'_>) -> Result<Value, String> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Text(s) => Ok(Value::Text(s.clone())),
        Expr::Boolean(b) => Ok(Value::Boolean(*b)),
        Expr::Column(name) => row
            .get(name)
            .cloned()
            .ok_or_else(|| format!("unknown column '{}'", name)),
        Expr::Function { name, args } => evaluate_function(name, args, row),
        Expr::BinaryOp { op, left, right } => {
            let left = eval_node(left, row)?;
            let right = eval_node(right, row)?;
            binary_op(*op, &left, &right)
        }
    }
}

fn binary_op(op: Op, left: &Value, right: &Value) -> Result<Value, String> {
    match op {
        Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Pow => {
            let (a, b) = match (left.to_number()?, right.to_number()?) {
                (Some(a), Some(b)) => (a, b),
                _ => return Ok(Value::Empty),
            };
            let n = match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                Op::Div if b == 0.0 => return Ok(Value::Empty),
                Op::Div => a / b,
                _ => a.powf(b),
            };
            Ok(number(n))
        }
        Op::Concat => Ok(Value::Text(format!("{}{}", left.to_text(), right.to_text()))),
        Op::Lt => Ok(Value::Boolean(compare(left, right) == Ordering::Less)),
        Op::Gt => Ok(Value::Boolean(compare(left, right) == Ordering::Greater)),
        Op::Eq => Ok(Value::Boolean(compare(left, right) == Ordering::Equal)),
        Op::LtEq => Ok(Value::Boolean(compare(left, right) != Ordering::Greater)),
        Op::GtEq => Ok(Value::Boolean(compare(left, right) != Ordering::Less)),
        Op::NotEq => Ok(Value::Boolean(compare(left, right) != Ordering::Equal)),
    }
}

/// Numbers (including numeric text) compare numerically; anything else
/// compares as text, case-insensitively.
fn compare(a: &Value, b: &Value) -> Ordering {
    if let (Ok(Some(x)), Ok(Some(y))) = (a.to_number(), b.to_number()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    a.to_text().to_lowercase().cmp(&b.to_text().to_lowercase())
}

/// Non-finite results become missing values.
fn number(n: f64) -> Value {
    if n.is_finite() {
        Value::Number(n)
    } else {
        Value::Empty
    }
}

fn expect_args(name: &str, args: &[Expr], min: usize, max: usize) -> Result<(), String> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(format!("{} expects {} argument(s), got {}", name, expected, args.len()));
    }
    Ok(())
}

fn evaluate_function(name: &str, args: &[Expr], row: &Row<'_>) -> Result<Value, String> {
    match name {
        "IF" => {
            expect_args(name, args, 2, 3)?;
            if eval_node(&args[0], row)?.to_bool()? {
                eval_node(&args[1], row)
            } else if let Some(otherwise) = args.get(2) {
                eval_node(otherwise, row)
            } else {
                Ok(Value::Empty)
            }
        }
        "AND" => {
            expect_args(name, args, 1, usize::MAX)?;
            for arg in args {
                if !eval_node(arg, row)?.to_bool()? {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }
        "OR" => {
            expect_args(name, args, 1, usize::MAX)?;
            for arg in args {
                if eval_node(arg, row)?.to_bool()? {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }
        "NOT" => {
            expect_args(name, args, 1, 1)?;
            Ok(Value::Boolean(!eval_node(&args[0], row)?.to_bool()?))
        }
        "ABS" => {
            expect_args(name, args, 1, 1)?;
            Ok(eval_node(&args[0], row)?.to_number()?.map(|n| number(n.abs())).unwrap_or_default())
        }
        "ROUND" => {
            expect_args(name, args, 1, 2)?;
            let digits = match args.get(1) {
                Some(arg) => eval_node(arg, row)?.to_number()?.unwrap_or(0.0),
                None => 0.0,
            };
            let factor = 10f64.powi(digits as i32);
            Ok(eval_node(&args[0], row)?
                .to_number()?
                .map(|n| number((n * factor).round() / factor))
                .unwrap_or_default())
        }
        "SUM" | "MIN" | "MAX" => {
            expect_args(name, args, 1, usize::MAX)?;
            let mut numbers = Vec::with_capacity(args.len());
            for arg in args {
                if let Some(n) = eval_node(arg, row)?.to_number()? {
                    numbers.push(n);
                }
            }
            if numbers.is_empty() {
                return Ok(if name == "SUM" { Value::Number(0.0) } else { Value::Empty });
            }
            let result = match name {
                "SUM" => numbers.iter().sum(),
                "MIN" => numbers.iter().copied().fold(f64::INFINITY, f64::min),
                _ => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            Ok(number(result))
        }
        "ISBLANK" => {
            expect_args(name, args, 1, 1)?;
            Ok(Value::Boolean(eval_node(&args[0], row)?.is_empty()))
        }
        "COALESCE" => {
            expect_args(name, args, 1, usize::MAX)?;
            for arg in args {
                let value = eval_node(arg, row)?;
                if !value.is_empty() {
                    return Ok(value);
                }
            }
            Ok(Value::Empty)
        }
        "LEN" => {
            expect_args(name, args, 1, 1)?;
            Ok(Value::Number(eval_node(&args[0], row)?.to_text().chars().count() as f64))
        }
        "UPPER" => {
            expect_args(name, args, 1, 1)?;
            Ok(Value::Text(eval_node(&args[0], row)?.to_text().to_uppercase()))
        }
        "LOWER" => {
            expect_args(name, args, 1, 1)?;
            Ok(Value::Text(eval_node(&args[0], row)?.to_text().to_lowercase()))
        }
        "LEFT" | "RIGHT" => {
            expect_args(name, args, 1, 2)?;
            let text = eval_node(&args[0], row)?.to_text();
            let count = match args.get(1) {
                Some(arg) => eval_node(arg, row)?.to_number()?.unwrap_or(0.0),
                None => 1.0,
            };
            if count < 0.0 {
                return Err(format!("{} count must be non-negative", name));
            }
            let count = count as usize;
            let len = text.chars().count();
            let taken: String = if name == "LEFT" {
                text.chars().take(count).collect()
            } else {
                text.chars().skip(len.saturating_sub(count)).collect()
            };
            Ok(Value::Text(taken))
        }
        "CONCAT" => {
            let mut out = String::new();
            for arg in args {
                out.push_str(&eval_node(arg, row)?.to_text());
            }
            Ok(Value::Text(out))
        }
        "NUMBER" => {
            expect_args(name, args, 1, 1)?;
            Ok(eval_node(&args[0], row)?.to_number()?.map(number).unwrap_or_default())
        }
        "TEXT" => {
            expect_args(name, args, 1, 1)?;
            Ok(Value::Text(eval_node(&args[0], row)?.to_text()))
        }
        _ => Err(format!("unknown function {}", name)),
    }
}
