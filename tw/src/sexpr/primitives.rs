//! Applicative primitives: arithmetic, comparison, list operations

use crate::domain::{FailureReason, TaskError};

use super::value::Value;

const PRIMITIVES: &[&str] = &["+", "-", "*", "=", "<", ">", "list", "first", "rest", "len"];

pub fn is_primitive(name: &str) -> bool {
    PRIMITIVES.contains(&name)
}

fn invalid(message: impl Into<String>) -> TaskError {
    TaskError::failure(FailureReason::InvalidInput, message)
}

fn as_number(value: &Value, op: &str) -> Result<f64, TaskError> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(x) => Ok(*x),
        other => Err(invalid(format!("'{}' expects numbers, got {}", op, other.type_name()))),
    }
}

fn all_ints(args: &[Value]) -> bool {
    args.iter().all(|v| matches!(v, Value::Int(_)))
}

fn numeric_fold(op: &str, args: &[Value], f: impl Fn(f64, f64) -> f64) -> Result<Value, TaskError> {
    if args.is_empty() {
        return Err(invalid(format!("'{}' needs at least one argument", op)));
    }
    let mut acc = as_number(&args[0], op)?;
    for arg in &args[1..] {
        acc = f(acc, as_number(arg, op)?);
    }
    if all_ints(args) {
        Ok(Value::Int(acc as i64))
    } else {
        Ok(Value::Float(acc))
    }
}

fn chain_compare(op: &str, args: &[Value], f: impl Fn(f64, f64) -> bool) -> Result<Value, TaskError> {
    if args.len() < 2 {
        return Err(invalid(format!("'{}' needs at least two arguments", op)));
    }
    for pair in args.windows(2) {
        if !f(as_number(&pair[0], op)?, as_number(&pair[1], op)?) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

/// Apply a primitive to already evaluated arguments
pub fn apply(name: &str, args: Vec<Value>) -> Result<Value, TaskError> {
    match name {
        "+" => numeric_fold("+", &args, |a, b| a + b),
        "*" => numeric_fold("*", &args, |a, b| a * b),
        "-" => {
            if args.len() == 1 {
                // Unary negation
                match &args[0] {
                    Value::Int(n) => Ok(Value::Int(-n)),
                    Value::Float(x) => Ok(Value::Float(-x)),
                    other => Err(invalid(format!("'-' expects numbers, got {}", other.type_name()))),
                }
            } else {
                numeric_fold("-", &args, |a, b| a - b)
            }
        }
        "=" => {
            if args.len() < 2 {
                return Err(invalid("'=' needs at least two arguments"));
            }
            Ok(Value::Bool(args.windows(2).all(|pair| pair[0] == pair[1])))
        }
        "<" => chain_compare("<", &args, |a, b| a < b),
        ">" => chain_compare(">", &args, |a, b| a > b),
        "list" => Ok(Value::List(args)),
        "first" => match args.as_slice() {
            [Value::List(items)] => Ok(items.first().cloned().unwrap_or(Value::Nil)),
            [other] => Err(invalid(format!("'first' expects a list, got {}", other.type_name()))),
            _ => Err(invalid("'first' takes exactly one argument")),
        },
        "rest" => match args.as_slice() {
            [Value::List(items)] => Ok(Value::List(items.iter().skip(1).cloned().collect())),
            [other] => Err(invalid(format!("'rest' expects a list, got {}", other.type_name()))),
            _ => Err(invalid("'rest' takes exactly one argument")),
        },
        "len" => match args.as_slice() {
            [Value::List(items)] => Ok(Value::Int(items.len() as i64)),
            [Value::Str(s)] => Ok(Value::Int(s.chars().count() as i64)),
            [other] => Err(invalid(format!("'len' expects a list or string, got {}", other.type_name()))),
            _ => Err(invalid("'len' takes exactly one argument")),
        },
        _ => Err(invalid(format!("unknown primitive '{}'", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_keeps_ints() {
        assert_eq!(apply("+", vec![Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(3));
        assert_eq!(apply("-", vec![Value::Int(5), Value::Int(2)]).unwrap(), Value::Int(3));
        assert_eq!(apply("*", vec![Value::Int(3), Value::Int(4)]).unwrap(), Value::Int(12));
    }

    #[test]
    fn test_arithmetic_promotes_floats() {
        assert_eq!(apply("+", vec![Value::Int(1), Value::Float(0.5)]).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_unary_minus_negates() {
        assert_eq!(apply("-", vec![Value::Int(7)]).unwrap(), Value::Int(-7));
    }

    #[test]
    fn test_comparisons_chain() {
        assert_eq!(apply("<", vec![Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap(), Value::Bool(true));
        assert_eq!(apply("<", vec![Value::Int(1), Value::Int(3), Value::Int(2)]).unwrap(), Value::Bool(false));
        assert_eq!(apply(">", vec![Value::Int(3), Value::Int(1)]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_equality_mixes_numeric_types() {
        assert_eq!(apply("=", vec![Value::Int(2), Value::Float(2.0)]).unwrap(), Value::Bool(true));
        assert_eq!(
            apply("=", vec![Value::Str("a".into()), Value::Str("a".into())]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_list_ops() {
        let list = apply("list", vec![Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(apply("first", vec![list.clone()]).unwrap(), Value::Int(1));
        assert_eq!(apply("rest", vec![list.clone()]).unwrap(), Value::List(vec![Value::Int(2)]));
        assert_eq!(apply("len", vec![list]).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_first_of_empty_list_is_nil() {
        assert_eq!(apply("first", vec![Value::List(vec![])]).unwrap(), Value::Nil);
        assert_eq!(apply("rest", vec![Value::List(vec![])]).unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_len_of_string() {
        assert_eq!(apply("len", vec![Value::Str("abc".into())]).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_type_errors_are_failures() {
        assert!(apply("+", vec![Value::Str("x".into())]).is_err());
        assert!(apply("first", vec![Value::Int(1)]).is_err());
        assert!(apply("<", vec![Value::Int(1)]).is_err());
    }
}
