//! C9 numeric built-ins: `int`, `float`, `min`, `max`, `between`.

use crate::error::RuntimeErrorKind;
use crate::value::Value;
use std::cmp::Ordering;

type VResult = Result<Value, RuntimeErrorKind>;

pub fn int(args: &[Value]) -> VResult {
    match args {
        [Value::Integer(n)] => Ok(Value::Integer(*n)),
        [Value::Float(n)] => Ok(Value::Integer(*n as i64)),
        [Value::String(s)] => Ok(s.trim().parse::<i64>().map(Value::Integer).unwrap_or(Value::Null)),
        [Value::Boolean(b)] => Ok(Value::Integer(if *b { 1 } else { 0 })),
        _ => Ok(Value::Null),
    }
}

pub fn float(args: &[Value]) -> VResult {
    match args {
        [Value::Integer(n)] => Ok(Value::Float(*n as f64)),
        [Value::Float(n)] => Ok(Value::Float(*n)),
        [Value::String(s)] => Ok(s.trim().parse::<f64>().map(Value::Float).unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

pub fn min(args: &[Value]) -> VResult {
    match args {
        [a, b] => match crate::ops::compare(a, b) {
            Ok(Ordering::Greater) => Ok(b.clone()),
            Ok(_) => Ok(a.clone()),
            Err(_) => Ok(Value::Null),
        },
        _ => Ok(Value::Null),
    }
}

pub fn max(args: &[Value]) -> VResult {
    match args {
        [a, b] => match crate::ops::compare(a, b) {
            Ok(Ordering::Less) => Ok(b.clone()),
            Ok(_) => Ok(a.clone()),
            Err(_) => Ok(Value::Null),
        },
        _ => Ok(Value::Null),
    }
}

/// Closed interval `[lo, hi]`; any non-numeric argument yields `Null`
/// rather than a type error.
pub fn between(args: &[Value]) -> VResult {
    match args {
        [v, lo, hi] => match (v.as_f64(), lo.as_f64(), hi.as_f64()) {
            (Some(v), Some(lo), Some(hi)) => Ok(Value::Boolean(v >= lo && v <= hi)),
            _ => Ok(Value::Null),
        },
        _ => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn between_closed_interval() {
        assert_eq!(between(&[Value::Integer(5), Value::Integer(1), Value::Integer(5)]), Ok(Value::Boolean(true)));
        assert_eq!(between(&[Value::Integer(6), Value::Integer(1), Value::Integer(5)]), Ok(Value::Boolean(false)));
    }

    #[test]
    fn between_non_numeric_is_null() {
        assert_eq!(between(&[Value::string("x"), Value::Integer(1), Value::Integer(5)]), Ok(Value::Null));
    }

    #[test]
    fn int_parses_string() {
        assert_eq!(int(&[Value::string("42")]), Ok(Value::Integer(42)));
        assert_eq!(int(&[Value::string("nope")]), Ok(Value::Null));
    }

    #[test]
    fn min_max_promote_numeric() {
        assert_eq!(min(&[Value::Integer(3), Value::Float(1.5)]), Ok(Value::Float(1.5)));
        assert_eq!(max(&[Value::Integer(3), Value::Float(1.5)]), Ok(Value::Integer(3)));
    }
}
