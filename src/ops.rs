//! Pure `Value` arithmetic, comparison and membership operations shared by
//! the optimizer's constant-folding pass and the VM's opcode dispatch.
//!
//! Mirrors the free-standing `operations.rs` (`commands/query_engine/operations.rs`):
//! a flat module of pure functions over the value type, no state, callable
//! from anywhere that holds two `Value`s.

use crate::error::RuntimeErrorKind;
use crate::value::Value;
use std::cmp::Ordering;

type VResult = Result<Value, RuntimeErrorKind>;

fn type_mismatch(op: &str, a: &Value, b: &Value) -> RuntimeErrorKind {
    RuntimeErrorKind::TypeMismatch(format!("cannot {op} {} and {}", a.type_tag(), b.type_tag()))
}

/// Numeric promotion: both integers stay integer arithmetic; any float
/// operand promotes both to float.
enum Numeric {
    Int(i64),
    Float(f64),
}

fn promote(a: &Value, b: &Value) -> Option<(Numeric, Numeric)> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some((Numeric::Int(*x), Numeric::Int(*y))),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            Some((Numeric::Float(a.as_f64()?), Numeric::Float(b.as_f64()?)))
        }
        _ => None,
    }
}

pub fn add(a: &Value, b: &Value) -> VResult {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(Value::string(format!("{x}{y}")));
    }
    match promote(a, b) {
        Some((Numeric::Int(x), Numeric::Int(y))) => Ok(Value::Integer(x.wrapping_add(y))),
        Some((Numeric::Float(x), Numeric::Float(y))) => Ok(Value::Float(x + y)),
        _ => Err(type_mismatch("add", a, b)),
    }
}

pub fn sub(a: &Value, b: &Value) -> VResult {
    match promote(a, b) {
        Some((Numeric::Int(x), Numeric::Int(y))) => Ok(Value::Integer(x.wrapping_sub(y))),
        Some((Numeric::Float(x), Numeric::Float(y))) => Ok(Value::Float(x - y)),
        _ => Err(type_mismatch("subtract", a, b)),
    }
}

pub fn mul(a: &Value, b: &Value) -> VResult {
    match promote(a, b) {
        Some((Numeric::Int(x), Numeric::Int(y))) => Ok(Value::Integer(x.wrapping_mul(y))),
        Some((Numeric::Float(x), Numeric::Float(y))) => Ok(Value::Float(x * y)),
        _ => Err(type_mismatch("multiply", a, b)),
    }
}

pub fn div(a: &Value, b: &Value) -> VResult {
    match promote(a, b) {
        Some((Numeric::Int(x), Numeric::Int(y))) => {
            if y == 0 {
                Err(RuntimeErrorKind::DivideByZero)
            } else {
                Ok(Value::Integer(x.wrapping_div(y)))
            }
        }
        Some((Numeric::Float(x), Numeric::Float(y))) => {
            if y == 0.0 {
                Err(RuntimeErrorKind::DivideByZero)
            } else {
                Ok(Value::Float(x / y))
            }
        }
        _ => Err(type_mismatch("divide", a, b)),
    }
}

pub fn rem(a: &Value, b: &Value) -> VResult {
    match promote(a, b) {
        Some((Numeric::Int(x), Numeric::Int(y))) => {
            if y == 0 {
                Err(RuntimeErrorKind::DivideByZero)
            } else {
                Ok(Value::Integer(x.wrapping_rem(y)))
            }
        }
        Some((Numeric::Float(x), Numeric::Float(y))) => {
            if y == 0.0 {
                Err(RuntimeErrorKind::DivideByZero)
            } else {
                Ok(Value::Float(x % y))
            }
        }
        _ => Err(type_mismatch("take the modulus of", a, b)),
    }
}

pub fn pow(a: &Value, b: &Value) -> VResult {
    match promote(a, b) {
        Some((Numeric::Int(x), Numeric::Int(y))) if y >= 0 => {
            Ok(Value::Integer(x.wrapping_pow(y as u32)))
        }
        Some((Numeric::Int(x), Numeric::Int(y))) => Ok(Value::Float((x as f64).powf(y as f64))),
        Some((Numeric::Float(x), Numeric::Float(y))) => Ok(Value::Float(x.powf(y))),
        _ => Err(type_mismatch("raise", a, b)),
    }
}

pub fn root(a: &Value) -> VResult {
    match a.as_f64() {
        Some(n) => Ok(Value::Float(n.sqrt())),
        None => Err(RuntimeErrorKind::TypeMismatch(format!("cannot take the root of {}", a.type_tag()))),
    }
}

pub fn neg(a: &Value) -> VResult {
    match a {
        Value::Integer(n) => Ok(Value::Integer(n.wrapping_neg())),
        Value::Float(n) => Ok(Value::Float(-n)),
        _ => Err(RuntimeErrorKind::TypeMismatch(format!("cannot negate {}", a.type_tag()))),
    }
}

pub fn not(a: &Value) -> Value {
    Value::Boolean(!a.truthy())
}

pub fn eq(a: &Value, b: &Value) -> VResult {
    if a.is_void() || b.is_void() {
        return Err(RuntimeErrorKind::TypeMismatch("cannot compare void for equality".to_string()));
    }
    Ok(Value::Boolean(a == b))
}

pub fn ne(a: &Value, b: &Value) -> VResult {
    eq(a, b).map(|v| Value::Boolean(!v.truthy()))
}

/// Ordering is defined only for Integer/Float pairs and String pairs.
pub fn compare(a: &Value, b: &Value) -> Result<Ordering, RuntimeErrorKind> {
    match promote(a, b) {
        Some((Numeric::Int(x), Numeric::Int(y))) => Ok(x.cmp(&y)),
        Some((Numeric::Float(x), Numeric::Float(y))) => {
            x.partial_cmp(&y).ok_or_else(|| RuntimeErrorKind::TypeMismatch("unorderable float (NaN)".to_string()))
        }
        _ => match (a, b) {
            (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
            _ => Err(RuntimeErrorKind::TypeMismatch(format!(
                "cannot order {} and {}",
                a.type_tag(),
                b.type_tag()
            ))),
        },
    }
}

pub fn lt(a: &Value, b: &Value) -> VResult {
    compare(a, b).map(|o| Value::Boolean(o == Ordering::Less))
}

pub fn le(a: &Value, b: &Value) -> VResult {
    compare(a, b).map(|o| Value::Boolean(o != Ordering::Greater))
}

pub fn gt(a: &Value, b: &Value) -> VResult {
    compare(a, b).map(|o| Value::Boolean(o == Ordering::Greater))
}

pub fn ge(a: &Value, b: &Value) -> VResult {
    compare(a, b).map(|o| Value::Boolean(o != Ordering::Less))
}

/// `a contains b`: substring for strings, element membership for arrays
/// (by value equality), key membership for hashes.
pub fn contains(a: &Value, b: &Value) -> VResult {
    match a {
        Value::String(s) => match b {
            Value::String(needle) => Ok(Value::Boolean(s.contains(needle.as_ref()))),
            _ => Err(type_mismatch("check string containment with", a, b)),
        },
        Value::Array(items) => Ok(Value::Boolean(items.borrow().iter().any(|v| v == b))),
        Value::Hash(map) => match b.as_hash_key() {
            Some(key) => Ok(Value::Boolean(map.borrow().contains_key(&key))),
            None => Ok(Value::Boolean(false)),
        },
        _ => Err(type_mismatch("check containment on", a, b)),
    }
}

pub fn missing(a: &Value, b: &Value) -> VResult {
    contains(a, b).map(|v| Value::Boolean(!v.truthy()))
}

/// `a in b` is containment with the operands swapped relative to `contains`.
pub fn contained_in(a: &Value, b: &Value) -> VResult {
    contains(b, a)
}

pub fn regex_matches(text: &Value, pattern: &Value, cache: &mut crate::builtins::regex::RegexCache) -> VResult {
    let (text, pattern, flags) = match (text, pattern) {
        (Value::String(s), Value::Regexp(r)) => (s.to_string(), r.pattern.clone(), r.flags.clone()),
        (Value::String(s), Value::String(p)) => (s.to_string(), p.to_string(), String::new()),
        _ => return Err(type_mismatch("match", text, pattern)),
    };
    let re = cache.get(&pattern, &flags)?;
    Ok(Value::Boolean(text.lines().any(|line| re.is_match(line))))
}
