//! C9 collection built-ins: `keys`, `sort`, `reverse`.

use crate::error::RuntimeErrorKind;
use crate::value::Value;

type VResult = Result<Value, RuntimeErrorKind>;

/// Hash keys, sorted by their stringified form rather than by
/// insertion order.
pub fn keys(args: &[Value]) -> VResult {
    match args {
        [Value::Hash(map)] => {
            let mut ks: Vec<String> = map.borrow().keys().map(|k| k.inspect()).collect();
            ks.sort();
            Ok(Value::array(ks.into_iter().map(Value::string).collect()))
        }
        _ => Ok(Value::Null),
    }
}

/// Numeric and string pairs use their natural ordering (via `ops::compare`);
/// `case_insensitive` only affects string-to-string comparisons.
fn cmp_values(a: &Value, b: &Value, case_insensitive: bool) -> std::cmp::Ordering {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return if case_insensitive { x.to_lowercase().cmp(&y.to_lowercase()) } else { x.cmp(y) };
    }
    crate::ops::compare(a, b).unwrap_or(std::cmp::Ordering::Equal)
}

pub fn sort(args: &[Value]) -> VResult {
    match args {
        [Value::Array(items)] => {
            let mut v = items.borrow().clone();
            v.sort_by(|a, b| cmp_values(a, b, false));
            Ok(Value::array(v))
        }
        [Value::Array(items), ci] => {
            let case_insensitive = ci.truthy();
            let mut v = items.borrow().clone();
            v.sort_by(|a, b| cmp_values(a, b, case_insensitive));
            Ok(Value::array(v))
        }
        _ => Ok(Value::Null),
    }
}

pub fn reverse(args: &[Value]) -> VResult {
    match args {
        [Value::Array(items)] => {
            let mut v = items.borrow().clone();
            v.reverse();
            Ok(Value::array(v))
        }
        [Value::Array(items), _ci] => {
            let mut v = items.borrow().clone();
            v.reverse();
            Ok(Value::array(v))
        }
        _ => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HashKey;
    use indexmap::IndexMap;

    #[test]
    fn sort_integers() {
        let arr = Value::array(vec![Value::Integer(3), Value::Integer(1), Value::Integer(2)]);
        let sorted = sort(&[arr]).unwrap();
        assert_eq!(
            sorted,
            Value::array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
    }

    #[test]
    fn keys_sorted_by_stringified_form() {
        let mut map = IndexMap::new();
        map.insert(HashKey::String("b".into()), Value::Integer(1));
        map.insert(HashKey::String("a".into()), Value::Integer(2));
        let result = keys(&[Value::hash(map)]).unwrap();
        assert_eq!(result, Value::array(vec![Value::string("a"), Value::string("b")]));
    }

    #[test]
    fn reverse_preserves_elements() {
        let arr = Value::array(vec![Value::Integer(1), Value::Integer(2)]);
        let reversed = reverse(&[arr]).unwrap();
        assert_eq!(reversed, Value::array(vec![Value::Integer(2), Value::Integer(1)]));
    }
}
