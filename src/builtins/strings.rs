//! C9 string built-ins: `len`, `lower`, `upper`, `trim`, `split`, `join`,
//! `string`, `sprintf`, `type`.

use crate::error::RuntimeErrorKind;
use crate::value::Value;

type VResult = Result<Value, RuntimeErrorKind>;

/// `len` on a non-array/non-hash coerces to its string rendering and
/// returns the Unicode rune count.
pub fn len(args: &[Value]) -> VResult {
    let [v] = args else { return Ok(Value::Null) };
    Ok(Value::Integer(match v {
        Value::Array(items) => items.borrow().len() as i64,
        Value::Hash(map) => map.borrow().len() as i64,
        Value::String(s) => s.chars().count() as i64,
        other => other.to_host_neutral().chars().count() as i64,
    }))
}

pub fn lower(args: &[Value]) -> VResult {
    match args {
        [Value::String(s)] => Ok(Value::string(s.to_lowercase())),
        _ => Ok(Value::Null),
    }
}

pub fn upper(args: &[Value]) -> VResult {
    match args {
        [Value::String(s)] => Ok(Value::string(s.to_uppercase())),
        _ => Ok(Value::Null),
    }
}

pub fn trim(args: &[Value]) -> VResult {
    match args {
        [Value::String(s)] => Ok(Value::string(s.trim().to_string())),
        _ => Ok(Value::Null),
    }
}

pub fn split(args: &[Value]) -> VResult {
    match args {
        [Value::String(s), Value::String(sep)] => {
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::string(c.to_string())).collect()
            } else {
                s.split(sep.as_ref()).map(|p| Value::string(p.to_string())).collect()
            };
            Ok(Value::array(parts))
        }
        _ => Ok(Value::Null),
    }
}

pub fn join(args: &[Value]) -> VResult {
    match args {
        [Value::Array(items), Value::String(sep)] => {
            let rendered: Vec<String> = items.borrow().iter().map(|v| v.to_host_neutral()).collect();
            Ok(Value::string(rendered.join(sep)))
        }
        _ => Ok(Value::Null),
    }
}

pub fn string(args: &[Value]) -> VResult {
    match args {
        [v] => Ok(Value::string(v.to_host_neutral())),
        _ => Ok(Value::Null),
    }
}

pub fn type_of(args: &[Value]) -> VResult {
    match args {
        [v] => Ok(Value::string(v.type_tag())),
        _ => Ok(Value::Null),
    }
}

/// Minimal `printf`-family formatter covering `%s`, `%d`, `%f`, `%%`, used
/// by both `sprintf` and `printf`.
pub fn format(fmt: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    let mut arg_idx = 0;
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                if let Some(v) = args.get(arg_idx) {
                    out.push_str(&v.to_host_neutral());
                }
                arg_idx += 1;
            }
            Some('d') => {
                if let Some(v) = args.get(arg_idx) {
                    out.push_str(&v.as_i64().unwrap_or(0).to_string());
                }
                arg_idx += 1;
            }
            Some('f') => {
                if let Some(v) = args.get(arg_idx) {
                    out.push_str(&format!("{:.6}", v.as_f64().unwrap_or(0.0)));
                }
                arg_idx += 1;
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

pub fn sprintf(args: &[Value]) -> VResult {
    match args.split_first() {
        Some((Value::String(fmt), rest)) => Ok(Value::string(format(fmt, rest))),
        _ => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_counts_runes_not_bytes() {
        assert_eq!(len(&[Value::string("héllo")]), Ok(Value::Integer(5)));
    }

    #[test]
    fn len_on_integer_coerces_to_string() {
        assert_eq!(len(&[Value::Integer(-42)]), Ok(Value::Integer(3)));
    }

    #[test]
    fn split_and_join_round_trip() {
        let parts = split(&[Value::string("a,b,c"), Value::string(",")]).unwrap();
        assert_eq!(join(&[parts, Value::string("-")]), Ok(Value::string("a-b-c")));
    }

    #[test]
    fn sprintf_formats_mixed_args() {
        let out = sprintf(&[Value::string("%s=%d"), Value::string("n"), Value::Integer(7)]).unwrap();
        assert_eq!(out, Value::string("n=7"));
    }
}
