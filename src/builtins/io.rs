//! C9 I/O, environment and diagnostic built-ins: `print`, `printf`,
//! `getenv`, `panic`, `match`.
//!
//! Unlike the rest of the builtin table, a bad call to `panic` is the one
//! path that does not quietly degrade to `Null` — it raises a runtime error,
//! mirroring how the rest of the engine treats `Panic` as terminal.

use crate::builtins::regex::RegexCache;
use crate::error::RuntimeErrorKind;
use crate::value::Value;

type VResult = Result<Value, RuntimeErrorKind>;

pub fn print(args: &[Value]) -> VResult {
    print!("{}", args.iter().map(|v| v.to_host_neutral()).collect::<String>());
    Ok(Value::Void)
}

pub fn printf(args: &[Value]) -> VResult {
    match args.split_first() {
        Some((Value::String(fmt), rest)) => {
            print!("{}", crate::builtins::strings::format(fmt, rest));
            Ok(Value::Void)
        }
        _ => Ok(Value::Void),
    }
}

/// Empty string when the variable is unset, never `Null` — `getenv` always
/// returns a String.
pub fn getenv(args: &[Value]) -> VResult {
    match args {
        [Value::String(name)] => Ok(Value::string(std::env::var(name.as_ref()).unwrap_or_default())),
        _ => Ok(Value::string("")),
    }
}

pub fn panic(args: &[Value]) -> VResult {
    let message = match args {
        [Value::String(s)] => s.to_string(),
        [v] => v.to_host_neutral(),
        _ => String::new(),
    };
    Err(RuntimeErrorKind::Panic(message))
}

pub fn regex_match(args: &[Value], cache: &mut RegexCache) -> VResult {
    match args {
        [text, pattern] => crate::ops::regex_matches(text, pattern, cache),
        _ => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getenv_missing_is_empty_string() {
        std::env::remove_var("FILTERSCRIPT_TEST_VAR_DOES_NOT_EXIST");
        assert_eq!(
            getenv(&[Value::string("FILTERSCRIPT_TEST_VAR_DOES_NOT_EXIST")]),
            Ok(Value::string(""))
        );
    }

    #[test]
    fn panic_raises_with_message() {
        assert_eq!(panic(&[Value::string("boom")]), Err(RuntimeErrorKind::Panic("boom".to_string())));
    }

    #[test]
    fn print_returns_void() {
        assert_eq!(print(&[Value::Integer(1), Value::string("x")]), Ok(Value::Void));
    }

    #[test]
    fn regex_match_via_builtin() {
        let mut cache = RegexCache::new();
        assert_eq!(
            regex_match(&[Value::string("hello"), Value::string("l+")], &mut cache),
            Ok(Value::Boolean(true))
        );
    }
}
