//! C9: the standard built-in function table, installed into a fresh
//! [`Environment`](crate::environment::Environment) by [`install`].
//!
//! Every built-in here follows the same contract: wrong arity or wrong
//! argument types return `Null` rather than raising a runtime error — the
//! sole exception is `panic`, which is the built-in's entire purpose.

pub mod collections;
pub mod io;
pub mod numeric;
pub mod regex;
pub mod strings;
pub mod time;

use crate::environment::Environment;
use regex::RegexCache;
use std::cell::RefCell;
use std::rc::Rc;

/// Registers every built-in into `env`. `regex_cache` is shared with the
/// VM's `MATCHES`/`NOT_MATCHES` opcode handlers so a pattern compiled via
/// `match(...)` and one compiled via `~=` never diverge.
pub fn install(env: &mut Environment, regex_cache: Rc<RefCell<RegexCache>>) {
    macro_rules! register {
        ($name:literal, $f:path) => {
            env.register_builtin($name, Rc::new($f))
        };
    }

    register!("len", strings::len);
    register!("lower", strings::lower);
    register!("upper", strings::upper);
    register!("trim", strings::trim);
    register!("split", strings::split);
    register!("join", strings::join);
    register!("string", strings::string);
    register!("type", strings::type_of);
    register!("sprintf", strings::sprintf);

    register!("int", numeric::int);
    register!("float", numeric::float);
    register!("min", numeric::min);
    register!("max", numeric::max);
    register!("between", numeric::between);

    register!("keys", collections::keys);
    register!("sort", collections::sort);
    register!("reverse", collections::reverse);

    register!("now", time::now);
    register!("hour", time::hour);
    register!("minute", time::minute);
    register!("seconds", time::seconds);
    register!("day", time::day);
    register!("month", time::month);
    register!("year", time::year);
    register!("weekday", time::weekday);

    register!("print", io::print);
    register!("printf", io::printf);
    register!("getenv", io::getenv);
    register!("panic", io::panic);

    env.register_builtin(
        "match",
        Rc::new(move |args| io::regex_match(args, &mut regex_cache.borrow_mut())),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn install_registers_every_builtin() {
        let mut env = Environment::new();
        install(&mut env, Rc::new(RefCell::new(RegexCache::new())));
        for name in ["len", "sort", "now", "print", "match", "panic", "getenv"] {
            assert!(env.has_builtin(name), "missing builtin {name}");
        }
    }

    #[test]
    fn match_builtin_shares_cache_across_calls() {
        let mut env = Environment::new();
        install(&mut env, Rc::new(RefCell::new(RegexCache::new())));
        let f = env.builtin("match").unwrap().clone();
        let r1 = f(&[Value::string("hello"), Value::string("l+")]);
        let r2 = f(&[Value::string("hello"), Value::string("l+")]);
        assert_eq!(r1, Ok(Value::Boolean(true)));
        assert_eq!(r2, Ok(Value::Boolean(true)));
    }
}
