//! C1: the polymorphic value system threaded through every stage.
//!
//! Mirrors the query-engine's `Value` enum (`commands/query_engine/value.rs`)
//! but widened to a six-plus-heap variant algebra, with `Array`/`Hash` as
//! reference-counted cells — no GC needed, cycles are unconstructible
//! because values are moved on insert and there is no mutable reference
//! aliasing other than indexed writes.

mod hashkey;

pub use hashkey::HashKey;

use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A compiled, cached regular expression literal: pattern text plus flags.
#[derive(Debug, Clone)]
pub struct RegexpValue {
    pub pattern: String,
    pub flags: String,
}

impl PartialEq for RegexpValue {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.flags == other.flags
    }
}

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type HashRef = Rc<RefCell<IndexMap<HashKey, Value>>>;

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Boolean(bool),
    Null,
    Void,
    Array(ArrayRef),
    Hash(HashRef),
    Regexp(Rc<RegexpValue>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn hash(map: IndexMap<HashKey, Value>) -> Self {
        Value::Hash(Rc::new(RefCell::new(map)))
    }

    pub fn regexp(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Value::Regexp(Rc::new(RegexpValue { pattern: pattern.into(), flags: flags.into() }))
    }

    /// The string token surfaced by the `type` built-in.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Boolean(_) => "bool",
            Value::Null => "null",
            Value::Void => "void",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
            Value::Regexp(_) => "regexp",
        }
    }

    /// Canonical string rendering, used for printing and for cross-variant
    /// equality/ordering fallback.
    pub fn inspect(&self) -> String {
        match self {
            Value::Integer(n) => n.to_string(),
            Value::Float(n) => format_float(*n),
            Value::String(s) => s.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::Void => "".to_string(),
            Value::Array(items) => {
                let items = items.borrow();
                let rendered: Vec<String> = items.iter().map(|v| v.inspect_nested()).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Hash(map) => {
                let map = map.borrow();
                let rendered: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.inspect(), v.inspect_nested()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Regexp(r) => format!("/{}/{}", r.pattern, r.flags),
        }
    }

    fn inspect_nested(&self) -> String {
        match self {
            Value::String(s) => format!("{:?}", s.as_ref()),
            other => other.inspect(),
        }
    }

    /// Truthiness algebra: false, null, void, zero, empty string, empty
    /// array/hash are false; everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null | Value::Void => false,
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.borrow().is_empty(),
            Value::Hash(map) => !map.borrow().is_empty(),
            Value::Regexp(_) => true,
        }
    }

    /// JSON projection; regexp values have none.
    pub fn json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Integer(n) => Some(serde_json::Value::from(*n)),
            Value::Float(n) => serde_json::Number::from_f64(*n).map(serde_json::Value::Number),
            Value::String(s) => Some(serde_json::Value::String(s.to_string())),
            Value::Boolean(b) => Some(serde_json::Value::Bool(*b)),
            Value::Null => Some(serde_json::Value::Null),
            Value::Void => None,
            Value::Array(items) => {
                let items = items.borrow();
                let mut out = Vec::with_capacity(items.len());
                for v in items.iter() {
                    out.push(v.json()?);
                }
                Some(serde_json::Value::Array(out))
            }
            Value::Hash(map) => {
                let map = map.borrow();
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map.iter() {
                    out.insert(k.inspect(), v.json()?);
                }
                Some(serde_json::Value::Object(out))
            }
            Value::Regexp(_) => None,
        }
    }

    /// Neutral host representation used by formatted-print built-ins
    /// (`print`, `printf`, `sprintf`): same shape as `inspect`, but strings
    /// render without surrounding quotes at the top level.
    pub fn to_host_neutral(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            other => other.inspect(),
        }
    }

    pub fn as_hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey::Integer(*n)),
            Value::String(s) => Some(HashKey::String(s.clone())),
            Value::Boolean(b) => Some(HashKey::Boolean(*b)),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Float(n) => Some(*n as i64),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Void, _) | (_, Void) => false,
            (Null, Null) => true,
            (Null, _) | (_, Null) => false,
            (Integer(_) | Float(_), Integer(_) | Float(_)) => {
                self.as_f64().unwrap() == other.as_f64().unwrap()
            }
            (String(a), String(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Array(a), Array(b)) => *a.borrow() == *b.borrow(),
            (Hash(a), Hash(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Regexp(a), Regexp(b)) => a == b,
            _ => self.inspect() == other.inspect(),
        }
    }
}

fn format_float(n: f64) -> String {
    if n == n.trunc() && n.is_finite() && n.abs() < 1e18 {
        format!("{:.1}", n)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inspect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_matches_spec_table() {
        assert!(!Value::Boolean(false).truthy());
        assert!(!Value::Null.truthy());
        assert!(!Value::Void.truthy());
        assert!(!Value::Integer(0).truthy());
        assert!(!Value::Float(0.0).truthy());
        assert!(!Value::string("").truthy());
        assert!(!Value::array(vec![]).truthy());
        assert!(Value::Integer(1).truthy());
        assert!(Value::string("x").truthy());
    }

    #[test]
    fn numeric_equality_promotes() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert_ne!(Value::Integer(2), Value::Float(2.5));
    }

    #[test]
    fn null_only_equals_null() {
        assert_eq!(Value::Null, Value::Null);
        assert_ne!(Value::Null, Value::Integer(0));
    }

    #[test]
    fn void_never_equal() {
        assert_ne!(Value::Void, Value::Void);
    }

    #[test]
    fn array_aliasing_is_visible_through_clones() {
        let arr = Value::array(vec![Value::Integer(1)]);
        let alias = arr.clone();
        if let Value::Array(cell) = &arr {
            cell.borrow_mut().push(Value::Integer(2));
        }
        if let Value::Array(cell) = &alias {
            assert_eq!(cell.borrow().len(), 2);
        } else {
            panic!("expected array");
        }
    }
}
