//! Projects an arbitrary host record down to a flat dotted-path → Value
//! mapping.
//!
//! The host record type is left open by design; this crate takes
//! `serde_json::Value` as the concretization, consistent with the
//! `--json PATH` CLI surface and with how the query engine already bridges
//! `serde_json::Value` into its own `Value`
//! (`commands/query_engine/value.rs::from_serde_json`).

use crate::value::{HashKey, Value};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct RecordAdapter {
    record: serde_json::Value,
    flattened: RefCell<Option<HashMap<String, Value>>>,
}

impl RecordAdapter {
    pub fn new(record: serde_json::Value) -> Self {
        Self { record, flattened: RefCell::new(None) }
    }

    pub fn empty() -> Self {
        Self::new(serde_json::Value::Null)
    }

    /// Backs `LOAD_FIELD k`: an unknown path yields `None`, which the VM
    /// surfaces as `Null` plus a recoverable `UnknownField` condition.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.ensure_flattened();
        self.flattened.borrow().as_ref().unwrap().get(path).cloned()
    }

    fn ensure_flattened(&self) {
        if self.flattened.borrow().is_some() {
            return;
        }
        let mut out = HashMap::new();
        flatten("", &self.record, &mut out);
        *self.flattened.borrow_mut() = Some(out);
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

fn flatten(prefix: &str, json: &serde_json::Value, out: &mut HashMap<String, Value>) {
    if !prefix.is_empty() {
        out.insert(prefix.to_string(), value_from_json(json));
    }
    match json {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                flatten(&join(prefix, k), v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(&join(prefix, &i.to_string()), v, out);
            }
        }
        _ => {}
    }
}

/// Converts one JSON node to a `Value`, demoting exactly-integral floats to
/// `Integer`.
fn value_from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f == (f as i64) as f64 {
                    Value::Integer(f as i64)
                } else {
                    Value::Float(f)
                }
            } else {
                Value::Null
            }
        }
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(value_from_json).collect()),
        serde_json::Value::Object(map) => {
            let mut out = IndexMap::new();
            for (k, v) in map {
                out.insert(HashKey::String(k.as_str().into()), value_from_json(v));
            }
            Value::hash(out)
        }
    }
}
