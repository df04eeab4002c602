//! C5: variable bindings, scope stack, and the built-in/host function
//! registry.
//!
//! The bottom scope is always the name-addressed global scope (so the host
//! API in `Engine::set_variable`/`get_variable` can work by name); each
//! function call pushes an index-addressed local scope sized to the
//! function's `local_count`, matching the `LOAD_LOCAL`/`STORE_LOCAL k`
//! opcodes the compiler emits — per-call frames are compiled to direct slot
//! access rather than name lookup, the resolution recorded in DESIGN.md.

use crate::error::RuntimeErrorKind;
use crate::value::Value;
use indexmap::IndexMap;
use std::rc::Rc;

pub type BuiltinFn = Rc<dyn Fn(&[Value]) -> Result<Value, RuntimeErrorKind>>;

enum Scope {
    Global(IndexMap<String, Value>),
    Local(Vec<Value>),
}

pub struct Environment {
    scopes: Vec<Scope>,
    builtins: IndexMap<String, BuiltinFn>,
}

impl Environment {
    pub fn new() -> Self {
        Self { scopes: vec![Scope::Global(IndexMap::new())], builtins: IndexMap::new() }
    }

    pub fn add_scope(&mut self, local_count: usize) {
        self.scopes.push(Scope::Local(vec![Value::Null; local_count]));
    }

    pub fn remove_scope(&mut self) -> Result<(), &'static str> {
        if self.scopes.len() <= 1 {
            return Err("cannot pop the global scope");
        }
        self.scopes.pop();
        Ok(())
    }

    pub fn set_local(&mut self, slot: u16, value: Value) {
        if let Some(Scope::Local(vars)) = self.scopes.last_mut() {
            if let Some(slot_ref) = vars.get_mut(slot as usize) {
                *slot_ref = value;
            }
        }
    }

    pub fn get_local(&self, slot: u16) -> Value {
        match self.scopes.last() {
            Some(Scope::Local(vars)) => vars.get(slot as usize).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        if let Some(Scope::Global(map)) = self.scopes.first_mut() {
            map.insert(name.to_string(), value);
        }
    }

    pub fn get_global(&self, name: &str) -> Value {
        match self.scopes.first() {
            Some(Scope::Global(map)) => map.get(name).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Host-facing `set`: writes to the first scope (top to bottom) that
    /// already binds `name`, the global scope otherwise.
    pub fn set(&mut self, name: &str, value: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if let Scope::Global(map) = scope {
                if map.contains_key(name) {
                    map.insert(name.to_string(), value);
                    return;
                }
            }
        }
        self.set_global(name, value);
    }

    /// Host-facing `get`: walks scopes top to bottom.
    pub fn get(&self, name: &str) -> Value {
        for scope in self.scopes.iter().rev() {
            if let Scope::Global(map) = scope {
                if let Some(v) = map.get(name) {
                    return v.clone();
                }
            }
        }
        Value::Null
    }

    pub fn register_builtin(&mut self, name: &str, f: BuiltinFn) {
        self.builtins.insert(name.to_string(), f);
    }

    pub fn builtin(&self, name: &str) -> Option<&BuiltinFn> {
        self.builtins.get(name)
    }

    pub fn has_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_round_trip() {
        let mut env = Environment::new();
        env.set_global("x", Value::Integer(1));
        assert_eq!(env.get_global("x"), Value::Integer(1));
    }

    #[test]
    fn local_scope_pop_restores_previous_frame() {
        let mut env = Environment::new();
        env.set_global("x", Value::Integer(1));
        env.add_scope(2);
        env.set_local(0, Value::Integer(42));
        assert_eq!(env.get_local(0), Value::Integer(42));
        env.remove_scope().unwrap();
        assert_eq!(env.get_global("x"), Value::Integer(1));
    }

    #[test]
    fn cannot_pop_global_scope() {
        let mut env = Environment::new();
        assert!(env.remove_scope().is_err());
    }
}
