//! C8: the stack machine that executes a compiled [`Chunk`].
//!
//! No AST-walking interpreter exists in this crate: every control-flow
//! construct has already been lowered to jumps and calls by the compiler, so
//! the dispatch loop below is the only runtime there is.

pub mod frame;

use crate::builtins::regex::RegexCache;
use crate::bytecode::{read_u16, Chunk, Opcode};
use crate::context::Context;
use crate::environment::Environment;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::ops;
use crate::record::RecordAdapter;
use crate::value::Value;
use frame::{CallFrame, IterState};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Owns the operand stack, call stack and iterator stack for one `Execute`
/// invocation. Borrows everything else — the compiled chunk, the variable
/// environment, the host record, the shared regex cache, the cancellation
/// handle — so that a fresh `Vm` can be built per call without recompiling
/// or re-registering built-ins.
pub struct Vm<'a> {
    chunk: &'a Chunk,
    env: &'a mut Environment,
    record: &'a RecordAdapter,
    regex_cache: Rc<RefCell<RegexCache>>,
    context: Context,
    debug: bool,
    stack: Vec<Value>,
    call_stack: Vec<CallFrame<'a>>,
    iter_stack: Vec<IterState>,
}

impl<'a> Vm<'a> {
    pub fn new(
        chunk: &'a Chunk,
        env: &'a mut Environment,
        record: &'a RecordAdapter,
        regex_cache: Rc<RefCell<RegexCache>>,
        context: Context,
        debug: bool,
    ) -> Self {
        Self {
            chunk,
            env,
            record,
            regex_cache,
            context,
            debug,
            stack: Vec::new(),
            call_stack: Vec::new(),
            iter_stack: Vec::new(),
        }
    }

    /// Runs from the first instruction of the main body to a `RETURN` at
    /// an empty call stack or a `HALT`, returning the value left on top of
    /// the operand stack.
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        let mut code: &'a [u8] = &self.chunk.code;
        let mut pc = 0usize;

        loop {
            if self.context.expired() {
                return Err(RuntimeError::new(RuntimeErrorKind::Timeout, pc));
            }

            let op = Opcode::from_byte(code[pc]).expect("well-formed opcode stream");
            let operand = if op.has_operand() { read_u16(code, pc + 1) } else { 0 };
            let instr_pc = pc;
            pc += if op.has_operand() { 3 } else { 1 };

            if self.debug {
                tracing::trace!(pc = instr_pc, opcode = op.mnemonic(), operand, stack = ?self.stack, "step");
                println!("{instr_pc:04} {:<14} {operand:<6} {:?}", op.mnemonic(), self.stack);
            }

            macro_rules! pop {
                () => {
                    self.stack.pop().expect("operand stack underflow")
                };
            }
            macro_rules! fail {
                ($kind:expr) => {
                    return Err(RuntimeError::new($kind, instr_pc))
                };
            }

            match op {
                Opcode::PushConst => self.stack.push(self.chunk.constants[operand as usize].clone()),
                Opcode::PushTrue => self.stack.push(Value::Boolean(true)),
                Opcode::PushFalse => self.stack.push(Value::Boolean(false)),
                Opcode::PushNull => self.stack.push(Value::Null),
                Opcode::PushVoid => self.stack.push(Value::Void),

                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::Pow
                | Opcode::Eq
                | Opcode::Ne
                | Opcode::Lt
                | Opcode::Le
                | Opcode::Gt
                | Opcode::Ge
                | Opcode::Contains
                | Opcode::Missing
                | Opcode::In
                | Opcode::And
                | Opcode::Or => {
                    let b = pop!();
                    let a = pop!();
                    let result = match op {
                        Opcode::Add => ops::add(&a, &b),
                        Opcode::Sub => ops::sub(&a, &b),
                        Opcode::Mul => ops::mul(&a, &b),
                        Opcode::Div => ops::div(&a, &b),
                        Opcode::Mod => ops::rem(&a, &b),
                        Opcode::Pow => ops::pow(&a, &b),
                        Opcode::Eq => ops::eq(&a, &b),
                        Opcode::Ne => ops::ne(&a, &b),
                        Opcode::Lt => ops::lt(&a, &b),
                        Opcode::Le => ops::le(&a, &b),
                        Opcode::Gt => ops::gt(&a, &b),
                        Opcode::Ge => ops::ge(&a, &b),
                        Opcode::Contains => ops::contains(&a, &b),
                        Opcode::Missing => ops::missing(&a, &b),
                        Opcode::In => ops::contained_in(&a, &b),
                        // The compiler always lowers `&&`/`||` to jumps for
                        // short-circuiting; these stay reachable only for a
                        // host embedder's own emitted bytecode.
                        Opcode::And => Ok(Value::Boolean(a.truthy() && b.truthy())),
                        Opcode::Or => Ok(Value::Boolean(a.truthy() || b.truthy())),
                        _ => unreachable!(),
                    };
                    match result {
                        Ok(v) => self.stack.push(v),
                        Err(kind) => fail!(kind),
                    }
                }

                Opcode::Matches | Opcode::NotMatches => {
                    let pattern = pop!();
                    let text = pop!();
                    match ops::regex_matches(&text, &pattern, &mut self.regex_cache.borrow_mut()) {
                        Ok(Value::Boolean(b)) => {
                            self.stack.push(Value::Boolean(if op == Opcode::Matches { b } else { !b }));
                        }
                        Ok(_) => unreachable!("regex_matches always returns a Boolean"),
                        Err(kind) => fail!(kind),
                    }
                }

                Opcode::Neg => {
                    let a = pop!();
                    match ops::neg(&a) {
                        Ok(v) => self.stack.push(v),
                        Err(kind) => fail!(kind),
                    }
                }
                Opcode::Not => {
                    let a = pop!();
                    self.stack.push(ops::not(&a));
                }
                Opcode::Root => {
                    let a = pop!();
                    match ops::root(&a) {
                        Ok(v) => self.stack.push(v),
                        Err(kind) => fail!(kind),
                    }
                }

                Opcode::Jmp => pc = operand as usize,
                Opcode::JmpIfFalse => {
                    let cond = pop!();
                    if !cond.truthy() {
                        pc = operand as usize;
                    }
                }

                Opcode::Call => {
                    let argc = operand as usize;
                    let mut args = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        args.push(pop!());
                    }
                    args.reverse();
                    let name = match pop!() {
                        Value::String(s) => s.to_string(),
                        other => fail!(RuntimeErrorKind::TypeMismatch(format!(
                            "call target must be a string, got {}",
                            other.type_tag()
                        ))),
                    };

                    if let Some(f) = self.env.builtin(&name).cloned() {
                        match f(&args) {
                            Ok(v) => self.stack.push(v),
                            Err(kind) => fail!(kind),
                        }
                    } else if let Some(idx) = self.chunk.function_index(&name) {
                        let proto = &self.chunk.functions[idx as usize];
                        if proto.params.len() != argc {
                            fail!(RuntimeErrorKind::Arity { expected: proto.params.len(), got: argc });
                        }
                        self.call_stack.push(CallFrame { return_code: code, return_pc: pc, param_count: argc });
                        self.env.add_scope(proto.local_count);
                        for (i, arg) in args.into_iter().enumerate() {
                            self.env.set_local(i as u16, arg);
                        }
                        code = &proto.code;
                        pc = 0;
                    } else {
                        fail!(RuntimeErrorKind::UnknownFunction(name));
                    }
                }

                Opcode::Return => {
                    let value = pop!();
                    match self.call_stack.pop() {
                        Some(frame) => {
                            self.env.remove_scope().expect("CALL always pushes a matching scope");
                            code = frame.return_code;
                            pc = frame.return_pc;
                            self.stack.push(value);
                        }
                        None => return Ok(value),
                    }
                }
                Opcode::Halt => return Ok(pop!()),

                Opcode::LoadGlobal => {
                    let name = self.chunk.globals.name_at(operand).expect("interned global name");
                    self.stack.push(self.env.get_global(name));
                }
                Opcode::StoreGlobal => {
                    let name = self.chunk.globals.name_at(operand).expect("interned global name").to_string();
                    let value = pop!();
                    self.env.set_global(&name, value);
                }
                Opcode::LoadLocal => self.stack.push(self.env.get_local(operand)),
                Opcode::StoreLocal => {
                    let value = pop!();
                    self.env.set_local(operand, value);
                }

                Opcode::LoadField => {
                    let path = match &self.chunk.constants[operand as usize] {
                        Value::String(s) => s.clone(),
                        _ => unreachable!("LOAD_FIELD operand is always an interned string constant"),
                    };
                    match self.record.get(&path) {
                        Some(v) => self.stack.push(v),
                        None => {
                            tracing::debug!(path = %path, "unknown host field; yielding Null");
                            self.stack.push(Value::Null);
                        }
                    }
                }

                Opcode::LoadIndex => {
                    let index = pop!();
                    let base = pop!();
                    match load_index(&base, &index) {
                        Ok(v) => self.stack.push(v),
                        Err(kind) => fail!(kind),
                    }
                }
                Opcode::StoreIndex => {
                    let value = pop!();
                    let index = pop!();
                    let base = pop!();
                    if let Err(kind) = store_index(&base, &index, value) {
                        fail!(kind);
                    }
                }

                Opcode::MakeArray => {
                    let n = operand as usize;
                    let mut items = Vec::with_capacity(n);
                    for _ in 0..n {
                        items.push(pop!());
                    }
                    items.reverse();
                    self.stack.push(Value::array(items));
                }
                Opcode::MakeHash => {
                    let n = operand as usize;
                    let mut pairs = Vec::with_capacity(n);
                    for _ in 0..n {
                        let v = pop!();
                        let k = pop!();
                        pairs.push((k, v));
                    }
                    pairs.reverse();
                    let mut map = IndexMap::new();
                    for (k, v) in pairs {
                        match k.as_hash_key() {
                            Some(hk) => {
                                map.insert(hk, v);
                            }
                            None => fail!(RuntimeErrorKind::TypeMismatch(format!(
                                "cannot use {} as a hash key",
                                k.type_tag()
                            ))),
                        }
                    }
                    self.stack.push(Value::hash(map));
                }

                Opcode::IterNew => {
                    let subject = pop!();
                    match iterable_pairs(&subject) {
                        Ok(pairs) => self.iter_stack.push(IterState::new(pairs)),
                        Err(kind) => fail!(kind),
                    }
                }
                Opcode::IterNext => {
                    let state = self.iter_stack.last_mut().expect("ITER_NEXT without a matching ITER_NEW");
                    match state.advance() {
                        Some((key, value)) => {
                            self.stack.push(key);
                            self.stack.push(value);
                        }
                        None => {
                            self.iter_stack.pop();
                            pc = operand as usize;
                        }
                    }
                }
            }
        }
    }
}

/// `a[i]`: array/string indexing is by position (out of range yields
/// `Null` rather than erroring, matching the built-ins' wrong-input
/// convention); hash indexing is by key.
fn load_index(base: &Value, index: &Value) -> Result<Value, RuntimeErrorKind> {
    match base {
        Value::Array(items) => match index {
            Value::Integer(i) => {
                let items = items.borrow();
                Ok(usize::try_from(*i).ok().and_then(|i| items.get(i).cloned()).unwrap_or(Value::Null))
            }
            _ => Err(RuntimeErrorKind::TypeMismatch(format!("cannot index an array with {}", index.type_tag()))),
        },
        Value::String(s) => match index {
            Value::Integer(i) => Ok(usize::try_from(*i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::string(c.to_string()))
                .unwrap_or(Value::Null)),
            _ => Err(RuntimeErrorKind::TypeMismatch(format!("cannot index a string with {}", index.type_tag()))),
        },
        Value::Hash(map) => match index.as_hash_key() {
            Some(key) => Ok(map.borrow().get(&key).cloned().unwrap_or(Value::Null)),
            None => Ok(Value::Null),
        },
        _ => Err(RuntimeErrorKind::TypeMismatch(format!("cannot index a {}", base.type_tag()))),
    }
}

/// `a[i] = v`: an out-of-range array write is a no-op rather than an
/// auto-extend or an error, mirroring the built-ins' soft-failure texture.
fn store_index(base: &Value, index: &Value, value: Value) -> Result<(), RuntimeErrorKind> {
    match base {
        Value::Array(items) => match index {
            Value::Integer(i) => {
                if let Ok(i) = usize::try_from(*i) {
                    if let Some(slot) = items.borrow_mut().get_mut(i) {
                        *slot = value;
                    }
                }
                Ok(())
            }
            _ => Err(RuntimeErrorKind::TypeMismatch(format!("cannot index an array with {}", index.type_tag()))),
        },
        Value::Hash(map) => match index.as_hash_key() {
            Some(key) => {
                map.borrow_mut().insert(key, value);
                Ok(())
            }
            None => Err(RuntimeErrorKind::TypeMismatch(format!("cannot use {} as a hash key", index.type_tag()))),
        },
        _ => Err(RuntimeErrorKind::TypeMismatch(format!("cannot index-assign a {}", base.type_tag()))),
    }
}

/// `ITER_NEW`'s materialization: array indices pair with their elements;
/// hash entries pair key-to-value, ordered by stringified key so iteration
/// is deterministic and matches `keys()`'s own convention.
fn iterable_pairs(subject: &Value) -> Result<Vec<(Value, Value)>, RuntimeErrorKind> {
    match subject {
        Value::Array(items) => {
            Ok(items.borrow().iter().enumerate().map(|(i, v)| (Value::Integer(i as i64), v.clone())).collect())
        }
        Value::Hash(map) => {
            let map = map.borrow();
            let mut pairs: Vec<(Value, Value)> =
                map.iter().map(|(k, v)| (k.clone().into_value(), v.clone())).collect();
            pairs.sort_by(|a, b| a.0.inspect().cmp(&b.0.inspect()));
            Ok(pairs)
        }
        _ => Err(RuntimeErrorKind::TypeMismatch(format!("cannot iterate over a {}", subject.type_tag()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{emit_op, emit_op_u16, patch_u16, FunctionProto};
    use crate::error::RuntimeErrorKind;
    use std::time::Duration;

    fn fresh_env() -> Environment {
        let mut env = Environment::new();
        crate::builtins::install(&mut env, Rc::new(RefCell::new(RegexCache::new())));
        env
    }

    #[test]
    fn folds_arithmetic_and_returns() {
        let mut chunk = Chunk::default();
        let one = chunk.intern_constant(Value::Integer(1));
        let two = chunk.intern_constant(Value::Integer(2));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, one);
        emit_op_u16(&mut chunk.code, Opcode::PushConst, two);
        emit_op(&mut chunk.code, Opcode::Add);
        emit_op(&mut chunk.code, Opcode::Return);

        let mut env = Environment::new();
        let record = RecordAdapter::empty();
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), Context::none(), false);
        assert_eq!(vm.run(), Ok(Value::Integer(3)));
    }

    #[test]
    fn global_store_and_load_round_trip() {
        let mut chunk = Chunk::default();
        let k = chunk.globals.intern("x");
        let five = chunk.intern_constant(Value::Integer(5));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, five);
        emit_op_u16(&mut chunk.code, Opcode::StoreGlobal, k);
        emit_op_u16(&mut chunk.code, Opcode::LoadGlobal, k);
        emit_op(&mut chunk.code, Opcode::Return);

        let mut env = Environment::new();
        let record = RecordAdapter::empty();
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), Context::none(), false);
        assert_eq!(vm.run(), Ok(Value::Integer(5)));
    }

    #[test]
    fn calls_user_function_by_name() {
        let mut chunk = Chunk::default();
        let mut fn_code = Vec::new();
        emit_op_u16(&mut fn_code, Opcode::LoadLocal, 0);
        let two = chunk.intern_constant(Value::Integer(2));
        emit_op_u16(&mut fn_code, Opcode::PushConst, two);
        emit_op(&mut fn_code, Opcode::Mul);
        emit_op(&mut fn_code, Opcode::Return);
        chunk.functions.push(FunctionProto {
            name: "double".to_string(),
            params: vec!["n".to_string()],
            code: fn_code,
            local_count: 1,
        });

        let name_k = chunk.intern_constant(Value::string("double"));
        let arg_k = chunk.intern_constant(Value::Integer(21));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, name_k);
        emit_op_u16(&mut chunk.code, Opcode::PushConst, arg_k);
        emit_op_u16(&mut chunk.code, Opcode::Call, 1);
        emit_op(&mut chunk.code, Opcode::Return);

        let mut env = Environment::new();
        let record = RecordAdapter::empty();
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), Context::none(), false);
        assert_eq!(vm.run(), Ok(Value::Integer(42)));
    }

    #[test]
    fn calling_unknown_function_is_a_runtime_error() {
        let mut chunk = Chunk::default();
        let name_k = chunk.intern_constant(Value::string("nope"));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, name_k);
        emit_op_u16(&mut chunk.code, Opcode::Call, 0);
        emit_op(&mut chunk.code, Opcode::Return);

        let mut env = Environment::new();
        let record = RecordAdapter::empty();
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), Context::none(), false);
        let err = vm.run().unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::UnknownFunction("nope".to_string()));
    }

    #[test]
    fn calls_registered_builtin() {
        let mut chunk = Chunk::default();
        let name_k = chunk.intern_constant(Value::string("upper"));
        let arg_k = chunk.intern_constant(Value::string("hi"));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, name_k);
        emit_op_u16(&mut chunk.code, Opcode::PushConst, arg_k);
        emit_op_u16(&mut chunk.code, Opcode::Call, 1);
        emit_op(&mut chunk.code, Opcode::Return);

        let mut env = fresh_env();
        let record = RecordAdapter::empty();
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), Context::none(), false);
        assert_eq!(vm.run(), Ok(Value::string("HI")));
    }

    #[test]
    fn foreach_over_array_sums_values_in_order() {
        let mut chunk = Chunk::default();
        let acc_k = chunk.globals.intern("acc");
        let v_k = chunk.globals.intern("v");
        let k_k = chunk.globals.intern("k");

        let zero = chunk.intern_constant(Value::Integer(0));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, zero);
        emit_op_u16(&mut chunk.code, Opcode::StoreGlobal, acc_k);

        let arr = chunk.intern_constant(Value::array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, arr);
        emit_op(&mut chunk.code, Opcode::IterNew);

        let loop_start = chunk.code.len() as u16;
        let iter_next_at = emit_op_u16(&mut chunk.code, Opcode::IterNext, 0);
        emit_op_u16(&mut chunk.code, Opcode::StoreGlobal, v_k);
        emit_op_u16(&mut chunk.code, Opcode::StoreGlobal, k_k);
        emit_op_u16(&mut chunk.code, Opcode::LoadGlobal, acc_k);
        emit_op_u16(&mut chunk.code, Opcode::LoadGlobal, v_k);
        emit_op(&mut chunk.code, Opcode::Add);
        emit_op_u16(&mut chunk.code, Opcode::StoreGlobal, acc_k);
        emit_op_u16(&mut chunk.code, Opcode::Jmp, loop_start);
        let end = chunk.code.len() as u16;
        patch_u16(&mut chunk.code, iter_next_at, end);

        emit_op_u16(&mut chunk.code, Opcode::LoadGlobal, acc_k);
        emit_op(&mut chunk.code, Opcode::Return);

        let mut env = Environment::new();
        let record = RecordAdapter::empty();
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), Context::none(), false);
        assert_eq!(vm.run(), Ok(Value::Integer(6)));
    }

    #[test]
    fn load_field_reads_through_record_adapter() {
        let mut chunk = Chunk::default();
        let path = chunk.intern_constant(Value::string("time"));
        emit_op_u16(&mut chunk.code, Opcode::LoadField, path);
        emit_op(&mut chunk.code, Opcode::Return);

        let mut env = Environment::new();
        let record = RecordAdapter::new(serde_json::json!({"time": 1_569_264_364}));
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), Context::none(), false);
        assert_eq!(vm.run(), Ok(Value::Integer(1_569_264_364)));
    }

    #[test]
    fn unknown_field_is_null_not_an_error() {
        let mut chunk = Chunk::default();
        let path = chunk.intern_constant(Value::string("missing"));
        emit_op_u16(&mut chunk.code, Opcode::LoadField, path);
        emit_op(&mut chunk.code, Opcode::Return);

        let mut env = Environment::new();
        let record = RecordAdapter::empty();
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), Context::none(), false);
        assert_eq!(vm.run(), Ok(Value::Null));
    }

    #[test]
    fn halt_returns_top_of_stack() {
        let mut chunk = Chunk::default();
        let k = chunk.intern_constant(Value::Boolean(true));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, k);
        emit_op(&mut chunk.code, Opcode::Halt);

        let mut env = Environment::new();
        let record = RecordAdapter::empty();
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), Context::none(), false);
        assert_eq!(vm.run(), Ok(Value::Boolean(true)));
    }

    #[test]
    fn expired_context_aborts_with_timeout() {
        let mut chunk = Chunk::default();
        emit_op(&mut chunk.code, Opcode::PushVoid);
        emit_op(&mut chunk.code, Opcode::Return);

        let mut env = Environment::new();
        let record = RecordAdapter::empty();
        let ctx = Context::with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), ctx, false);
        let err = vm.run().unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::Timeout);
    }

    #[test]
    fn index_out_of_range_yields_null() {
        let mut chunk = Chunk::default();
        let arr = chunk.intern_constant(Value::array(vec![Value::Integer(1)]));
        let idx = chunk.intern_constant(Value::Integer(9));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, arr);
        emit_op_u16(&mut chunk.code, Opcode::PushConst, idx);
        emit_op(&mut chunk.code, Opcode::LoadIndex);
        emit_op(&mut chunk.code, Opcode::Return);

        let mut env = Environment::new();
        let record = RecordAdapter::empty();
        let mut vm = Vm::new(&chunk, &mut env, &record, Rc::new(RefCell::new(RegexCache::new())), Context::none(), false);
        assert_eq!(vm.run(), Ok(Value::Null));
    }
}
