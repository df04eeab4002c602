//! Public embedding API: `new → prepare → execute/run`. Threads the
//! parser, compiler, optimizer, environment and VM together the way a CLI
//! command wires its sub-stages, but packaged as a reusable library type so
//! a host can `prepare` once and `execute` repeatedly against many records.

use crate::builtins;
use crate::builtins::regex::RegexCache;
use crate::bytecode::{disassemble, Chunk};
use crate::compiler;
use crate::context::Context;
use crate::environment::{BuiltinFn, Environment};
use crate::error::{ExecuteError, PrepareError};
use crate::optimizer;
use crate::parser;
use crate::record::RecordAdapter;
use crate::value::Value;
use crate::vm::Vm;
use std::cell::RefCell;
use std::rc::Rc;

/// Flags recognized by [`Engine::prepare`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareFlags {
    pub no_optimize: bool,
    pub show_optimize: bool,
}

/// Only the two states a caller can observe between calls: `Running` and
/// `Halted`/`Failed` are internal to a single `execute` and always settle
/// back to `Prepared` before the call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialised,
    Prepared,
}

pub struct Engine {
    script_text: String,
    state: State,
    chunk: Option<Chunk>,
    env: Environment,
    regex_cache: Rc<RefCell<RegexCache>>,
    context: Context,
    optimizer_trace: Option<String>,
}

impl Engine {
    pub fn new(script_text: impl Into<String>) -> Self {
        let regex_cache = Rc::new(RefCell::new(RegexCache::new()));
        let mut env = Environment::new();
        builtins::install(&mut env, regex_cache.clone());
        Self {
            script_text: script_text.into(),
            state: State::Uninitialised,
            chunk: None,
            env,
            regex_cache,
            context: Context::none(),
            optimizer_trace: None,
        }
    }

    /// Writes to the global scope.
    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.env.set_global(name, value);
    }

    /// Reads from the topmost scope containing `name`.
    pub fn get_variable(&self, name: &str) -> Value {
        self.env.get(name)
    }

    /// Registers or overrides a built-in.
    pub fn set_function(&mut self, name: &str, callable: BuiltinFn) {
        self.env.register_builtin(name, callable);
    }

    /// Supplies a cancellation/deadline handle for subsequent executions.
    pub fn set_context(&mut self, ctx: Context) {
        self.context = ctx;
    }

    /// Lexes, parses, compiles, and (unless `NO_OPTIMIZE`) optimizes the
    /// script text. `SHOW_OPTIMIZE` records the bytecode before optimization
    /// and again after every peephole pass over the main body and each
    /// function body; the accumulated text is available via
    /// [`Engine::optimizer_trace`] once `prepare` returns.
    pub fn prepare(&mut self, flags: PrepareFlags) -> Result<(), PrepareError> {
        let program = parser::parse(&self.script_text)?;
        let mut chunk = compiler::compile(&program)?;
        self.optimizer_trace = None;
        if !flags.no_optimize {
            if flags.show_optimize {
                let mut trace = String::new();
                trace.push_str("-- before optimization --\n");
                trace.push_str(&disassemble(&chunk));
                let mut pass = 0usize;
                optimizer::optimize_with_trace(&mut chunk, |chunk| {
                    pass += 1;
                    trace.push_str(&format!("-- after pass {pass} --\n"));
                    trace.push_str(&disassemble(chunk));
                });
                self.optimizer_trace = Some(trace);
            } else {
                optimizer::optimize(&mut chunk);
            }
        }
        self.chunk = Some(chunk);
        self.state = State::Prepared;
        Ok(())
    }

    /// Human-readable disassembly, for the `bytecode` CLI subcommand.
    pub fn dump(&self) -> Option<String> {
        self.chunk.as_ref().map(disassemble)
    }

    /// The program disassembled before optimization and after every
    /// peephole pass, when `prepare` ran with `SHOW_OPTIMIZE` set. Backs
    /// the `--show-optimizer` CLI flag.
    pub fn optimizer_trace(&self) -> Option<&str> {
        self.optimizer_trace.as_deref()
    }

    /// Runs the compiled program against `record`, returning the
    /// top-of-stack value at halt. `DEBUG=true` set via [`Engine::set_variable`]
    /// enables the VM's step trace.
    pub fn execute(&mut self, record: serde_json::Value) -> Result<Value, ExecuteError> {
        if self.state != State::Prepared {
            return Err(ExecuteError::NotPrepared);
        }
        let chunk = self.chunk.as_ref().expect("Prepared state implies a compiled chunk");
        let adapter = RecordAdapter::new(record);
        let debug = self.env.get("DEBUG").truthy();
        let mut vm = Vm::new(chunk, &mut self.env, &adapter, self.regex_cache.clone(), self.context.clone(), debug);
        vm.run().map_err(ExecuteError::from)
    }

    /// Convenience: the truthiness of [`Engine::execute`]'s result.
    pub fn run(&mut self, record: serde_json::Value) -> Result<bool, ExecuteError> {
        self.execute(record).map(|v| v.truthy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_before_prepare_is_refused() {
        let mut engine = Engine::new("return 1;");
        assert!(matches!(engine.execute(serde_json::Value::Null), Err(ExecuteError::NotPrepared)));
    }

    #[test]
    fn prepare_then_execute_arithmetic() {
        let mut engine = Engine::new("return 1 + 2 * 3;");
        engine.prepare(PrepareFlags::default()).unwrap();
        assert_eq!(engine.execute(serde_json::Value::Null), Ok(Value::Integer(7)));
    }

    #[test]
    fn host_variable_feeds_host_var_expression() {
        let mut engine = Engine::new("if ($time < 3000) { return false; } return true;");
        engine.prepare(PrepareFlags::default()).unwrap();
        let record = serde_json::json!({"time": 1_569_264_364});
        assert_eq!(engine.execute(record), Ok(Value::Boolean(true)));
    }

    #[test]
    fn set_and_get_variable_round_trip() {
        let mut engine = Engine::new("return 1;");
        engine.set_variable("x", Value::Integer(9));
        assert_eq!(engine.get_variable("x"), Value::Integer(9));
    }

    #[test]
    fn run_reports_truthiness() {
        let mut engine = Engine::new("return 0;");
        engine.prepare(PrepareFlags::default()).unwrap();
        assert_eq!(engine.run(serde_json::Value::Null), Ok(false));
    }

    #[test]
    fn re_executing_after_success_reuses_compiled_bytecode() {
        let mut engine = Engine::new("return 1 + 1;");
        engine.prepare(PrepareFlags::default()).unwrap();
        assert_eq!(engine.execute(serde_json::Value::Null), Ok(Value::Integer(2)));
        assert_eq!(engine.execute(serde_json::Value::Null), Ok(Value::Integer(2)));
    }

    #[test]
    fn no_optimize_flag_still_executes_correctly() {
        let mut engine = Engine::new("return 1 + 2 * 3;");
        engine.prepare(PrepareFlags { no_optimize: true, show_optimize: false }).unwrap();
        assert_eq!(engine.execute(serde_json::Value::Null), Ok(Value::Integer(7)));
    }

    #[test]
    fn user_defined_function_call() {
        let mut engine = Engine::new("function dbl(n) { local r; r = n * 2; return r; } return dbl(21);");
        engine.prepare(PrepareFlags::default()).unwrap();
        assert_eq!(engine.execute(serde_json::Value::Null), Ok(Value::Integer(42)));
    }

    #[test]
    fn show_optimize_records_a_trace_per_pass() {
        let mut engine = Engine::new("return 1 + 2 * 3;");
        engine.prepare(PrepareFlags { no_optimize: false, show_optimize: true }).unwrap();
        let trace = engine.optimizer_trace().expect("trace recorded when show_optimize is set");
        assert!(trace.contains("before optimization"));
        assert!(trace.contains("after pass 1"));
    }

    #[test]
    fn optimizer_trace_absent_without_show_optimize() {
        let mut engine = Engine::new("return 1 + 2 * 3;");
        engine.prepare(PrepareFlags::default()).unwrap();
        assert!(engine.optimizer_trace().is_none());
    }

    #[test]
    fn empty_script_returns_void() {
        let mut engine = Engine::new("");
        engine.prepare(PrepareFlags::default()).unwrap();
        let result = engine.execute(serde_json::Value::Null).unwrap();
        assert_eq!(result, Value::Void);
        assert!(!result.truthy());
    }
}
