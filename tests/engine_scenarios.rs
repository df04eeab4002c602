//! Integration tests over the public `Engine` API, covering the concrete
//! scenarios and boundary behaviors the engine is expected to satisfy end
//! to end (lex -> parse -> compile -> optimize -> run), plus optimizer
//! parity across a small sample of scripts.

use filterscript::error::RuntimeErrorKind;
use filterscript::{ast, parser, Engine, PrepareFlags, Value};

fn run(script: &str, record: serde_json::Value) -> Value {
    let mut engine = Engine::new(script);
    engine.prepare(PrepareFlags::default()).expect("prepare");
    engine.execute(record).expect("execute")
}

#[test]
fn arithmetic_precedence_folds_to_seven() {
    let mut engine = Engine::new("return 1 + 2 * 3;");
    engine.prepare(PrepareFlags::default()).unwrap();
    assert_eq!(engine.execute(serde_json::Value::Null), Ok(Value::Integer(7)));
    let disassembly = engine.dump().unwrap();
    assert!(disassembly.contains("PUSH_CONST"));
    assert!(disassembly.contains("RETURN"));
    assert!(!disassembly.contains("ADD"));
    assert!(!disassembly.contains("MUL"));
}

#[test]
fn host_var_time_gate() {
    let script = "if ($time < 3000) { return false; } return true;";
    let record = serde_json::json!({"time": 1_569_264_364});
    assert_eq!(run(script, record), Value::Boolean(true));
}

#[test]
fn sort_builtin_orders_array() {
    let value = run("a = [3, 1, 2]; return sort(a);", serde_json::Value::Null);
    match value {
        Value::Array(items) => {
            let items = items.borrow();
            let rendered: Vec<i64> = items.iter().map(|v| v.as_i64().unwrap()).collect();
            assert_eq!(rendered, vec![1, 2, 3]);
        }
        other => panic!("expected array, got {other:?}"),
    }
}

#[test]
fn switch_with_multi_value_case_and_default() {
    let script = "switch(x) { case 1,2 { return \"low\"; } case 3 { return \"mid\"; } default { return \"hi\"; } }";
    let mut low = Engine::new(script);
    low.set_variable("x", Value::Integer(2));
    low.prepare(PrepareFlags::default()).unwrap();
    assert_eq!(low.execute(serde_json::Value::Null), Ok(Value::string("low")));

    let mut hi = Engine::new(script);
    hi.set_variable("x", Value::Integer(5));
    hi.prepare(PrepareFlags::default()).unwrap();
    assert_eq!(hi.execute(serde_json::Value::Null), Ok(Value::string("hi")));
}

#[test]
fn user_defined_function_doubles() {
    let script = "function dbl(n) { local r; r = n * 2; return r; } return dbl(21);";
    assert_eq!(run(script, serde_json::Value::Null), Value::Integer(42));
}

#[test]
fn empty_script_yields_void_and_is_falsy() {
    let mut engine = Engine::new("");
    engine.prepare(PrepareFlags::default()).unwrap();
    let value = engine.execute(serde_json::Value::Null).unwrap();
    assert_eq!(value, Value::Void);
    assert!(!value.truthy());
}

#[test]
fn empty_script_parses_to_empty_program() {
    let program = parser::parse("").unwrap();
    assert!(program.statements.is_empty());
}

#[test]
fn integer_arithmetic_wraps_on_overflow() {
    let script = "return 9223372036854775807 + 1;";
    assert_eq!(run(script, serde_json::Value::Null), Value::Integer(i64::MIN));
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let mut engine = Engine::new("return 1 / 0;");
    engine.prepare(PrepareFlags::default()).unwrap();
    let err = engine.execute(serde_json::Value::Null).unwrap_err();
    match err {
        filterscript::ExecuteError::Runtime(e) => assert_eq!(e.kind, RuntimeErrorKind::DivideByZero),
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn modulo_by_zero_is_a_runtime_error() {
    let mut engine = Engine::new("return 5 % 0;");
    engine.prepare(PrepareFlags::default()).unwrap();
    let err = engine.execute(serde_json::Value::Null).unwrap_err();
    match err {
        filterscript::ExecuteError::Runtime(e) => assert_eq!(e.kind, RuntimeErrorKind::DivideByZero),
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn len_on_non_collection_coerces_to_string_rune_count() {
    assert_eq!(run("return len(12345);", serde_json::Value::Null), Value::Integer(5));
}

#[test]
fn between_with_non_numeric_argument_is_null() {
    let script = r#"return between("nope", 1, 10);"#;
    assert_eq!(run(script, serde_json::Value::Null), Value::Null);
}

#[test]
fn optimizer_parity_across_a_control_flow_sample() {
    let scripts = [
        "return 1 + 2 * 3;",
        "a = 1; while (a < 5) { a = a + 1; } return a;",
        "function f(n) { if (n < 2) { return 1; } return n * f(n - 1); } return f(5);",
        "a = [1, 2, 3]; s = 0; foreach v in a { s = s + v; } return s;",
    ];
    for script in scripts {
        let mut optimized = Engine::new(script);
        optimized.prepare(PrepareFlags::default()).unwrap();
        let with_opt = optimized.execute(serde_json::Value::Null).unwrap();

        let mut unoptimized = Engine::new(script);
        unoptimized.prepare(PrepareFlags { no_optimize: true, show_optimize: false }).unwrap();
        let without_opt = unoptimized.execute(serde_json::Value::Null).unwrap();

        assert_eq!(with_opt.inspect(), without_opt.inspect(), "mismatch for script: {script}");
    }
}

#[test]
fn parse_then_render_then_reparse_is_structurally_stable() {
    let script = "function dbl(n) { return n * 2; } a = dbl(3); if (a > 5) { return true; } else { return false; }";
    let first = parser::parse(script).unwrap();
    let rendered = ast::to_source(&first);
    let second = parser::parse(&rendered).unwrap();
    assert_eq!(format!("{first:?}"), format!("{second:?}"));
}
