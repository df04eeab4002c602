//! Embeddable filter-scripting engine: lex → parse → compile → optimize →
//! execute on a stack machine, against an arbitrary host record.
//!
//! [`Engine`] is the intended entry point for embedders; the CLI binary is
//! a thin wrapper around the same pipeline, exposed stage-by-stage for the
//! `lex`/`parse`/`bytecode`/`run` subcommands.

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod context;
pub mod engine;
pub mod environment;
pub mod error;
pub mod lexer;
pub mod ops;
pub mod optimizer;
pub mod parser;
pub mod record;
pub mod value;
pub mod vm;

pub use context::Context;
pub use engine::{Engine, PrepareFlags};
pub use error::{CompileError, ExecuteError, LexError, ParseError, PrepareError, RuntimeError, RuntimeErrorKind};
pub use value::Value;
