//! Error taxonomy for every compilation and execution stage.
//!
//! Mirrors the per-module `thiserror` enum convention seen in
//! `fs::types::FsError` and `parser::types::ParseException`: one `Error`
//! enum per stage, each carrying enough context to render a human-readable
//! message.

use thiserror::Error;

/// Source position, 1-indexed, attached to tokens, AST nodes, and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("{0} unterminated string literal")]
    UnterminatedString(Position),

    #[error("{0} unterminated regexp literal")]
    UnterminatedRegexp(Position),

    #[error("{0} malformed number literal '{text}'")]
    MalformedNumber { pos: Position, text: String },

    #[error("{0} unexpected character '{ch}'")]
    UnexpectedChar { pos: Position, ch: char },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnterminatedString(p) => *p,
            LexError::UnterminatedRegexp(p) => *p,
            LexError::MalformedNumber { pos, .. } => *pos,
            LexError::UnexpectedChar { pos, .. } => *pos,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{pos} {message}")]
pub struct ParseError {
    pub message: String,
    pub pos: Position,
}

impl ParseError {
    pub fn new(message: impl Into<String>, pos: Position) -> Self {
        Self { message: message.into(), pos }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{pos} {message}")]
pub struct CompileError {
    pub message: String,
    pub pos: Position,
}

impl CompileError {
    pub fn new(message: impl Into<String>, pos: Position) -> Self {
        Self { message: message.into(), pos }
    }
}

/// Always a bug in a peephole pass, never a user-facing error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("optimizer invariant violated: {0}")]
pub struct OptimizerError(pub String);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivideByZero,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("execution timed out")]
    Timeout,
    #[error("{0}")]
    Panic(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("runtime error at pc {pc}: {kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub pc: usize,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, pc: usize) -> Self {
        Self { kind, pc }
    }
}

/// Top-level error returned by `Prepare`, unifying the three compile stages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrepareError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Error returned by `Execute` when the engine refuses to run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecuteError {
    #[error("engine not prepared; call Prepare before Execute")]
    NotPrepared,
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
