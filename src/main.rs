//! CLI front-end over the `filterscript` library: the external collaborator
//! the engine API is designed to be consumed by. Thin by design — each
//! subcommand is a few calls into `filterscript::{lexer, parser, Engine}`.

use clap::{Parser as ClapParser, Subcommand};
use filterscript::lexer::{Lexer, TokenKind};
use filterscript::{ast, parser, Engine, PrepareFlags};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(ClapParser)]
#[command(name = "filterscript")]
#[command(about = "Lex, parse, compile, and run filter scripts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print tokens, one per line; stop on EOF or an illegal token.
    Lex { files: Vec<PathBuf> },

    /// Print the round-tripped AST as source-like text.
    Parse { files: Vec<PathBuf> },

    /// Disassemble the compiled program.
    Bytecode {
        #[arg(long = "no-optimizer")]
        no_optimizer: bool,
        #[arg(long = "show-optimizer")]
        show_optimizer: bool,
        files: Vec<PathBuf>,
    },

    /// Execute against an optional JSON record.
    Run {
        #[arg(long = "json")]
        json: Option<PathBuf>,
        #[arg(long = "no-optimizer")]
        no_optimizer: bool,
        #[arg(long = "debug")]
        debug: bool,
        #[arg(long = "timeout")]
        timeout_ms: Option<u64>,
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    match cli.command {
        Command::Lex { files } => run_over_files(&files, lex_file),
        Command::Parse { files } => run_over_files(&files, parse_file),
        Command::Bytecode { no_optimizer, show_optimizer, files } => {
            run_over_files(&files, |src| bytecode_file(src, no_optimizer, show_optimizer))
        }
        Command::Run { json, no_optimizer, debug, timeout_ms, files } => {
            run_over_files(&files, |src| run_file(src, json.as_deref(), no_optimizer, debug, timeout_ms))
        }
    }
}

fn run_over_files(files: &[PathBuf], f: impl Fn(&str) -> bool) -> ExitCode {
    if files.is_empty() {
        eprintln!("error: no input files given");
        return ExitCode::FAILURE;
    }
    let mut ok = true;
    for path in files {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: cannot read {}: {e}", path.display());
                ok = false;
                continue;
            }
        };
        if !f(&source) {
            ok = false;
        }
    }
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn lex_file(source: &str) -> bool {
    for token in Lexer::new(source).tokenize() {
        match &token.kind {
            TokenKind::Eof => {
                println!("{} EOF", token.pos);
                return true;
            }
            TokenKind::Illegal(text) => {
                println!("{} ILLEGAL {text:?}", token.pos);
                return false;
            }
            kind => println!("{} {kind:?}", token.pos),
        }
    }
    true
}

fn parse_file(source: &str) -> bool {
    match parser::parse(source) {
        Ok(program) => {
            print!("{}", ast::to_source(&program));
            true
        }
        Err(e) => {
            eprintln!("{e}");
            false
        }
    }
}

fn bytecode_file(source: &str, no_optimizer: bool, show_optimizer: bool) -> bool {
    let mut engine = Engine::new(source);
    let flags = PrepareFlags { no_optimize: no_optimizer, show_optimize: show_optimizer };
    match engine.prepare(flags) {
        Ok(()) => {
            if let Some(trace) = engine.optimizer_trace() {
                println!("{trace}");
            }
            println!("{}", engine.dump().expect("prepare succeeded"));
            true
        }
        Err(e) => {
            eprintln!("{e}");
            false
        }
    }
}

fn run_file(source: &str, json: Option<&std::path::Path>, no_optimizer: bool, debug: bool, timeout_ms: Option<u64>) -> bool {
    let record = match json {
        Some(path) => match std::fs::read_to_string(path).map_err(|e| e.to_string()).and_then(|text| {
            serde_json::from_str(&text).map_err(|e| e.to_string())
        }) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("error: cannot load record from {}: {e}", path.display());
                return false;
            }
        },
        None => serde_json::Value::Null,
    };

    let mut engine = Engine::new(source);
    if debug {
        engine.set_variable("DEBUG", filterscript::Value::Boolean(true));
    }
    if let Some(ms) = timeout_ms {
        engine.set_context(filterscript::Context::with_timeout(std::time::Duration::from_millis(ms)));
    }
    let flags = PrepareFlags { no_optimize: no_optimizer, show_optimize: false };
    if let Err(e) = engine.prepare(flags) {
        eprintln!("{e}");
        return false;
    }
    match engine.execute(record) {
        Ok(value) => {
            println!(
                "{} {} ({})",
                value.type_tag(),
                value.inspect(),
                if value.truthy() { "true" } else { "false" }
            );
            if let Some(json) = value.json() {
                println!("{json}");
            }
            true
        }
        Err(e) => {
            eprintln!("{e}");
            false
        }
    }
}
