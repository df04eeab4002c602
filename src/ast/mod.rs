//! C3: typed AST node shared by the parser and the compiler.
//!
//! Shaped after the query-engine's `AstNode` (`commands/query_engine/ast.rs`):
//! one flat enum per node kind, literals carrying a `Value`, each node
//! carrying its source position for diagnostics.

use crate::error::Position;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Matches,
    NotMatches,
    Contains,
    Missing,
    In,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrefixOp {
    Neg,
    Not,
    Root,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostfixOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub matches: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal { value: Value, pos: Position },
    Ident { name: String, pos: Position },
    HostVar { name: String, pos: Position },
    Array { elements: Vec<Expr>, pos: Position },
    HashLit { entries: Vec<(Expr, Expr)>, pos: Position },
    Prefix { op: PrefixOp, expr: Box<Expr>, pos: Position },
    Infix { op: InfixOp, left: Box<Expr>, right: Box<Expr>, pos: Position },
    Postfix { op: PostfixOp, target: String, pos: Position },
    Ternary { cond: Box<Expr>, then_branch: Box<Expr>, else_branch: Box<Expr>, pos: Position },
    Assign { name: String, value: Box<Expr>, pos: Position },
    IndexAssign { base: Box<Expr>, index: Box<Expr>, value: Box<Expr>, pos: Position },
    Call { name: String, args: Vec<Expr>, pos: Position },
    Index { base: Box<Expr>, index: Box<Expr>, pos: Position },
}

impl Expr {
    pub fn pos(&self) -> Position {
        match self {
            Expr::Literal { pos, .. }
            | Expr::Ident { pos, .. }
            | Expr::HostVar { pos, .. }
            | Expr::Array { pos, .. }
            | Expr::HashLit { pos, .. }
            | Expr::Prefix { pos, .. }
            | Expr::Infix { pos, .. }
            | Expr::Postfix { pos, .. }
            | Expr::Ternary { pos, .. }
            | Expr::Assign { pos, .. }
            | Expr::IndexAssign { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::Index { pos, .. } => *pos,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Local { name: String, pos: Position },
    If { cond: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>, pos: Position },
    While { cond: Expr, body: Vec<Stmt>, pos: Position },
    Foreach {
        index_binding: Option<String>,
        value_binding: String,
        iterable: Expr,
        body: Vec<Stmt>,
        pos: Position,
    },
    Switch { subject: Expr, cases: Vec<SwitchCase>, default: Option<Vec<Stmt>>, pos: Position },
    FunctionDef { name: String, params: Vec<String>, body: Vec<Stmt>, pos: Position },
    Return { value: Option<Expr>, pos: Position },
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// Renders a parsed program back to source-like text, for the `parse` CLI
/// subcommand. Not a faithful round-trip (no original whitespace/comments
/// survive past lexing) — close enough to eyeball that parsing agreed with
/// intent.
pub fn to_source(program: &Program) -> String {
    let mut out = String::new();
    for stmt in &program.statements {
        write_stmt(&mut out, stmt, 0);
    }
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

fn write_block(out: &mut String, body: &[Stmt], depth: usize) {
    out.push_str("{\n");
    for stmt in body {
        write_stmt(out, stmt, depth + 1);
    }
    indent(out, depth);
    out.push('}');
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    indent(out, depth);
    match stmt {
        Stmt::Expr(e) => out.push_str(&format!("{};\n", render_expr(e))),
        Stmt::Local { name, .. } => out.push_str(&format!("local {name};\n")),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            out.push_str(&format!("if ({}) ", render_expr(cond)));
            write_block(out, then_branch, depth);
            if let Some(else_branch) = else_branch {
                out.push_str(" else ");
                write_block(out, else_branch, depth);
            }
            out.push('\n');
        }
        Stmt::While { cond, body, .. } => {
            out.push_str(&format!("while ({}) ", render_expr(cond)));
            write_block(out, body, depth);
            out.push('\n');
        }
        Stmt::Foreach { index_binding, value_binding, iterable, body, .. } => {
            match index_binding {
                Some(idx) => out.push_str(&format!(
                    "foreach {idx}, {value_binding} in {} ",
                    render_expr(iterable)
                )),
                None => out.push_str(&format!(
                    "foreach {value_binding} in {} ",
                    render_expr(iterable)
                )),
            }
            write_block(out, body, depth);
            out.push('\n');
        }
        Stmt::Switch { subject, cases, default, .. } => {
            out.push_str(&format!("switch ({}) {{\n", render_expr(subject)));
            for case in cases {
                indent(out, depth + 1);
                let matches: Vec<String> = case.matches.iter().map(render_expr).collect();
                out.push_str(&format!("case {} ", matches.join(", ")));
                write_block(out, &case.body, depth + 1);
                out.push('\n');
            }
            if let Some(default) = default {
                indent(out, depth + 1);
                out.push_str("default ");
                write_block(out, default, depth + 1);
                out.push('\n');
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        Stmt::FunctionDef { name, params, body, .. } => {
            out.push_str(&format!("function {name}({}) ", params.join(", ")));
            write_block(out, body, depth);
            out.push('\n');
        }
        Stmt::Return { value, .. } => match value {
            Some(e) => out.push_str(&format!("return {};\n", render_expr(e))),
            None => out.push_str("return;\n"),
        },
        Stmt::Block(body) => {
            write_block(out, body, depth);
            out.push('\n');
        }
    }
}

fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal { value, .. } => value.inspect(),
        Expr::Ident { name, .. } => name.clone(),
        Expr::HostVar { name, .. } => format!("${name}"),
        Expr::Array { elements, .. } => {
            format!("[{}]", elements.iter().map(render_expr).collect::<Vec<_>>().join(", "))
        }
        Expr::HashLit { entries, .. } => {
            let pairs: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", render_expr(k), render_expr(v)))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        }
        Expr::Prefix { op, expr, .. } => format!("{}{}", prefix_op_str(op), render_expr(expr)),
        Expr::Infix { op, left, right, .. } => {
            format!("({} {} {})", render_expr(left), infix_op_str(op), render_expr(right))
        }
        Expr::Postfix { op, target, .. } => format!("{target}{}", postfix_op_str(op)),
        Expr::Ternary { cond, then_branch, else_branch, .. } => {
            format!("({} ? {} : {})", render_expr(cond), render_expr(then_branch), render_expr(else_branch))
        }
        Expr::Assign { name, value, .. } => format!("{name} = {}", render_expr(value)),
        Expr::IndexAssign { base, index, value, .. } => {
            format!("{}[{}] = {}", render_expr(base), render_expr(index), render_expr(value))
        }
        Expr::Call { name, args, .. } => {
            format!("{name}({})", args.iter().map(render_expr).collect::<Vec<_>>().join(", "))
        }
        Expr::Index { base, index, .. } => format!("{}[{}]", render_expr(base), render_expr(index)),
    }
}

fn prefix_op_str(op: &PrefixOp) -> &'static str {
    match op {
        PrefixOp::Neg => "-",
        PrefixOp::Not => "!",
        PrefixOp::Root => "sqrt ",
    }
}

fn postfix_op_str(op: &PostfixOp) -> &'static str {
    match op {
        PostfixOp::Inc => "++",
        PostfixOp::Dec => "--",
    }
}

fn infix_op_str(op: &InfixOp) -> &'static str {
    match op {
        InfixOp::Add => "+",
        InfixOp::Sub => "-",
        InfixOp::Mul => "*",
        InfixOp::Div => "/",
        InfixOp::Mod => "%",
        InfixOp::Pow => "**",
        InfixOp::Eq => "==",
        InfixOp::Ne => "!=",
        InfixOp::Lt => "<",
        InfixOp::Le => "<=",
        InfixOp::Gt => ">",
        InfixOp::Ge => ">=",
        InfixOp::Matches => "~=",
        InfixOp::NotMatches => "!~",
        InfixOp::Contains => "contains",
        InfixOp::Missing => "missing",
        InfixOp::In => "in",
    }
}
