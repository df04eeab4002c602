//! C6: walks the AST once, emitting opcodes and interning constants into a
//! growing [`Chunk`]. Forward jumps are emitted with a placeholder operand
//! and patched once their target offset is known.
//!
//! Identifier resolution is static, decided here rather than at run time:
//! inside a function body, a name bound by a parameter or a `local`
//! declaration compiles to `LOAD_LOCAL`/`STORE_LOCAL`; every other name
//! compiles to `LOAD_GLOBAL`/`STORE_GLOBAL`, matching the split between
//! index-addressed call frames and the name-addressed global scope in
//! `environment` (see that module's doc comment).

use crate::ast::{Expr, InfixOp, PostfixOp, PrefixOp, Program, Stmt, SwitchCase};
use crate::bytecode::{emit_op, emit_op_u16, patch_u16, Chunk, FunctionProto, Opcode};
use crate::error::CompileError;
use crate::value::Value;
use std::collections::HashSet;

type CResult<T> = Result<T, CompileError>;

/// Per-function local symbol table; absent while compiling the top-level
/// script, present (and swapped in) for the duration of one function body.
struct Locals {
    slots: Vec<String>,
}

impl Locals {
    fn new(params: &[String]) -> Self {
        Self { slots: params.to_vec() }
    }

    fn resolve(&self, name: &str) -> Option<u16> {
        self.slots.iter().position(|s| s == name).map(|i| i as u16)
    }

    /// Declares a new local, reusing the existing slot if already declared
    /// (re-declaration is not an error; it simply resets nothing until the
    /// next assignment runs).
    fn declare(&mut self, name: &str) -> u16 {
        if let Some(slot) = self.resolve(name) {
            return slot;
        }
        self.slots.push(name.to_string());
        (self.slots.len() - 1) as u16
    }
}

pub struct Compiler {
    chunk: Chunk,
    locals: Option<Locals>,
    function_names: HashSet<String>,
    scratch_counter: u32,
}

impl Compiler {
    pub fn new() -> Self {
        Self { chunk: Chunk::default(), locals: None, function_names: HashSet::new(), scratch_counter: 0 }
    }

    /// Compiles a whole program to a [`Chunk`]. Function definitions are
    /// hoisted to the function table before the main body compiles, so
    /// forward calls resolve.
    pub fn compile(program: &Program) -> CResult<Chunk> {
        let mut compiler = Compiler::new();
        for stmt in &program.statements {
            if let Stmt::FunctionDef { name, .. } = stmt {
                if !compiler.function_names.insert(name.clone()) {
                    return Err(CompileError::new(format!("duplicate function '{name}'"), stmt_pos(stmt)));
                }
            }
        }
        for stmt in &program.statements {
            if let Stmt::FunctionDef { name, params, body, pos } = stmt {
                compiler.compile_function(name, params, body, *pos)?;
            }
        }
        let mut main_code = Vec::new();
        for stmt in &program.statements {
            if !matches!(stmt, Stmt::FunctionDef { .. }) {
                compiler.compile_stmt(&mut main_code, stmt)?;
            }
        }
        emit_op(&mut main_code, Opcode::PushVoid);
        emit_op(&mut main_code, Opcode::Halt);
        compiler.chunk.code = main_code;
        Ok(compiler.chunk)
    }

    fn compile_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &[Stmt],
        pos: crate::error::Position,
    ) -> CResult<()> {
        let saved = self.locals.replace(Locals::new(params));
        let mut code = Vec::new();
        for stmt in body {
            self.compile_stmt(&mut code, stmt)?;
        }
        emit_op(&mut code, Opcode::PushVoid);
        emit_op(&mut code, Opcode::Return);
        let local_count = self.locals.as_ref().unwrap().slots.len();
        self.locals = saved;
        let _ = pos;
        self.chunk.functions.push(FunctionProto {
            name: name.to_string(),
            params: params.to_vec(),
            code,
            local_count,
        });
        Ok(())
    }

    // ---- statements ------------------------------------------------------

    fn compile_stmt(&mut self, code: &mut Vec<u8>, stmt: &Stmt) -> CResult<()> {
        match stmt {
            Stmt::Expr(expr) => {
                self.compile_expr(code, expr)?;
                // Every expression statement pushes exactly one value, and
                // there is no POP opcode to discard it; the compiler
                // never emits a bare expression statement result without a
                // later consumer other than leaving it as the implicit
                // "most recent pushed value" at the base of each statement
                // boundary. To keep the operand stack from growing without
                // bound across a block of expression statements, each
                // statement's result is folded back down via STORE_GLOBAL
                // into a reserved scratch slot that is never read.
                let scratch = self.chunk.globals.intern("$scratch");
                emit_op_u16(code, Opcode::StoreGlobal, scratch);
                Ok(())
            }
            Stmt::Local { name, .. } => {
                if let Some(locals) = &mut self.locals {
                    locals.declare(name);
                } else {
                    return Err(CompileError::new(
                        "'local' is only legal inside a function body",
                        stmt_pos(stmt),
                    ));
                }
                Ok(())
            }
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.compile_expr(code, cond)?;
                let jmp_false_at = emit_op_u16(code, Opcode::JmpIfFalse, 0);
                for s in then_branch {
                    self.compile_stmt(code, s)?;
                }
                match else_branch {
                    Some(else_stmts) => {
                        let jmp_end_at = emit_op_u16(code, Opcode::Jmp, 0);
                        let else_start = code.len() as u16;
                        patch_u16(code, jmp_false_at, else_start);
                        for s in else_stmts {
                            self.compile_stmt(code, s)?;
                        }
                        let end = code.len() as u16;
                        patch_u16(code, jmp_end_at, end);
                    }
                    None => {
                        let end = code.len() as u16;
                        patch_u16(code, jmp_false_at, end);
                    }
                }
                Ok(())
            }
            Stmt::While { cond, body, .. } => {
                let loop_start = code.len() as u16;
                self.compile_expr(code, cond)?;
                let jmp_false_at = emit_op_u16(code, Opcode::JmpIfFalse, 0);
                for s in body {
                    self.compile_stmt(code, s)?;
                }
                emit_op_u16(code, Opcode::Jmp, loop_start);
                let end = code.len() as u16;
                patch_u16(code, jmp_false_at, end);
                Ok(())
            }
            Stmt::Foreach { index_binding, value_binding, iterable, body, .. } => {
                self.compile_expr(code, iterable)?;
                emit_op(code, Opcode::IterNew);
                let loop_start = code.len() as u16;
                let iter_next_at = emit_op_u16(code, Opcode::IterNext, 0);
                // ITER_NEXT pushes key then value; bind value first (top of
                // stack), then key, so both pops land in declaration order.
                self.compile_store_name(code, value_binding);
                let key_name = index_binding.clone().unwrap_or_else(|| "$discard".to_string());
                self.compile_store_name(code, &key_name);
                for s in body {
                    self.compile_stmt(code, s)?;
                }
                emit_op_u16(code, Opcode::Jmp, loop_start);
                let end = code.len() as u16;
                patch_u16(code, iter_next_at, end);
                Ok(())
            }
            Stmt::Switch { subject, cases, default, .. } => self.compile_switch(code, subject, cases, default),
            Stmt::FunctionDef { .. } => Ok(()), // already hoisted to the function table
            Stmt::Return { value, .. } => {
                match value {
                    Some(expr) => self.compile_expr(code, expr)?,
                    None => {
                        emit_op(code, Opcode::PushVoid);
                    }
                }
                emit_op(code, Opcode::Return);
                Ok(())
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.compile_stmt(code, s)?;
                }
                Ok(())
            }
        }
    }

    fn compile_switch(
        &mut self,
        code: &mut Vec<u8>,
        subject: &Expr,
        cases: &[SwitchCase],
        default: &Option<Vec<Stmt>>,
    ) -> CResult<()> {
        self.compile_expr(code, subject)?;
        let subject_slot = self.declare_scratch_local();
        self.compile_store_slot(code, subject_slot);
        let mut end_jumps = Vec::new();
        for case in cases {
            // Each match alternative is checked in turn: a failed check
            // falls through to the next alternative's check (or, for the
            // last alternative, to the next case); a successful non-last
            // check jumps straight into the body once its offset is known.
            let mut case_fail_jumps = Vec::new();
            let mut matched_jumps = Vec::new();
            for (i, m) in case.matches.iter().enumerate() {
                self.load_slot(code, subject_slot);
                self.compile_expr(code, m)?;
                emit_op(code, Opcode::Eq);
                let fail_jmp = emit_op_u16(code, Opcode::JmpIfFalse, 0);
                if i + 1 == case.matches.len() {
                    case_fail_jumps.push(fail_jmp);
                } else {
                    let matched_jmp = emit_op_u16(code, Opcode::Jmp, 0);
                    matched_jumps.push(matched_jmp);
                    let next_check = code.len() as u16;
                    patch_u16(code, fail_jmp, next_check);
                }
            }
            let body_entry = code.len() as u16;
            for at in matched_jumps {
                patch_u16(code, at, body_entry);
            }
            for s in &case.body {
                self.compile_stmt(code, s)?;
            }
            let end_jmp = emit_op_u16(code, Opcode::Jmp, 0);
            end_jumps.push(end_jmp);
            let next_case = code.len() as u16;
            for at in case_fail_jumps {
                patch_u16(code, at, next_case);
            }
        }
        if let Some(default_body) = default {
            for s in default_body {
                self.compile_stmt(code, s)?;
            }
        }
        let end = code.len() as u16;
        for at in end_jumps {
            patch_u16(code, at, end);
        }
        Ok(())
    }

    // ---- expressions -------------------------------------------------

    fn compile_expr(&mut self, code: &mut Vec<u8>, expr: &Expr) -> CResult<()> {
        match expr {
            Expr::Literal { value, .. } => {
                self.push_const(code, value.clone());
                Ok(())
            }
            Expr::Ident { name, .. } => {
                self.compile_load_name(code, name);
                Ok(())
            }
            Expr::HostVar { name, .. } => {
                let k = self.chunk.intern_constant(Value::string(name.clone()));
                emit_op_u16(code, Opcode::LoadField, k);
                Ok(())
            }
            Expr::Array { elements, .. } => {
                for e in elements {
                    self.compile_expr(code, e)?;
                }
                emit_op_u16(code, Opcode::MakeArray, elements.len() as u16);
                Ok(())
            }
            Expr::HashLit { entries, .. } => {
                for (k, v) in entries {
                    self.compile_expr(code, k)?;
                    self.compile_expr(code, v)?;
                }
                emit_op_u16(code, Opcode::MakeHash, entries.len() as u16);
                Ok(())
            }
            Expr::Prefix { op, expr, .. } => {
                self.compile_expr(code, expr)?;
                match op {
                    PrefixOp::Neg => emit_op(code, Opcode::Neg),
                    PrefixOp::Not => emit_op(code, Opcode::Not),
                    PrefixOp::Root => emit_op(code, Opcode::Root),
                };
                Ok(())
            }
            Expr::Infix { op, left, right, .. } => self.compile_infix(code, op, left, right),
            Expr::Postfix { op, target, .. } => {
                // load, push 1, add/sub, store — net result is the
                // pre-increment value, obtained via a second, side-effect-free
                // LOAD rather than a DUP (the opcode set has none).
                self.compile_load_name(code, target);
                self.compile_load_name(code, target);
                self.push_const(code, Value::Integer(1));
                match op {
                    PostfixOp::Inc => emit_op(code, Opcode::Add),
                    PostfixOp::Dec => emit_op(code, Opcode::Sub),
                };
                self.compile_store_name(code, target);
                Ok(())
            }
            Expr::Ternary { cond, then_branch, else_branch, .. } => {
                self.compile_expr(code, cond)?;
                let jmp_false_at = emit_op_u16(code, Opcode::JmpIfFalse, 0);
                self.compile_expr(code, then_branch)?;
                let jmp_end_at = emit_op_u16(code, Opcode::Jmp, 0);
                let else_start = code.len() as u16;
                patch_u16(code, jmp_false_at, else_start);
                self.compile_expr(code, else_branch)?;
                let end = code.len() as u16;
                patch_u16(code, jmp_end_at, end);
                Ok(())
            }
            Expr::Assign { name, value, .. } => {
                // STORE pops; reload the name afterward so an assignment
                // used as a sub-expression (e.g. `x = (y = 5) + 1`) still
                // yields its stored value, matching every other expression
                // form.
                self.compile_expr(code, value)?;
                self.compile_store_name(code, name);
                self.compile_load_name(code, name);
                Ok(())
            }
            Expr::IndexAssign { base, index, value, .. } => {
                // STORE_INDEX consumes base/index/value and leaves nothing,
                // but an assignment expression must still yield a value
                // (for chained uses like `x = a[0] = 5`). Evaluate `value`
                // once into a scratch slot, rather than compiling it twice
                // and risking a double side effect, then reload it around
                // the store.
                self.compile_expr(code, base)?;
                self.compile_expr(code, index)?;
                self.compile_expr(code, value)?;
                let scratch = self.declare_scratch_local();
                self.compile_store_slot(code, scratch);
                self.load_slot(code, scratch);
                emit_op(code, Opcode::StoreIndex);
                self.load_slot(code, scratch);
                Ok(())
            }
            Expr::Call { name, args, .. } => {
                let k = self.chunk.intern_constant(Value::string(name.clone()));
                emit_op_u16(code, Opcode::PushConst, k);
                for a in args {
                    self.compile_expr(code, a)?;
                }
                emit_op_u16(code, Opcode::Call, args.len() as u16);
                Ok(())
            }
            Expr::Index { base, index, .. } => {
                self.compile_expr(code, base)?;
                self.compile_expr(code, index)?;
                emit_op(code, Opcode::LoadIndex);
                Ok(())
            }
        }
    }

    fn compile_infix(&mut self, code: &mut Vec<u8>, op: &InfixOp, left: &Expr, right: &Expr) -> CResult<()> {
        // Short-circuit operators lower to jumps rather than to the AND/OR
        // opcodes, which the VM still implements for completeness but which
        // this compiler never emits: true short-circuiting requires
        // skipping evaluation of the right operand entirely.
        match op {
            InfixOp::And => {
                self.compile_expr(code, left)?;
                let jmp_false_at = emit_op_u16(code, Opcode::JmpIfFalse, 0);
                self.compile_expr(code, right)?;
                let jmp_end_at = emit_op_u16(code, Opcode::Jmp, 0);
                let false_branch = code.len() as u16;
                patch_u16(code, jmp_false_at, false_branch);
                self.push_const(code, Value::Boolean(false));
                let end = code.len() as u16;
                patch_u16(code, jmp_end_at, end);
                return Ok(());
            }
            InfixOp::Or => {
                self.compile_expr(code, left)?;
                let jmp_false_at = emit_op_u16(code, Opcode::JmpIfFalse, 0);
                self.push_const(code, Value::Boolean(true));
                let jmp_end_at = emit_op_u16(code, Opcode::Jmp, 0);
                let right_branch = code.len() as u16;
                patch_u16(code, jmp_false_at, right_branch);
                self.compile_expr(code, right)?;
                let end = code.len() as u16;
                patch_u16(code, jmp_end_at, end);
                return Ok(());
            }
            _ => {}
        }
        self.compile_expr(code, left)?;
        self.compile_expr(code, right)?;
        let opcode = match op {
            InfixOp::Add => Opcode::Add,
            InfixOp::Sub => Opcode::Sub,
            InfixOp::Mul => Opcode::Mul,
            InfixOp::Div => Opcode::Div,
            InfixOp::Mod => Opcode::Mod,
            InfixOp::Pow => Opcode::Pow,
            InfixOp::Eq => Opcode::Eq,
            InfixOp::Ne => Opcode::Ne,
            InfixOp::Lt => Opcode::Lt,
            InfixOp::Le => Opcode::Le,
            InfixOp::Gt => Opcode::Gt,
            InfixOp::Ge => Opcode::Ge,
            InfixOp::Matches => Opcode::Matches,
            InfixOp::NotMatches => Opcode::NotMatches,
            InfixOp::Contains => Opcode::Contains,
            InfixOp::Missing => Opcode::Missing,
            InfixOp::In => Opcode::In,
            InfixOp::And | InfixOp::Or => unreachable!("handled above"),
        };
        emit_op(code, opcode);
        Ok(())
    }

    // ---- name resolution -----------------------------------------------

    fn compile_load_name(&mut self, code: &mut Vec<u8>, name: &str) {
        if let Some(locals) = &self.locals {
            if let Some(slot) = locals.resolve(name) {
                emit_op_u16(code, Opcode::LoadLocal, slot);
                return;
            }
        }
        let k = self.chunk.globals.intern(name);
        emit_op_u16(code, Opcode::LoadGlobal, k);
    }

    fn compile_store_name(&mut self, code: &mut Vec<u8>, name: &str) {
        if let Some(locals) = &self.locals {
            if let Some(slot) = locals.resolve(name) {
                emit_op_u16(code, Opcode::StoreLocal, slot);
                return;
            }
        }
        let k = self.chunk.globals.intern(name);
        emit_op_u16(code, Opcode::StoreGlobal, k);
    }

    /// Allocates a fresh throwaway slot used to hold an intermediate value
    /// across instructions that would otherwise need a `DUP` (there is
    /// none): the switch subject, and the evaluated RHS of an index
    /// assignment. Each call gets a name stamped with a monotonically
    /// increasing counter so nested uses (e.g. an index assignment inside a
    /// switch case, itself inside another switch) never alias the same
    /// slot while one is still live.
    fn declare_scratch_local(&mut self) -> ScratchSlot {
        let name = format!("$scratch{}", self.scratch_counter);
        self.scratch_counter += 1;
        match &mut self.locals {
            Some(locals) => ScratchSlot::Local(locals.declare(&name)),
            None => ScratchSlot::Global(self.chunk.globals.intern(&name)),
        }
    }

    fn compile_store_slot(&mut self, code: &mut Vec<u8>, slot: ScratchSlot) {
        match slot {
            ScratchSlot::Local(s) => {
                emit_op_u16(code, Opcode::StoreLocal, s);
            }
            ScratchSlot::Global(s) => {
                emit_op_u16(code, Opcode::StoreGlobal, s);
            }
        }
    }

    fn load_slot(&mut self, code: &mut Vec<u8>, slot: ScratchSlot) {
        match slot {
            ScratchSlot::Local(s) => {
                emit_op_u16(code, Opcode::LoadLocal, s);
            }
            ScratchSlot::Global(s) => {
                emit_op_u16(code, Opcode::LoadGlobal, s);
            }
        }
    }

    fn push_const(&mut self, code: &mut Vec<u8>, value: Value) {
        let k = self.chunk.intern_constant(value);
        emit_op_u16(code, Opcode::PushConst, k);
    }
}

#[derive(Clone, Copy)]
enum ScratchSlot {
    Local(u16),
    Global(u16),
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn stmt_pos(stmt: &Stmt) -> crate::error::Position {
    match stmt {
        Stmt::Expr(e) => e.pos(),
        Stmt::Local { pos, .. }
        | Stmt::If { pos, .. }
        | Stmt::While { pos, .. }
        | Stmt::Foreach { pos, .. }
        | Stmt::Switch { pos, .. }
        | Stmt::FunctionDef { pos, .. }
        | Stmt::Return { pos, .. } => *pos,
        Stmt::Block(stmts) => stmts.first().map(stmt_pos).unwrap_or_default(),
    }
}

pub fn compile(program: &Program) -> CResult<Chunk> {
    Compiler::compile(program)
}
