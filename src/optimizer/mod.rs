//! C7: a peephole optimizer run over a compiled [`Chunk`] before execution,
//! disableable via an engine flag. Runs constant folding and dead
//! jump/code elimination to a fixpoint, independently over the main script
//! body and every user function's body — each has its own jump-offset
//! space, so they're rewritten one at a time.

mod passes;

use crate::bytecode::Chunk;

/// Caps the fixpoint loop so a bug in a rewrite rule can't spin forever;
/// every successful rewrite strictly shrinks the buffer, so this is never
/// hit in practice for chunks smaller than 64 KiB of bytecode.
const MAX_ITERATIONS: usize = 64;

enum CodeTarget {
    Main,
    Function(usize),
}

impl CodeTarget {
    fn stash(&self, chunk: &mut Chunk, code: Vec<u8>) {
        match self {
            CodeTarget::Main => chunk.code = code,
            CodeTarget::Function(i) => chunk.functions[*i].code = code,
        }
    }
}

fn optimize_code(mut code: Vec<u8>, chunk: &mut Chunk) -> Vec<u8> {
    for _ in 0..MAX_ITERATIONS {
        let (next, changed) = passes::run_pass(&code, chunk);
        code = next;
        if !changed {
            break;
        }
    }
    code
}

fn optimize_code_traced(
    mut code: Vec<u8>,
    chunk: &mut Chunk,
    target: &CodeTarget,
    on_pass: &mut impl FnMut(&Chunk),
) -> Vec<u8> {
    for _ in 0..MAX_ITERATIONS {
        let (next, changed) = passes::run_pass(&code, chunk);
        code = next;
        target.stash(chunk, code.clone());
        on_pass(chunk);
        if !changed {
            break;
        }
    }
    code
}

/// Optimizes `chunk` in place.
pub fn optimize(chunk: &mut Chunk) {
    let main_code = std::mem::take(&mut chunk.code);
    chunk.code = optimize_code(main_code, chunk);

    for i in 0..chunk.functions.len() {
        let body = std::mem::take(&mut chunk.functions[i].code);
        let optimized = optimize_code(body, chunk);
        chunk.functions[i].code = optimized;
    }
}

/// Like [`optimize`], but invokes `on_pass(chunk)` after every peephole pass
/// over the main body and every function body, with `chunk` reflecting the
/// bytecode as rewritten so far. Backs the `--show-optimizer` CLI flag,
/// which disassembles the program between each pass rather than only
/// before and after the whole fixpoint loop.
pub fn optimize_with_trace(chunk: &mut Chunk, mut on_pass: impl FnMut(&Chunk)) {
    let main_code = std::mem::take(&mut chunk.code);
    chunk.code = optimize_code_traced(main_code, chunk, &CodeTarget::Main, &mut on_pass);

    for i in 0..chunk.functions.len() {
        let body = std::mem::take(&mut chunk.functions[i].code);
        chunk.functions[i].code = optimize_code_traced(body, chunk, &CodeTarget::Function(i), &mut on_pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{disassemble, emit_op, emit_op_u16, patch_u16, Opcode};
    use crate::value::Value;

    #[test]
    fn folds_constant_arithmetic() {
        let mut chunk = Chunk::default();
        let a = chunk.intern_constant(Value::Integer(1));
        let b = chunk.intern_constant(Value::Integer(2));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, a);
        emit_op_u16(&mut chunk.code, Opcode::PushConst, b);
        emit_op(&mut chunk.code, Opcode::Add);
        emit_op(&mut chunk.code, Opcode::Halt);

        optimize(&mut chunk);

        assert_eq!(chunk.code.len(), 4); // PUSH_CONST k (3 bytes) + HALT (1 byte)
        assert_eq!(Opcode::from_byte(chunk.code[0]), Some(Opcode::PushConst));
        let idx = u16::from_le_bytes([chunk.code[1], chunk.code[2]]);
        assert_eq!(chunk.constants[idx as usize], Value::Integer(3));
    }

    #[test]
    fn drops_dead_code_after_return() {
        let mut chunk = Chunk::default();
        emit_op(&mut chunk.code, Opcode::PushVoid);
        emit_op(&mut chunk.code, Opcode::Return);
        emit_op(&mut chunk.code, Opcode::PushVoid); // unreachable
        emit_op(&mut chunk.code, Opcode::Halt); // unreachable

        optimize(&mut chunk);

        assert_eq!(chunk.code.len(), 2); // PUSH_VOID + RETURN only
    }

    #[test]
    fn preserves_jump_into_dead_region() {
        let mut chunk = Chunk::default();
        // An earlier jump skips this Return block and lands exactly on the
        // PUSH_NULL right after it — which must survive dead-code-after-
        // RETURN elimination precisely because it's a live jump target.
        let jmp_at = emit_op_u16(&mut chunk.code, Opcode::Jmp, 0);
        emit_op(&mut chunk.code, Opcode::PushVoid);
        emit_op(&mut chunk.code, Opcode::Return);
        let target_at = chunk.code.len();
        patch_u16(&mut chunk.code, jmp_at, target_at as u16);
        emit_op(&mut chunk.code, Opcode::PushNull);
        emit_op(&mut chunk.code, Opcode::Halt);

        optimize(&mut chunk);

        let text = disassemble(&chunk);
        assert!(text.contains("PUSH_NULL"));
        assert!(text.contains("HALT"));
    }

    #[test]
    fn resolves_constant_condition() {
        let mut chunk = Chunk::default();
        emit_op(&mut chunk.code, Opcode::PushTrue);
        let jmp_false_at = emit_op_u16(&mut chunk.code, Opcode::JmpIfFalse, 0);
        emit_op(&mut chunk.code, Opcode::PushVoid);
        emit_op(&mut chunk.code, Opcode::Return);
        let end = chunk.code.len() as u16;
        patch_u16(&mut chunk.code, jmp_false_at, end);
        emit_op(&mut chunk.code, Opcode::Halt);

        optimize(&mut chunk);

        // PUSH_TRUE and the now-never-taken JMP_IF_FALSE both disappear.
        assert!(!disassemble(&chunk).contains("JMP_IF_FALSE"));
    }

    #[test]
    fn trace_reports_one_snapshot_per_pass() {
        let mut chunk = Chunk::default();
        let a = chunk.intern_constant(Value::Integer(1));
        let b = chunk.intern_constant(Value::Integer(2));
        emit_op_u16(&mut chunk.code, Opcode::PushConst, a);
        emit_op_u16(&mut chunk.code, Opcode::PushConst, b);
        emit_op(&mut chunk.code, Opcode::Add);
        emit_op(&mut chunk.code, Opcode::Halt);

        let mut snapshots = Vec::new();
        optimize_with_trace(&mut chunk, |snapshot| snapshots.push(disassemble(snapshot)));

        assert!(!snapshots.is_empty());
        // The final snapshot the callback saw already folded the constant add.
        assert_eq!(snapshots.last().unwrap(), &disassemble(&chunk));
        assert_eq!(chunk.code.len(), 4); // PUSH_CONST k (3 bytes) + HALT (1 byte)
    }
}
