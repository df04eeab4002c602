//! The peephole rewrite rules themselves, run to a fixpoint by `mod.rs`'s
//! `optimize_code`. Every rule operates on a decoded instruction stream and
//! must leave jump targets addressable: a target that would land inside a
//! folded-away span blocks the fold rather than corrupting it.

use crate::bytecode::{emit_op, emit_op_u16, instruction_len, read_u16, patch_u16, Chunk, Opcode};
use crate::value::Value;
use std::collections::{HashMap, HashSet};

/// One decoded instruction, tagged with the byte offset it started at in
/// the *previous* iteration's code buffer — jump operands are always one of
/// these offsets (or the buffer's length, for an end-of-code target), which
/// is what makes the offset-remap below exact rather than heuristic.
struct Instr {
    old_offset: usize,
    op: Opcode,
    operand: u16,
}

/// Opcodes whose operand is itself a jump target rather than an index or
/// count: `JMP`/`JMP_IF_FALSE` obviously, and `ITER_NEXT`'s loop-exit offset.
fn carries_jump_target(op: Opcode) -> bool {
    matches!(op, Opcode::Jmp | Opcode::JmpIfFalse | Opcode::IterNext)
}

fn decode(code: &[u8]) -> Vec<Instr> {
    let mut out = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let op = Opcode::from_byte(code[pc]).expect("well-formed opcode stream");
        let operand = if op.has_operand() { read_u16(code, pc + 1) } else { 0 };
        out.push(Instr { old_offset: pc, op, operand });
        pc += instruction_len(code, pc);
    }
    out
}

fn jump_targets(instrs: &[Instr]) -> HashSet<usize> {
    instrs.iter().filter(|i| carries_jump_target(i.op)).map(|i| i.operand as usize).collect()
}

fn const_value(instr: &Instr, chunk: &Chunk) -> Option<Value> {
    match instr.op {
        Opcode::PushConst => chunk.constants.get(instr.operand as usize).cloned(),
        Opcode::PushTrue => Some(Value::Boolean(true)),
        Opcode::PushFalse => Some(Value::Boolean(false)),
        Opcode::PushNull => Some(Value::Null),
        _ => None,
    }
}

fn fold_binary(op: Opcode, a: &Value, b: &Value) -> Option<Value> {
    use crate::ops;
    match op {
        Opcode::Add => ops::add(a, b).ok(),
        Opcode::Sub => ops::sub(a, b).ok(),
        Opcode::Mul => ops::mul(a, b).ok(),
        Opcode::Div => ops::div(a, b).ok(),
        Opcode::Mod => ops::rem(a, b).ok(),
        Opcode::Pow => ops::pow(a, b).ok(),
        Opcode::Eq => ops::eq(a, b).ok(),
        Opcode::Ne => ops::ne(a, b).ok(),
        Opcode::Lt => ops::lt(a, b).ok(),
        Opcode::Le => ops::le(a, b).ok(),
        Opcode::Gt => ops::gt(a, b).ok(),
        Opcode::Ge => ops::ge(a, b).ok(),
        _ => None,
    }
}

fn fold_unary(op: Opcode, a: &Value) -> Option<Value> {
    match op {
        Opcode::Neg => crate::ops::neg(a).ok(),
        Opcode::Not => Some(crate::ops::not(a)),
        Opcode::Root => crate::ops::root(a).ok(),
        _ => None,
    }
}

/// Emits one instruction's bytes. Jump-target operands are written through
/// verbatim (they are old-buffer offsets, fixed up in a second walk once
/// the whole new buffer exists); every other operand is already final.
fn emit_instr(out: &mut Vec<u8>, op: Opcode, operand: u16) {
    if op.has_operand() {
        emit_op_u16(out, op, operand);
    } else {
        emit_op(out, op);
    }
}

/// Runs one rewrite pass over `code`, returning the new bytes and whether
/// anything changed. `chunk` supplies the constant pool for reading operands
/// of `PUSH_CONST` and for interning newly-folded constants.
pub fn run_pass(code: &[u8], chunk: &mut Chunk) -> (Vec<u8>, bool) {
    let instrs = decode(code);
    let targets = jump_targets(&instrs);
    let mut new_code = Vec::new();
    let mut offset_map: HashMap<usize, usize> = HashMap::new();
    let mut changed = false;

    let mut i = 0;
    while i < instrs.len() {
        let start_new_offset = new_code.len();
        let mut consumed = 1usize;

        // Binary constant fold: const, const, binary-op.
        if i + 2 < instrs.len() {
            let (a, b, opi) = (&instrs[i], &instrs[i + 1], &instrs[i + 2]);
            if !targets.contains(&b.old_offset) && !targets.contains(&opi.old_offset) {
                if let (Some(av), Some(bv)) = (const_value(a, chunk), const_value(b, chunk)) {
                    if let Some(folded) = fold_binary(opi.op, &av, &bv) {
                        let k = chunk.intern_constant(folded);
                        emit_instr(&mut new_code, Opcode::PushConst, k);
                        consumed = 3;
                        changed = true;
                        for j in 0..consumed {
                            offset_map.insert(instrs[i + j].old_offset, start_new_offset);
                        }
                        i += consumed;
                        continue;
                    }
                }
            }
        }

        // Unary constant fold: const, unary-op.
        if consumed == 1 && i + 1 < instrs.len() {
            let (a, opi) = (&instrs[i], &instrs[i + 1]);
            if !targets.contains(&opi.old_offset) {
                if let Some(av) = const_value(a, chunk) {
                    if let Some(folded) = fold_unary(opi.op, &av) {
                        let k = chunk.intern_constant(folded);
                        emit_instr(&mut new_code, Opcode::PushConst, k);
                        consumed = 2;
                        changed = true;
                        for j in 0..consumed {
                            offset_map.insert(instrs[i + j].old_offset, start_new_offset);
                        }
                        i += consumed;
                        continue;
                    }
                }
            }
        }

        // A provably-true/false condition resolves its JMP_IF_FALSE at
        // compile time: dropped entirely when always-taken-through, turned
        // into an unconditional JMP when always-taken.
        if consumed == 1 && i + 1 < instrs.len() {
            let (a, opi) = (&instrs[i], &instrs[i + 1]);
            if opi.op == Opcode::JmpIfFalse && !targets.contains(&opi.old_offset) {
                if let Some(av) = const_value(a, chunk) {
                    consumed = 2;
                    changed = true;
                    if av.truthy() {
                        // condition always true: JMP_IF_FALSE never taken, falls through.
                    } else {
                        emit_instr(&mut new_code, Opcode::Jmp, opi.operand);
                    }
                    for j in 0..consumed {
                        offset_map.insert(instrs[i + j].old_offset, start_new_offset);
                    }
                    i += consumed;
                    continue;
                }
            }
        }

        // An unconditional JMP to the very next instruction is a no-op.
        if consumed == 1 && instrs[i].op == Opcode::Jmp && i + 1 < instrs.len() {
            if instrs[i].operand as usize == instrs[i + 1].old_offset {
                changed = true;
                offset_map.insert(instrs[i].old_offset, start_new_offset);
                i += 1;
                continue;
            }
        }

        // Fallback: copy this instruction through unchanged.
        emit_instr(&mut new_code, instrs[i].op, instrs[i].operand);

        // Code immediately following an unconditional RETURN/HALT is
        // unreachable unless something jumps into it; strip it up to the
        // next live jump target.
        if matches!(instrs[i].op, Opcode::Return | Opcode::Halt) {
            let mut j = i + 1;
            while j < instrs.len() && !targets.contains(&instrs[j].old_offset) {
                offset_map.insert(instrs[j].old_offset, new_code.len());
                changed = true;
                j += 1;
            }
            consumed = j - i;
        }

        offset_map.insert(instrs[i].old_offset, start_new_offset);
        i += consumed;
    }
    offset_map.insert(code.len(), new_code.len());

    // Second walk: translate every jump-target operand now that the full
    // new buffer (and thus every old-offset's new position) is known.
    let mut pc = 0;
    while pc < new_code.len() {
        let op = Opcode::from_byte(new_code[pc]).expect("well-formed opcode stream");
        if carries_jump_target(op) {
            let old_target = read_u16(&new_code, pc + 1) as usize;
            let new_target = *offset_map.get(&old_target).expect("jump target is a known instruction boundary");
            patch_u16(&mut new_code, pc + 1, new_target as u16);
        }
        pc += instruction_len(&new_code, pc);
    }

    (new_code, changed)
}
