//! Human-readable disassembly for the `bytecode` CLI subcommand and
//! `Engine::dump`.

use super::{read_u16, Chunk, Opcode};
use std::fmt::Write;

pub fn disassemble(chunk: &Chunk) -> String {
    let mut out = String::new();
    writeln!(out, "constants:").ok();
    for (i, c) in chunk.constants.iter().enumerate() {
        writeln!(out, "  [{i}] {}", c.inspect()).ok();
    }
    writeln!(out, "main:").ok();
    disassemble_code(&chunk.code, &mut out);
    for f in &chunk.functions {
        writeln!(out, "function {}({}):", f.name, f.params.join(", ")).ok();
        disassemble_code(&f.code, &mut out);
    }
    out
}

fn disassemble_code(code: &[u8], out: &mut String) {
    let mut pc = 0;
    while pc < code.len() {
        let Some(op) = Opcode::from_byte(code[pc]) else {
            writeln!(out, "  {pc:04} <bad opcode {}>", code[pc]).ok();
            pc += 1;
            continue;
        };
        if op.has_operand() {
            let operand = read_u16(code, pc + 1);
            writeln!(out, "  {pc:04} {:<14} {}", op.mnemonic(), operand).ok();
            pc += 3;
        } else {
            writeln!(out, "  {pc:04} {}", op.mnemonic()).ok();
            pc += 1;
        }
    }
}
