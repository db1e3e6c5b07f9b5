//! [`Chunk`] disassembling support.

use crate::chunk::{Chunk, OpCode};
use console::style;
use num_traits::FromPrimitive;
use std::fmt;

impl Chunk {
    /// Disassemble an instruction whose operands are all registers.
    fn register_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        offset: usize,
        operands: usize,
        msg: &str,
    ) -> Result<usize, fmt::Error> {
        let registers = (0..operands)
            .map(|i| format!("r{}", self.read_u16(offset + 1 + 2 * i)))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "{:<14} {} {}", name, registers, msg)?;
        Ok(offset + 1 + 2 * operands)
    }

    /// Disassemble `ldc` (5 bytes) instruction.
    fn constant_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        offset: usize,
        msg: &str,
    ) -> Result<usize, fmt::Error> {
        let dst = self.read_u16(offset + 1);
        let constant_index = self.read_u16(offset + 3);
        match self.constants.get(constant_index as usize) {
            Some(constant) => writeln!(
                f,
                "{:<14} r{}, {:<3} (value = {}) {}",
                name, dst, constant_index, constant, msg
            )?,
            None => writeln!(f, "{:<14} r{}, {:<3} (invalid) {}", name, dst, constant_index, msg)?,
        }
        Ok(offset + 5)
    }

    /// Disassemble `call` (7 bytes) instruction.
    fn call_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        offset: usize,
        msg: &str,
    ) -> Result<usize, fmt::Error> {
        let dst = self.read_u16(offset + 1);
        let import = self.read_u16(offset + 3);
        let first_arg = self.read_u16(offset + 5);
        match self.imports.get(import as usize) {
            Some(import) => writeln!(
                f,
                "{:<14} r{}, @{}/{} (args from r{}) {}",
                name, dst, import.name, import.arity, first_arg, msg
            )?,
            None => writeln!(f, "{:<14} r{}, <invalid import {}> {}", name, dst, import, msg)?,
        }
        Ok(offset + 7)
    }

    /// Disassembles `jmp` (3 bytes) and `jmp_if_false` (5 bytes) instructions.
    fn jmp_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        offset: usize,
        conditional: bool,
        msg: &str,
    ) -> Result<usize, fmt::Error> {
        if conditional {
            let cond = self.read_u16(offset + 1);
            let target = self.read_u16(offset + 3);
            writeln!(f, "{:<14} r{}, {:04} {}", name, cond, target, msg)?;
            Ok(offset + 5)
        } else {
            let target = self.read_u16(offset + 1);
            writeln!(f, "{:<14} {:04} {}", name, target, msg)?;
            Ok(offset + 3)
        }
    }

    /// Disassembles the instruction at the given `offset`.
    fn disassemble_instr(
        &self,
        f: &mut fmt::Formatter<'_>,
        offset: usize,
    ) -> Result<usize, fmt::Error> {
        write!(f, "{:04} ", style(offset).black().bright())?;

        let instr = self.code[offset];
        let blank_msg = String::new();
        let msg = &format!(
            "{}",
            style(
                self.debug_annotations
                    .get(&offset)
                    .map(|string| format!("// {}", string))
                    .unwrap_or(blank_msg),
            )
            .color256(29) // dark green
        );

        let opcode = match OpCode::from_u8(instr) {
            Some(opcode) => opcode,
            None => {
                writeln!(f, "invalid {}", msg)?;
                return Ok(offset + 1); // skip bad instruction
            }
        };
        // a truncated instruction would read past the end
        if offset + 1 + 2 * opcode.operand_count() > self.code.len() {
            writeln!(f, "truncated {:?} {}", opcode, msg)?;
            return Ok(self.code.len());
        }

        match opcode {
            OpCode::Ldc => self.constant_instr(f, "ldc", offset, msg),
            OpCode::Mov => self.register_instr(f, "mov", offset, 2, msg),
            OpCode::Add => self.register_instr(f, "add", offset, 3, msg),
            OpCode::Sub => self.register_instr(f, "sub", offset, 3, msg),
            OpCode::Mul => self.register_instr(f, "mul", offset, 3, msg),
            OpCode::Div => self.register_instr(f, "div", offset, 3, msg),
            OpCode::Lt => self.register_instr(f, "lt", offset, 3, msg),
            OpCode::Ne => self.register_instr(f, "ne", offset, 3, msg),
            OpCode::Jmp => self.jmp_instr(f, "jmp", offset, false, msg),
            OpCode::JmpIfFalse => self.jmp_instr(f, "jmp_if_false", offset, true, msg),
            OpCode::Call => self.call_instr(f, "call", offset, msg),
            OpCode::Ret => self.register_instr(f, "ret", offset, 1, msg),
        } // returns the next ip
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ({} registers) ==", self.name, self.register_count)?;

        let mut offset = 0;
        while offset < self.code.len() {
            offset = self.disassemble_instr(f, offset)?;
        }

        Ok(())
    }
}
