//! Lowers an IR function into a bytecode [`Chunk`].
//!
//! Registers are laid out as arguments, used stack slots, constants, instruction results, then
//! scratch registers for call arguments and phi copies. Constants are loaded once in a prologue.
//! Phis are replaced by copies on the edges that flow into their block.

use crate::error::LinkError;
use kalei_value::chunk::{Chunk, OpCode};
use kalei_value::ir::{
    BinaryOp, BlockId, CmpPredicate, Function, InstKind, Operand, SlotId, Terminator,
};
use std::collections::HashMap;
use std::convert::TryFrom;

/// Assigns a register to every value of the function.
struct Registers {
    slots: HashMap<SlotId, u16>,
    /// Keyed by the bits of the constant.
    constants: HashMap<u64, u16>,
    results: Vec<Option<u16>>,
    call_scratch: u16,
    phi_scratch: u16,
    count: u16,
}

impl Registers {
    fn operand(&self, operand: Operand) -> u16 {
        match operand {
            Operand::Inst(inst) => self.results[inst.0].unwrap_or(0),
            Operand::Arg(index) => index as u16,
            Operand::Const(value) => self.constants[&value.to_bits()],
            Operand::Bool(value) => self.constants[&bool_value(value).to_bits()],
        }
    }
}

fn bool_value(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn constant_of(operand: Operand) -> Option<f64> {
    match operand {
        Operand::Const(value) => Some(value),
        Operand::Bool(value) => Some(bool_value(value)),
        _ => None,
    }
}

struct Lowering<'f> {
    function: &'f Function,
    chunk: Chunk,
    registers: Registers,
    block_offsets: HashMap<BlockId, usize>,
    /// Operand offsets of jumps to blocks, patched once every block is placed.
    fixups: Vec<(usize, BlockId)>,
}

impl<'f> Lowering<'f> {
    fn too_large(&self) -> LinkError {
        LinkError::FunctionTooLarge {
            name: self.function.name.clone(),
        }
    }

    fn allocate_registers(function: &Function) -> Result<Registers, LinkError> {
        let too_large = || LinkError::FunctionTooLarge {
            name: function.name.clone(),
        };
        let mut next = function.arity();

        let mut slots = HashMap::new();
        for (index, usage) in function.slot_usage().iter().enumerate() {
            if usage.is_used() {
                slots.insert(SlotId(index), next);
                next += 1;
            }
        }

        let mut constants = HashMap::new();
        let mut results = vec![None; function.insts.len()];
        let mut max_call_args = 0;
        let mut max_phis = 0;
        let mut operands = Vec::new();
        for &block in &function.layout {
            let data = function.block(block);
            let mut phis = 0;
            for &inst in &data.insts {
                let kind = &function.inst(inst).kind;
                operands.extend(kind.operands());
                match kind {
                    InstKind::Call { args, .. } => max_call_args = max_call_args.max(args.len()),
                    InstKind::Phi(_) => phis += 1,
                    _ => {}
                }
            }
            max_phis = max_phis.max(phis);
            if let Some(terminator) = &data.terminator {
                operands.extend(terminator.operands());
            }
        }
        for operand in operands {
            if let Some(value) = constant_of(operand) {
                constants.entry(value.to_bits()).or_insert_with(|| {
                    next += 1;
                    next - 1
                });
            }
        }
        for (_, inst) in function.live_insts() {
            if function.inst(inst).kind.ty().is_some() {
                results[inst.0] = Some(next);
                next += 1;
            }
        }
        let call_scratch = next;
        next += max_call_args;
        let phi_scratch = next;
        next += max_phis;

        let narrow = |register: usize| u16::try_from(register).map_err(|_| too_large());
        let count = narrow(next)?;
        Ok(Registers {
            slots: slots
                .into_iter()
                .map(|(slot, register)| Ok((slot, narrow(register)?)))
                .collect::<Result<_, LinkError>>()?,
            constants: constants
                .into_iter()
                .map(|(bits, register)| Ok((bits, narrow(register)?)))
                .collect::<Result<_, LinkError>>()?,
            results: results
                .into_iter()
                .map(|register| register.map(narrow).transpose())
                .collect::<Result<_, LinkError>>()?,
            call_scratch: narrow(call_scratch)?,
            phi_scratch: narrow(phi_scratch)?,
            count,
        })
    }

    fn jump_to(&mut self, opcode: OpCode, cond: Option<u16>, target: BlockId) {
        match cond {
            Some(cond) => self.chunk.write_instr(opcode, &[cond, 0]),
            None => self.chunk.write_instr(opcode, &[0]),
        }
        self.fixups.push((self.chunk.code.len() - 2, target));
    }

    /// Copies the incoming values of the phis of `target` for the edge coming from `from`.
    fn edge_copies(&mut self, from: BlockId, target: BlockId) {
        let function = self.function;
        let mut copies = Vec::new();
        for &inst in &function.block(target).insts {
            if let InstKind::Phi(incoming) = &function.inst(inst).kind {
                if let (Some(dst), Some((value, _))) = (
                    self.registers.results[inst.0],
                    incoming.iter().find(|(_, source)| *source == from),
                ) {
                    copies.push((dst, self.registers.operand(*value)));
                }
            }
        }

        // all phis read their inputs before any of them is written
        let overlapping = copies
            .iter()
            .any(|(_, src)| copies.iter().any(|(dst, _)| dst == src));
        if overlapping {
            for (i, (_, src)) in copies.iter().enumerate() {
                let scratch = self.registers.phi_scratch + i as u16;
                self.chunk.write_instr(OpCode::Mov, &[scratch, *src]);
            }
            for (i, (dst, _)) in copies.iter().enumerate() {
                let scratch = self.registers.phi_scratch + i as u16;
                self.chunk.write_instr(OpCode::Mov, &[*dst, scratch]);
            }
        } else {
            for (dst, src) in copies {
                if dst != src {
                    self.chunk.write_instr(OpCode::Mov, &[dst, src]);
                }
            }
        }
    }

    fn has_phis(&self, block: BlockId) -> bool {
        self.function
            .block(block)
            .insts
            .iter()
            .any(|&inst| self.function.inst(inst).kind.is_phi())
    }

    fn lower_inst(&mut self, kind: &InstKind, dst: Option<u16>) -> Result<(), LinkError> {
        let registers = &self.registers;
        let reg = |operand: &Operand| registers.operand(*operand);
        let dst = dst.unwrap_or(0);
        match kind {
            InstKind::Binary { op, lhs, rhs } => {
                let opcode = match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                };
                let operands = [dst, reg(lhs), reg(rhs)];
                self.chunk.write_instr(opcode, &operands);
            }
            InstKind::FCmp { pred, lhs, rhs } => {
                let opcode = match pred {
                    CmpPredicate::Ult => OpCode::Lt,
                    CmpPredicate::One => OpCode::Ne,
                };
                let operands = [dst, reg(lhs), reg(rhs)];
                self.chunk.write_instr(opcode, &operands);
            }
            // booleans already live in registers as 0.0 or 1.0
            InstKind::UiToFp(value) => {
                let operands = [dst, reg(value)];
                self.chunk.write_instr(OpCode::Mov, &operands);
            }
            InstKind::Load(slot) => {
                let operands = [dst, registers.slots[slot]];
                self.chunk.write_instr(OpCode::Mov, &operands);
            }
            InstKind::Store { slot, value } => {
                let operands = [registers.slots[slot], reg(value)];
                self.chunk.write_instr(OpCode::Mov, &operands);
            }
            InstKind::Call { callee, args } => {
                let arity = u8::try_from(args.len()).map_err(|_| self.too_large())?;
                let sources: Vec<u16> = args.iter().map(reg).collect();
                let import = self
                    .chunk
                    .add_import(callee, arity)
                    .ok_or_else(|| self.too_large())?;
                let first_arg = registers.call_scratch;
                for (i, src) in sources.into_iter().enumerate() {
                    self.chunk
                        .write_instr(OpCode::Mov, &[first_arg + i as u16, src]);
                }
                self.chunk.write_instr(OpCode::Call, &[dst, import, first_arg]);
            }
            InstKind::Phi(_) => {}
        }
        Ok(())
    }

    fn lower_terminator(&mut self, block: BlockId, terminator: &Terminator) {
        match *terminator {
            Terminator::Br(target) => {
                self.edge_copies(block, target);
                self.jump_to(OpCode::Jmp, None, target);
            }
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.registers.operand(cond);
                if self.has_phis(else_block) {
                    self.chunk.write_instr(OpCode::JmpIfFalse, &[cond, 0]);
                    let stub_fixup = self.chunk.code.len() - 2;
                    self.edge_copies(block, then_block);
                    self.jump_to(OpCode::Jmp, None, then_block);
                    let stub = self.chunk.code.len();
                    let edge = format!("edge to {}", self.function.block(else_block).name);
                    self.chunk.annotate(edge);
                    self.edge_copies(block, else_block);
                    self.jump_to(OpCode::Jmp, None, else_block);
                    // in range: checked with the rest of the code size
                    self.chunk.patch_u16(stub_fixup, stub as u16);
                } else {
                    self.jump_to(OpCode::JmpIfFalse, Some(cond), else_block);
                    self.edge_copies(block, then_block);
                    self.jump_to(OpCode::Jmp, None, then_block);
                }
            }
            Terminator::Ret(value) => {
                let src = self.registers.operand(value);
                self.chunk.write_instr(OpCode::Ret, &[src]);
            }
        }
    }

    fn lower(mut self) -> Result<Chunk, LinkError> {
        let function = self.function;
        self.chunk.register_count = self.registers.count;

        let mut constants: Vec<(u64, u16)> = self
            .registers
            .constants
            .iter()
            .map(|(&bits, &register)| (bits, register))
            .collect();
        constants.sort_by_key(|&(_, register)| register);
        for (bits, register) in constants {
            let index = self
                .chunk
                .add_constant(f64::from_bits(bits))
                .ok_or_else(|| self.too_large())?;
            self.chunk.write_instr(OpCode::Ldc, &[register, index]);
        }

        for &block in &function.layout {
            self.block_offsets.insert(block, self.chunk.code.len());
            self.chunk.annotate(format!("{}:", function.block(block).name));
            for &inst in &function.block(block).insts {
                let dst = self.registers.results[inst.0];
                self.lower_inst(&function.inst(inst).kind, dst)?;
            }
            if let Some(terminator) = &function.block(block).terminator {
                self.lower_terminator(block, terminator);
            }
        }

        if u16::try_from(self.chunk.code.len()).is_err() {
            return Err(self.too_large());
        }
        for (offset, target) in std::mem::take(&mut self.fixups) {
            let target = self.block_offsets[&target];
            self.chunk.patch_u16(offset, target as u16);
        }
        Ok(self.chunk)
    }
}

/// Lowers a defined `function` to bytecode. Fails if it does not fit the bytecode limits.
pub fn lower_function(function: &Function) -> Result<Chunk, LinkError> {
    debug_assert!(!function.is_declaration());
    let registers = Lowering::allocate_registers(function)?;
    Lowering {
        function,
        chunk: Chunk::new(function.name.clone()),
        registers,
        block_offsets: HashMap::new(),
        fixups: Vec::new(),
    }
    .lower()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kalei_value::builder::Builder;

    #[test]
    fn test_lower_straight_line() {
        let mut builder = Builder::new(Function::declaration("f", vec!["x".to_string()]));
        let sum = builder.build_binary(BinaryOp::Add, Operand::Arg(0), Operand::Const(2.0), "addtmp");
        builder.build_ret(sum);
        let chunk = lower_function(&builder.finish()).unwrap();

        // r0 = x, r1 = 2.0, r2 = addtmp
        assert_eq!(chunk.register_count, 3);
        assert_eq!(chunk.constants, vec![2.0]);
        let mut expected = Chunk::new("f".to_string());
        expected.write_instr(OpCode::Ldc, &[1, 0]);
        expected.write_instr(OpCode::Add, &[2, 0, 1]);
        expected.write_instr(OpCode::Ret, &[2]);
        assert_eq!(chunk.code, expected.code);
    }

    #[test]
    fn test_lower_call_uses_scratch() {
        let mut builder = Builder::new(Function::declaration("f", vec!["x".to_string()]));
        let call = builder.build_call("g", vec![Operand::Arg(0), Operand::Arg(0)], "calltmp");
        builder.build_ret(call);
        let chunk = lower_function(&builder.finish()).unwrap();

        // r0 = x, r1 = calltmp, r2..r3 = call arguments
        assert_eq!(chunk.register_count, 4);
        assert_eq!(chunk.imports.len(), 1);
        assert_eq!(chunk.imports[0].name, "g");
        assert_eq!(chunk.imports[0].arity, 2);
        let mut expected = Chunk::new("f".to_string());
        expected.write_instr(OpCode::Mov, &[2, 0]);
        expected.write_instr(OpCode::Mov, &[3, 0]);
        expected.write_instr(OpCode::Call, &[1, 0, 2]);
        expected.write_instr(OpCode::Ret, &[1]);
        assert_eq!(chunk.code, expected.code);
    }

    #[test]
    fn test_lower_phi_edges() {
        let mut builder = Builder::new(Function::declaration("f", vec!["x".to_string()]));
        let cond = builder.build_fcmp(CmpPredicate::One, Operand::Arg(0), Operand::Const(0.0), "ifcond");
        let then_block = builder.append_new_block("then");
        let else_block = builder.append_new_block("else");
        let merge = builder.append_new_block("ifcont");
        builder.build_cond_br(cond, then_block, else_block);
        builder.position_at_end(then_block);
        builder.build_br(merge);
        builder.position_at_end(else_block);
        builder.build_br(merge);
        builder.position_at_end(merge);
        let phi = builder.build_phi(
            vec![(Operand::Const(1.0), then_block), (Operand::Const(2.0), else_block)],
            "iftmp",
        );
        builder.build_ret(phi);
        let chunk = lower_function(&builder.finish()).unwrap();
        assert!(chunk
            .debug_annotations
            .values()
            .any(|annotation| annotation == "ifcont:"));
        // r0 = x, r1..r3 = constants, r4 = ifcond, r5 = iftmp, r6 = phi scratch
        assert_eq!(chunk.register_count, 7);
    }
}
