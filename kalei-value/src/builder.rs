//! Instruction builder with an insertion cursor.

use crate::ir::{
    BinaryOp, Block, BlockId, CmpPredicate, Function, Inst, InstId, InstKind, Operand, SlotId,
    Terminator,
};

/// Builds the body of one [`Function`].
///
/// Instructions are appended at the end of the current insertion block. Blocks can be created
/// detached and appended to the layout later, so that nested control flow keeps a natural block
/// order.
pub struct Builder {
    function: Function,
    current: BlockId,
}

impl Builder {
    /// Starts the body of `function` with an `entry` block and positions the cursor there.
    pub fn new(mut function: Function) -> Self {
        debug_assert!(function.is_declaration());
        let entry = BlockId(function.blocks.len());
        function.blocks.push(Block {
            name: "entry".to_string(),
            insts: Vec::new(),
            terminator: None,
        });
        function.layout.push(entry);
        Self {
            function,
            current: entry,
        }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    /// Consumes the builder and returns the built function.
    #[must_use]
    pub fn finish(self) -> Function {
        self.function
    }

    /// Returns the block instructions are currently inserted into.
    pub fn insert_block(&self) -> BlockId {
        self.current
    }

    /// Creates a block that is not yet part of the layout.
    pub fn create_block(&mut self, name: &str) -> BlockId {
        let id = BlockId(self.function.blocks.len());
        self.function.blocks.push(Block {
            name: name.to_string(),
            insts: Vec::new(),
            terminator: None,
        });
        id
    }

    /// Appends a block created with [`Self::create_block`] to the end of the layout.
    pub fn append_block(&mut self, block: BlockId) {
        debug_assert!(!self.function.layout.contains(&block));
        self.function.layout.push(block);
    }

    pub fn append_new_block(&mut self, name: &str) -> BlockId {
        let block = self.create_block(name);
        self.append_block(block);
        block
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = block;
    }

    fn push(&mut self, kind: InstKind, name: &str) -> InstId {
        let block = self.function.block(self.current);
        debug_assert!(
            block.terminator.is_none(),
            "cannot insert into terminated block `{}`",
            block.name
        );
        let id = InstId(self.function.insts.len());
        self.function.insts.push(Inst {
            kind,
            name: name.to_string(),
        });
        self.function.block_mut(self.current).insts.push(id);
        id
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = self.function.block_mut(self.current);
        debug_assert!(block.terminator.is_none());
        block.terminator = Some(terminator);
    }

    pub fn build_binary(&mut self, op: BinaryOp, lhs: Operand, rhs: Operand, name: &str) -> Operand {
        Operand::Inst(self.push(InstKind::Binary { op, lhs, rhs }, name))
    }

    pub fn build_fcmp(
        &mut self,
        pred: CmpPredicate,
        lhs: Operand,
        rhs: Operand,
        name: &str,
    ) -> Operand {
        Operand::Inst(self.push(InstKind::FCmp { pred, lhs, rhs }, name))
    }

    pub fn build_uitofp(&mut self, value: Operand, name: &str) -> Operand {
        Operand::Inst(self.push(InstKind::UiToFp(value), name))
    }

    /// Allocates a stack slot. Slots belong to the whole function, as if placed in the entry block.
    pub fn build_alloca(&mut self, name: &str) -> SlotId {
        self.function.slots.push(name.to_string());
        SlotId(self.function.slots.len() - 1)
    }

    pub fn build_load(&mut self, slot: SlotId, name: &str) -> Operand {
        Operand::Inst(self.push(InstKind::Load(slot), name))
    }

    pub fn build_store(&mut self, slot: SlotId, value: Operand) {
        self.push(InstKind::Store { slot, value }, "");
    }

    pub fn build_call(&mut self, callee: &str, args: Vec<Operand>, name: &str) -> Operand {
        Operand::Inst(self.push(
            InstKind::Call {
                callee: callee.to_string(),
                args,
            },
            name,
        ))
    }

    pub fn build_phi(&mut self, incoming: Vec<(Operand, BlockId)>, name: &str) -> Operand {
        debug_assert!(self
            .function
            .block(self.current)
            .insts
            .iter()
            .all(|&inst| self.function.inst(inst).kind.is_phi()));
        Operand::Inst(self.push(InstKind::Phi(incoming), name))
    }

    pub fn build_br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br(target));
    }

    pub fn build_cond_br(&mut self, cond: Operand, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn build_ret(&mut self, value: Operand) {
        self.terminate(Terminator::Ret(value));
    }
}
