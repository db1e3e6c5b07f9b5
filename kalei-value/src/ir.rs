//! Intermediate representation produced by the code generator.
//!
//! A [`Module`] is one compilation unit. It owns [`Function`]s, which are either declarations (no
//! blocks) or definitions. Instructions and blocks are stored in per-function arenas and referenced
//! by [`InstId`] and [`BlockId`]. The order in which blocks are laid out is kept separately in
//! [`Function::layout`]; the first laid out block is the entry block.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub usize);

/// A stack slot (`alloca`) of the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Double,
    /// Result of a comparison. Only consumed by branches and `uitofp`.
    I1,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Inst(InstId),
    /// The n-th function argument.
    Arg(usize),
    Const(f64),
    Bool(bool),
}

impl Operand {
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Operand::Const(val) => Some(*val),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Operand::Bool(val) => Some(*val),
            _ => None,
        }
    }

    /// Structural equality that treats constants bitwise (`NaN == NaN`).
    pub fn same_as(&self, other: &Operand) -> bool {
        match (self, other) {
            (Operand::Const(a), Operand::Const(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "fadd",
            BinaryOp::Sub => "fsub",
            BinaryOp::Mul => "fmul",
            BinaryOp::Div => "fdiv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpPredicate {
    /// Unordered or less than. True if either operand is NaN.
    Ult,
    /// Ordered and not equal. False if either operand is NaN.
    One,
}

impl CmpPredicate {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpPredicate::Ult => !(lhs >= rhs),
            CmpPredicate::One => lhs < rhs || lhs > rhs,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            CmpPredicate::Ult => "ult",
            CmpPredicate::One => "one",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Binary {
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    },
    FCmp {
        pred: CmpPredicate,
        lhs: Operand,
        rhs: Operand,
    },
    /// Converts an `i1` into `0.0` or `1.0`.
    UiToFp(Operand),
    Load(SlotId),
    Store {
        slot: SlotId,
        value: Operand,
    },
    /// Calls a function of the module by name.
    Call {
        callee: String,
        args: Vec<Operand>,
    },
    /// Selects the incoming value matching the block control arrived from.
    Phi(Vec<(Operand, BlockId)>),
}

impl InstKind {
    /// The result type, or `None` if the instruction produces no value.
    pub fn ty(&self) -> Option<Type> {
        match self {
            InstKind::FCmp { .. } => Some(Type::I1),
            InstKind::Store { .. } => None,
            _ => Some(Type::Double),
        }
    }

    /// Pure instructions can be removed when their result is unused.
    pub fn is_pure(&self) -> bool {
        !matches!(self, InstKind::Store { .. } | InstKind::Call { .. })
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi(_))
    }

    pub fn operands(&self) -> Vec<Operand> {
        match self {
            InstKind::Binary { lhs, rhs, .. } | InstKind::FCmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstKind::UiToFp(operand) => vec![*operand],
            InstKind::Load(_) => Vec::new(),
            InstKind::Store { value, .. } => vec![*value],
            InstKind::Call { args, .. } => args.clone(),
            InstKind::Phi(incoming) => incoming.iter().map(|(value, _)| *value).collect(),
        }
    }

    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        match self {
            InstKind::Binary { lhs, rhs, .. } | InstKind::FCmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstKind::UiToFp(operand) => f(operand),
            InstKind::Load(_) => {}
            InstKind::Store { value, .. } => f(value),
            InstKind::Call { args, .. } => args.iter_mut().for_each(f),
            InstKind::Phi(incoming) => incoming.iter_mut().for_each(|(value, _)| f(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub kind: InstKind,
    /// Name hint for printing. Uniqued by the printer.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret(Operand),
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Ret(_) => Vec::new(),
        }
    }

    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Terminator::Br(_) => Vec::new(),
            Terminator::CondBr { cond, .. } => vec![*cond],
            Terminator::Ret(value) => vec![*value],
        }
    }

    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        match self {
            Terminator::Br(_) => {}
            Terminator::CondBr { cond, .. } => f(cond),
            Terminator::Ret(value) => f(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub insts: Vec<InstId>,
    pub terminator: Option<Terminator>,
}

/// How often a stack slot is read and written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotUsage {
    pub loads: usize,
    pub stores: usize,
}

impl SlotUsage {
    pub fn is_used(&self) -> bool {
        self.loads + self.stores > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    /// Stack slots, named after the variable they hold.
    pub slots: Vec<String>,
    pub insts: Vec<Inst>,
    pub blocks: Vec<Block>,
    pub layout: Vec<BlockId>,
}

impl Function {
    /// Create a function without a body.
    pub fn declaration(name: impl ToString, params: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            params,
            slots: Vec::new(),
            insts: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0]
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.0]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.0]
    }

    /// Type of `operand`, or `None` if it refers to an instruction without a result.
    pub fn operand_type(&self, operand: Operand) -> Option<Type> {
        match operand {
            Operand::Inst(id) => self.inst(id).kind.ty(),
            Operand::Arg(_) | Operand::Const(_) => Some(Type::Double),
            Operand::Bool(_) => Some(Type::I1),
        }
    }

    /// Iterates over the instructions of all laid out blocks, in layout order.
    pub fn live_insts(&self) -> impl Iterator<Item = (BlockId, InstId)> + '_ {
        self.layout
            .iter()
            .flat_map(move |&block| self.block(block).insts.iter().map(move |&inst| (block, inst)))
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.block(block)
            .terminator
            .as_ref()
            .map(Terminator::successors)
            .unwrap_or_default()
    }

    /// Maps each laid out block to its distinct predecessors, in layout order.
    pub fn predecessors(&self) -> HashMap<BlockId, Vec<BlockId>> {
        let mut preds: HashMap<BlockId, Vec<BlockId>> =
            self.layout.iter().map(|&block| (block, Vec::new())).collect();
        for &block in &self.layout {
            for succ in self.successors(block) {
                let entry = preds.entry(succ).or_default();
                if !entry.contains(&block) {
                    entry.push(block);
                }
            }
        }
        preds
    }

    /// Number of uses of each instruction result by laid out code, indexed by [`InstId`].
    pub fn use_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.insts.len()];
        let mut count = |operand: Operand| {
            if let Operand::Inst(id) = operand {
                counts[id.0] += 1;
            }
        };
        for (_, inst) in self.live_insts() {
            self.inst(inst).kind.operands().into_iter().for_each(&mut count);
        }
        for &block in &self.layout {
            if let Some(term) = &self.block(block).terminator {
                term.operands().into_iter().for_each(&mut count);
            }
        }
        counts
    }

    /// Loads and stores of each slot by laid out code, indexed by [`SlotId`].
    pub fn slot_usage(&self) -> Vec<SlotUsage> {
        let mut usage = vec![SlotUsage::default(); self.slots.len()];
        for (_, inst) in self.live_insts() {
            match self.inst(inst).kind {
                InstKind::Load(slot) => usage[slot.0].loads += 1,
                InstKind::Store { slot, .. } => usage[slot.0].stores += 1,
                _ => {}
            }
        }
        usage
    }

    /// Rewrites every use of `from` into `to`.
    pub fn replace_all_uses(&mut self, from: InstId, to: Operand) {
        let rewrite = |operand: &mut Operand| {
            if *operand == Operand::Inst(from) {
                *operand = to;
            }
        };
        for inst in &mut self.insts {
            inst.kind.for_each_operand_mut(rewrite);
        }
        for block in &mut self.blocks {
            if let Some(term) = &mut block.terminator {
                term.for_each_operand_mut(rewrite);
            }
        }
    }

    /// Detaches `dead` instructions from their blocks. The arena entries stay in place so that ids
    /// remain valid.
    pub fn remove_insts(&mut self, dead: &HashSet<InstId>) {
        if dead.is_empty() {
            return;
        }
        for block in &mut self.blocks {
            block.insts.retain(|inst| !dead.contains(inst));
        }
    }
}

/// A compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    name: String,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            functions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|func| func.name == name)
    }

    /// Declares `name` unless the module already has a function with that name.
    /// Returns the (possibly pre-existing) function.
    pub fn declare(&mut self, name: &str, params: &[String]) -> &Function {
        let index = match self.functions.iter().position(|func| func.name == name) {
            Some(index) => index,
            None => {
                self.functions
                    .push(Function::declaration(name, params.to_vec()));
                self.functions.len() - 1
            }
        };
        &self.functions[index]
    }

    /// Adds `function`, replacing any function of the same name.
    pub fn define(&mut self, function: Function) {
        match self.functions.iter_mut().find(|func| func.name == function.name) {
            Some(existing) => *existing = function,
            None => self.functions.push(function),
        }
    }

    pub fn remove_function(&mut self, name: &str) -> Option<Function> {
        let index = self.functions.iter().position(|func| func.name == name)?;
        Some(self.functions.remove(index))
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    /// Functions that have a body.
    pub fn definitions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|func| !func.is_declaration())
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmp_predicates() {
        assert!(CmpPredicate::Ult.apply(1.0, 2.0));
        assert!(!CmpPredicate::Ult.apply(2.0, 2.0));
        assert!(CmpPredicate::Ult.apply(f64::NAN, 2.0));
        assert!(CmpPredicate::One.apply(1.0, 0.0));
        assert!(!CmpPredicate::One.apply(0.0, 0.0));
        assert!(!CmpPredicate::One.apply(f64::NAN, 0.0));
    }

    #[test]
    fn test_module_declare_and_define() {
        let mut module = Module::new("unit");
        let params = vec!["x".to_string()];
        assert!(module.declare("sq", &params).is_declaration());
        assert_eq!(module.functions().count(), 1);
        // declaring twice keeps the first function
        module.declare("sq", &[]);
        assert_eq!(module.get_function("sq").unwrap().arity(), 1);
        assert_eq!(module.definitions().count(), 0);

        module.define(Function::declaration("sq", params));
        assert_eq!(module.functions().count(), 1);
        assert!(module.remove_function("sq").is_some());
        assert!(module.is_empty());
    }
}
