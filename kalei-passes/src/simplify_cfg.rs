//! Control flow graph simplification.

use crate::FunctionPass;
use kalei_value::ir::{BlockId, Function, InstKind, Terminator};
use std::collections::HashSet;

/// Folds branches on constant conditions, drops unreachable blocks and merges blocks into their
/// only predecessor.
pub struct SimplifyCfg;

/// Removes the phi entries of `block` that flow in from `from`.
fn remove_incoming(function: &mut Function, block: BlockId, from: BlockId) {
    let insts = function.block(block).insts.clone();
    for inst in insts {
        if let InstKind::Phi(incoming) = &mut function.inst_mut(inst).kind {
            incoming.retain(|(_, source)| *source != from);
        }
    }
}

/// Renames the phi entries of `block` that flow in from `from` to flow in from `to`.
fn retarget_incoming(function: &mut Function, block: BlockId, from: BlockId, to: BlockId) {
    let insts = function.block(block).insts.clone();
    for inst in insts {
        if let InstKind::Phi(incoming) = &mut function.inst_mut(inst).kind {
            for (_, source) in incoming.iter_mut() {
                if *source == from {
                    *source = to;
                }
            }
        }
    }
}

fn fold_constant_branches(function: &mut Function) -> bool {
    let mut changed = false;
    for block in function.layout.clone() {
        let (taken, untaken) = match function.block(block).terminator {
            Some(Terminator::CondBr {
                then_block,
                else_block,
                ..
            }) if then_block == else_block => (then_block, None),
            Some(Terminator::CondBr {
                cond,
                then_block,
                else_block,
            }) => match cond.as_bool() {
                Some(true) => (then_block, Some(else_block)),
                Some(false) => (else_block, Some(then_block)),
                None => continue,
            },
            _ => continue,
        };
        function.block_mut(block).terminator = Some(Terminator::Br(taken));
        if let Some(untaken) = untaken {
            remove_incoming(function, untaken, block);
        }
        changed = true;
    }
    changed
}

fn remove_unreachable_blocks(function: &mut Function) -> bool {
    let entry = match function.entry() {
        Some(entry) => entry,
        None => return false,
    };
    let mut reachable = HashSet::new();
    let mut worklist = vec![entry];
    while let Some(block) = worklist.pop() {
        if reachable.insert(block) {
            worklist.extend(function.successors(block));
        }
    }
    if reachable.len() == function.layout.len() {
        return false;
    }

    let unreachable: Vec<BlockId> = function
        .layout
        .iter()
        .copied()
        .filter(|block| !reachable.contains(block))
        .collect();
    function.layout.retain(|block| reachable.contains(block));
    for block in function.layout.clone() {
        for &dead in &unreachable {
            remove_incoming(function, block, dead);
        }
    }
    true
}

/// Merges one block into its sole predecessor when that predecessor jumps to it unconditionally.
fn merge_one_block(function: &mut Function) -> bool {
    let preds = function.predecessors();
    let entry = function.entry();
    let candidate = function.layout.iter().copied().find_map(|block| {
        if Some(block) == entry {
            return None;
        }
        match preds.get(&block).map(Vec::as_slice) {
            Some(&[pred])
                if pred != block
                    && function.block(pred).terminator == Some(Terminator::Br(block)) =>
            {
                Some((pred, block))
            }
            _ => None,
        }
    });
    let (pred, block) = match candidate {
        Some(candidate) => candidate,
        None => return false,
    };

    let insts = std::mem::take(&mut function.block_mut(block).insts);
    let mut moved = Vec::with_capacity(insts.len());
    for inst in insts {
        // phis of a block with a single predecessor have a single incoming value
        let single = match &function.inst(inst).kind {
            InstKind::Phi(incoming) => Some(incoming.first().map(|(value, _)| *value)),
            _ => None,
        };
        match single {
            Some(Some(value)) => function.replace_all_uses(inst, value),
            Some(None) => {}
            None => moved.push(inst),
        }
    }
    let terminator = function.block_mut(block).terminator.take();
    for succ in terminator.iter().flat_map(Terminator::successors) {
        retarget_incoming(function, succ, block, pred);
    }
    let pred_block = function.block_mut(pred);
    pred_block.insts.extend(moved);
    pred_block.terminator = terminator;
    function.layout.retain(|&laid_out| laid_out != block);
    true
}

impl FunctionPass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplify-cfg"
    }

    fn run(&self, function: &mut Function) -> bool {
        let mut changed = fold_constant_branches(function);
        changed |= remove_unreachable_blocks(function);
        while merge_one_block(function) {
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::verify_function;
    use kalei_value::builder::Builder;
    use kalei_value::ir::{BinaryOp, CmpPredicate, Operand, Terminator};

    /// `if <cond> then 2 else 3` lowered with a phi.
    fn diamond(cond: Operand) -> Function {
        let mut builder = Builder::new(Function::declaration("f", vec![]));
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
            vec![
                (Operand::Const(2.0), then_block),
                (Operand::Const(3.0), else_block),
            ],
            "iftmp",
        );
        builder.build_ret(phi);
        builder.finish()
    }

    #[test]
    fn test_constant_branch_collapses() {
        let mut function = diamond(Operand::Bool(false));
        assert!(SimplifyCfg.run(&mut function));
        assert_eq!(verify_function(&function), Ok(()));
        assert_eq!(function.layout.len(), 1);
        let entry = function.entry().unwrap();
        assert_eq!(
            function.block(entry).terminator,
            Some(Terminator::Ret(Operand::Const(3.0)))
        );
        assert!(function.block(entry).insts.is_empty());
    }

    #[test]
    fn test_opaque_branch_is_kept() {
        let mut builder = Builder::new(Function::declaration("h", vec!["x".to_string()]));
        let cond = builder.build_fcmp(CmpPredicate::One, Operand::Arg(0), Operand::Const(0.0), "ifcond");
        let then_block = builder.append_new_block("then");
        let merge = builder.append_new_block("ifcont");
        builder.build_cond_br(cond, then_block, merge);
        builder.position_at_end(then_block);
        builder.build_br(merge);
        builder.position_at_end(merge);
        builder.build_ret(Operand::Const(0.0));
        let mut function = builder.finish();

        // `ifcont` has two predecessors and `then` follows a conditional branch
        assert!(!SimplifyCfg.run(&mut function));
        assert_eq!(function.layout.len(), 3);
    }

    #[test]
    fn test_merge_chain() {
        let mut builder = Builder::new(Function::declaration("f", vec!["x".to_string()]));
        let next = builder.append_new_block("next");
        let last = builder.append_new_block("last");
        builder.build_br(next);
        builder.position_at_end(next);
        let sum = builder.build_binary(BinaryOp::Add, Operand::Arg(0), Operand::Const(1.0), "addtmp");
        builder.build_br(last);
        builder.position_at_end(last);
        builder.build_ret(sum);
        let mut function = builder.finish();

        assert!(SimplifyCfg.run(&mut function));
        assert_eq!(verify_function(&function), Ok(()));
        assert_eq!(function.layout.len(), 1);
        let entry = function.entry().unwrap();
        assert_eq!(function.block(entry).insts.len(), 1);
        assert_eq!(function.block(entry).terminator, Some(Terminator::Ret(sum)));
    }
}
