//! Promotes stack slots that are written exactly once into plain values.

use crate::FunctionPass;
use kalei_value::ir::{Function, InstKind, SlotId};
use std::collections::HashSet;

/// Replaces the loads of a slot with the stored value when the slot has a single store in the entry
/// block and no load precedes that store. The entry block dominates every other block, so the
/// stored value is available at each load.
pub struct PromoteSingleStore;

impl FunctionPass for PromoteSingleStore {
    fn name(&self) -> &'static str {
        "promote-single-store"
    }

    fn run(&self, function: &mut Function) -> bool {
        let entry = match function.entry() {
            Some(entry) => entry,
            None => return false,
        };
        let mut changed = false;

        for (index, usage) in function.slot_usage().into_iter().enumerate() {
            if usage.stores != 1 || usage.loads == 0 {
                continue;
            }
            let slot = SlotId(index);
            let entry_insts = function.block(entry).insts.clone();
            let store = entry_insts
                .iter()
                .enumerate()
                .find_map(|(pos, &inst)| match function.inst(inst).kind {
                    InstKind::Store { slot: stored, value } if stored == slot => {
                        Some((pos, inst, value))
                    }
                    _ => None,
                });
            let (pos, store, value) = match store {
                Some(store) => store,
                None => continue,
            };
            if entry_insts[..pos]
                .iter()
                .any(|&inst| function.inst(inst).kind == InstKind::Load(slot))
            {
                continue;
            }

            let loads: Vec<_> = function
                .live_insts()
                .map(|(_, inst)| inst)
                .filter(|&inst| function.inst(inst).kind == InstKind::Load(slot))
                .collect();
            let mut dead: HashSet<_> = loads.iter().copied().collect();
            for load in loads {
                function.replace_all_uses(load, value);
            }
            dead.insert(store);
            function.remove_insts(&dead);
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kalei_value::builder::Builder;
    use kalei_value::ir::{BinaryOp, Operand, Terminator};

    #[test]
    fn test_promote_parameter() {
        let mut builder = Builder::new(Function::declaration("sq", vec!["x".to_string()]));
        let slot = builder.build_alloca("x");
        builder.build_store(slot, Operand::Arg(0));
        let lhs = builder.build_load(slot, "x");
        let rhs = builder.build_load(slot, "x");
        let product = builder.build_binary(BinaryOp::Mul, lhs, rhs, "multmp");
        builder.build_ret(product);
        let mut function = builder.finish();

        assert!(PromoteSingleStore.run(&mut function));
        let entry = function.entry().unwrap();
        assert_eq!(function.block(entry).insts.len(), 1);
        let mul = function.block(entry).insts[0];
        assert_eq!(
            function.inst(mul).kind,
            InstKind::Binary {
                op: BinaryOp::Mul,
                lhs: Operand::Arg(0),
                rhs: Operand::Arg(0)
            }
        );
        assert!(!function.slot_usage()[0].is_used());
        assert!(!PromoteSingleStore.run(&mut function));
    }

    #[test]
    fn test_keeps_reassigned_slot() {
        let mut builder = Builder::new(Function::declaration("f", vec![]));
        let slot = builder.build_alloca("x");
        builder.build_store(slot, Operand::Const(1.0));
        builder.build_store(slot, Operand::Const(2.0));
        let value = builder.build_load(slot, "x");
        builder.build_ret(value);
        let mut function = builder.finish();

        assert!(!PromoteSingleStore.run(&mut function));
        let entry = function.entry().unwrap();
        assert!(matches!(
            function.block(entry).terminator,
            Some(Terminator::Ret(Operand::Inst(_)))
        ));
    }

    #[test]
    fn test_keeps_store_outside_entry() {
        let mut builder = Builder::new(Function::declaration("f", vec![]));
        let slot = builder.build_alloca("x");
        let body = builder.append_new_block("body");
        builder.build_br(body);
        builder.position_at_end(body);
        builder.build_store(slot, Operand::Const(1.0));
        let value = builder.build_load(slot, "x");
        builder.build_ret(value);
        let mut function = builder.finish();

        assert!(!PromoteSingleStore.run(&mut function));
    }
}
