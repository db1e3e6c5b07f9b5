//! Dead code elimination.

use crate::FunctionPass;
use kalei_value::ir::{Function, InstKind};
use std::collections::HashSet;

/// Removes pure instructions whose result is never used, and stores to slots that are never loaded.
pub struct DeadCodeElimination;

impl FunctionPass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&self, function: &mut Function) -> bool {
        let mut changed = false;
        loop {
            let uses = function.use_counts();
            let usage = function.slot_usage();
            let dead: HashSet<_> = function
                .live_insts()
                .map(|(_, inst)| inst)
                .filter(|&inst| match &function.inst(inst).kind {
                    InstKind::Store { slot, .. } => usage[slot.0].loads == 0,
                    kind => kind.is_pure() && uses[inst.0] == 0,
                })
                .collect();
            if dead.is_empty() {
                return changed;
            }
            function.remove_insts(&dead);
            changed = true;
        }
    }
}
