//! Constant folding.

use crate::FunctionPass;
use kalei_value::ir::{Function, InstId, InstKind, Operand};
use std::collections::HashSet;

/// Evaluates instructions whose operands are all constants, and collapses phis whose incoming values
/// are all the same.
pub struct ConstantFold;

/// The value `inst` is equivalent to, if it can be computed without running it.
fn fold(inst: InstId, kind: &InstKind) -> Option<Operand> {
    match kind {
        InstKind::Binary { op, lhs, rhs } => Some(Operand::Const(
            op.apply(lhs.as_const()?, rhs.as_const()?),
        )),
        InstKind::FCmp { pred, lhs, rhs } => Some(Operand::Bool(
            pred.apply(lhs.as_const()?, rhs.as_const()?),
        )),
        InstKind::UiToFp(value) => Some(Operand::Const(if value.as_bool()? { 1.0 } else { 0.0 })),
        InstKind::Phi(incoming) => {
            let mut values = incoming
                .iter()
                .map(|(value, _)| *value)
                .filter(|value| *value != Operand::Inst(inst));
            let first = values.next()?;
            if values.all(|value| value.same_as(&first)) {
                Some(first)
            } else {
                None
            }
        }
        _ => None,
    }
}

impl FunctionPass for ConstantFold {
    fn name(&self) -> &'static str {
        "constant-fold"
    }

    fn run(&self, function: &mut Function) -> bool {
        let insts: Vec<InstId> = function.live_insts().map(|(_, inst)| inst).collect();
        let mut dead = HashSet::new();
        for inst in insts {
            // operands are rewritten in place as earlier instructions fold
            if let Some(value) = fold(inst, &function.inst(inst).kind) {
                function.replace_all_uses(inst, value);
                dead.insert(inst);
            }
        }
        function.remove_insts(&dead);
        !dead.is_empty()
    }
}
