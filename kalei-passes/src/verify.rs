//! Structural checks on a finished function.

use kalei_value::ir::{BlockId, Function, InstKind, Operand, Terminator, Type};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    #[error("block `{block}` in function `{function}` has no terminator")]
    Unterminated { function: String, block: String },
    #[error("function `{function}` branches to a block that is not laid out")]
    MissingBlock { function: String },
    #[error("phi in block `{block}` of function `{function}` is not at the start of the block")]
    MisplacedPhi { function: String, block: String },
    #[error("phi in block `{block}` of function `{function}` does not match the block predecessors")]
    PhiPredecessors { function: String, block: String },
    #[error("operand in block `{block}` of function `{function}` should be {expected:?}, found {found:?}")]
    TypeMismatch {
        function: String,
        block: String,
        expected: Type,
        found: Option<Type>,
    },
    #[error("operand in block `{block}` of function `{function}` refers to a removed instruction")]
    DetachedOperand { function: String, block: String },
    #[error("operand in block `{block}` of function `{function}` refers to a missing argument or slot")]
    OutOfRange { function: String, block: String },
}

/// Operands of `kind` paired with the type they must have.
fn expected_operands(kind: &InstKind) -> Vec<(Operand, Type)> {
    match kind {
        InstKind::UiToFp(operand) => vec![(*operand, Type::I1)],
        kind => kind
            .operands()
            .into_iter()
            .map(|operand| (operand, Type::Double))
            .collect(),
    }
}

fn expected_terminator_operands(terminator: &Terminator) -> Vec<(Operand, Type)> {
    match terminator {
        Terminator::CondBr { cond, .. } => vec![(*cond, Type::I1)],
        Terminator::Ret(value) => vec![(*value, Type::Double)],
        Terminator::Br(_) => Vec::new(),
    }
}

/// Checks that `function` is well formed. Declarations are always valid.
pub fn verify_function(function: &Function) -> Result<(), VerifyError> {
    let laid_out: HashSet<BlockId> = function.layout.iter().copied().collect();
    let placed: HashSet<_> = function.live_insts().map(|(_, inst)| inst).collect();
    let preds = function.predecessors();

    for &block in &function.layout {
        let data = function.block(block);
        let block_name = || data.name.clone();

        let check = |operand: Operand, expected: Type| -> Result<(), VerifyError> {
            match operand {
                Operand::Inst(inst) if !placed.contains(&inst) => {
                    return Err(VerifyError::DetachedOperand {
                        function: function.name.clone(),
                        block: block_name(),
                    })
                }
                Operand::Arg(index) if index >= function.arity() => {
                    return Err(VerifyError::OutOfRange {
                        function: function.name.clone(),
                        block: block_name(),
                    })
                }
                _ => {}
            }
            let found = function.operand_type(operand);
            if found != Some(expected) {
                return Err(VerifyError::TypeMismatch {
                    function: function.name.clone(),
                    block: block_name(),
                    expected,
                    found,
                });
            }
            Ok(())
        };

        let terminator = data
            .terminator
            .as_ref()
            .ok_or_else(|| VerifyError::Unterminated {
                function: function.name.clone(),
                block: block_name(),
            })?;
        if terminator
            .successors()
            .iter()
            .any(|succ| !laid_out.contains(succ))
        {
            return Err(VerifyError::MissingBlock {
                function: function.name.clone(),
            });
        }

        let mut past_phis = false;
        for &inst in &data.insts {
            let kind = &function.inst(inst).kind;
            match kind {
                InstKind::Phi(incoming) => {
                    if past_phis {
                        return Err(VerifyError::MisplacedPhi {
                            function: function.name.clone(),
                            block: block_name(),
                        });
                    }
                    let mut sources: Vec<BlockId> = incoming.iter().map(|(_, from)| *from).collect();
                    sources.sort();
                    let mut expected = preds.get(&block).cloned().unwrap_or_default();
                    expected.sort();
                    if sources != expected {
                        return Err(VerifyError::PhiPredecessors {
                            function: function.name.clone(),
                            block: block_name(),
                        });
                    }
                }
                InstKind::Load(slot) | InstKind::Store { slot, .. } => {
                    past_phis = true;
                    if slot.0 >= function.slots.len() {
                        return Err(VerifyError::OutOfRange {
                            function: function.name.clone(),
                            block: block_name(),
                        });
                    }
                }
                _ => past_phis = true,
            }
            for (operand, ty) in expected_operands(kind) {
                check(operand, ty)?;
            }
        }
        for (operand, ty) in expected_terminator_operands(terminator) {
            check(operand, ty)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kalei_value::builder::Builder;
    use kalei_value::ir::{BinaryOp, CmpPredicate};

    fn new_builder() -> Builder {
        Builder::new(Function::declaration("f", vec!["x".to_string()]))
    }

    #[test]
    fn test_valid_function() {
        let mut builder = new_builder();
        let sum = builder.build_binary(BinaryOp::Add, Operand::Arg(0), Operand::Const(1.0), "addtmp");
        builder.build_ret(sum);
        assert_eq!(verify_function(&builder.finish()), Ok(()));
        assert_eq!(verify_function(&Function::declaration("g", vec![])), Ok(()));
    }

    #[test]
    fn test_unterminated_block() {
        let mut builder = new_builder();
        builder.build_binary(BinaryOp::Add, Operand::Arg(0), Operand::Const(1.0), "addtmp");
        assert!(matches!(
            verify_function(&builder.finish()),
            Err(VerifyError::Unterminated { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let mut builder = new_builder();
        let cmp = builder.build_fcmp(CmpPredicate::Ult, Operand::Arg(0), Operand::Const(1.0), "cmptmp");
        builder.build_ret(cmp);
        assert_eq!(
            verify_function(&builder.finish()),
            Err(VerifyError::TypeMismatch {
                function: "f".to_string(),
                block: "entry".to_string(),
                expected: Type::Double,
                found: Some(Type::I1),
            })
        );

        let mut builder = new_builder();
        let then_block = builder.append_new_block("then");
        builder.build_cond_br(Operand::Arg(0), then_block, then_block);
        builder.position_at_end(then_block);
        builder.build_ret(Operand::Const(0.0));
        assert!(matches!(
            verify_function(&builder.finish()),
            Err(VerifyError::TypeMismatch { expected: Type::I1, .. })
        ));
    }

    #[test]
    fn test_phi_predecessors() {
        let mut builder = new_builder();
        let entry = builder.insert_block();
        let merge = builder.append_new_block("merge");
        let orphan = builder.create_block("orphan");
        builder.build_br(merge);
        builder.position_at_end(merge);
        let phi = builder.build_phi(
            vec![(Operand::Const(1.0), entry), (Operand::Const(2.0), orphan)],
            "iftmp",
        );
        builder.build_ret(phi);
        assert!(matches!(
            verify_function(&builder.finish()),
            Err(VerifyError::PhiPredecessors { .. })
        ));
    }

    #[test]
    fn test_missing_block() {
        let mut builder = new_builder();
        let detached = builder.create_block("detached");
        builder.build_br(detached);
        builder.position_at_end(detached);
        builder.build_ret(Operand::Const(0.0));
        assert!(matches!(
            verify_function(&builder.finish()),
            Err(VerifyError::MissingBlock { .. })
        ));
    }
}
