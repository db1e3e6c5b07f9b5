//! Verification and optimization passes over IR functions.

pub mod dce;
pub mod fold;
pub mod promote;
pub mod simplify_cfg;
pub mod verify;

use kalei_value::ir::Function;
use tracing::trace;

/// A transformation of a single function.
pub trait FunctionPass {
    fn name(&self) -> &'static str;
    /// Runs the pass. Returns `true` if `function` was changed.
    fn run(&self, function: &mut Function) -> bool;
}

/// Upper bound on the number of times the whole pipeline is repeated.
pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// Runs a pipeline of [`FunctionPass`]es until none of them changes the function.
pub struct PassManager {
    passes: Vec<Box<dyn FunctionPass>>,
    max_rounds: usize,
}

impl PassManager {
    /// Creates an empty pass manager. Running it leaves functions untouched.
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Creates a pass manager with the standard optimization pipeline.
    pub fn with_default_passes() -> Self {
        let mut manager = Self::new();
        manager.add_pass(promote::PromoteSingleStore);
        manager.add_pass(fold::ConstantFold);
        manager.add_pass(simplify_cfg::SimplifyCfg);
        manager.add_pass(dce::DeadCodeElimination);
        manager
    }

    pub fn add_pass(&mut self, pass: impl FunctionPass + 'static) {
        self.passes.push(Box::new(pass));
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Names of the passes, in the order they run.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Optimizes `function` in place. Returns the number of rounds that changed something.
    pub fn run(&self, function: &mut Function) -> usize {
        if function.is_declaration() {
            return 0;
        }
        let mut rounds = 0;
        while rounds < self.max_rounds {
            let mut changed = false;
            for pass in &self.passes {
                if pass.run(function) {
                    trace!(pass = pass.name(), function = %function.name, "pass changed function");
                    debug_assert_eq!(verify::verify_function(function), Ok(()));
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            rounds += 1;
        }
        rounds
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::with_default_passes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kalei_value::builder::Builder;
    use kalei_value::ir::{BinaryOp, CmpPredicate, Operand, Terminator};

    /// `def f(x) var y = 2 * 3 in if y < 10 then x else 0`, lowered the way codegen does it.
    fn sample() -> Function {
        let mut builder = Builder::new(Function::declaration("f", vec!["x".to_string()]));
        let x = builder.build_alloca("x");
        builder.build_store(x, Operand::Arg(0));
        let y = builder.build_alloca("y");
        let init = builder.build_binary(BinaryOp::Mul, Operand::Const(2.0), Operand::Const(3.0), "multmp");
        builder.build_store(y, init);
        let lhs = builder.build_load(y, "y");
        let cmp = builder.build_fcmp(CmpPredicate::Ult, lhs, Operand::Const(10.0), "cmptmp");
        let boolean = builder.build_uitofp(cmp, "booltmp");
        let cond = builder.build_fcmp(CmpPredicate::One, boolean, Operand::Const(0.0), "ifcond");
        let then_block = builder.append_new_block("then");
        let else_block = builder.create_block("else");
        let merge = builder.create_block("ifcont");
        builder.build_cond_br(cond, then_block, else_block);
        builder.position_at_end(then_block);
        let then_value = builder.build_load(x, "x");
        builder.build_br(merge);
        builder.append_block(else_block);
        builder.position_at_end(else_block);
        builder.build_br(merge);
        builder.append_block(merge);
        builder.position_at_end(merge);
        let phi = builder.build_phi(
            vec![(then_value, then_block), (Operand::Const(0.0), else_block)],
            "iftmp",
        );
        builder.build_ret(phi);
        builder.finish()
    }

    #[test]
    fn test_empty_manager_is_identity() {
        let mut function = sample();
        let original = function.clone();
        assert_eq!(PassManager::new().run(&mut function), 0);
        assert_eq!(function, original);
    }

    #[test]
    fn test_default_pipeline() {
        let manager = PassManager::default();
        assert_eq!(
            manager.pass_names(),
            vec!["promote-single-store", "constant-fold", "simplify-cfg", "dce"]
        );

        let mut function = sample();
        assert!(manager.run(&mut function) > 0);
        assert_eq!(verify::verify_function(&function), Ok(()));
        assert_eq!(function.layout.len(), 1);
        let entry = function.entry().unwrap();
        assert!(function.block(entry).insts.is_empty());
        assert_eq!(
            function.block(entry).terminator,
            Some(Terminator::Ret(Operand::Arg(0)))
        );
    }
}
