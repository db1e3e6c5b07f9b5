//! Lowers AST into IR.

use crate::error::CodegenError;
use crate::registry::PrototypeRegistry;
use crate::scope::{ScopeTable, Shadowed};
use kalei_parser::ast::{
    self, BinaryExpr, CallExpr, DeclarationExpr, Expr, ForExpr, IfExpr, Prototype, UnaryExpr,
};
use kalei_parser::visitor::Visitor;
use kalei_passes::verify::verify_function;
use kalei_passes::PassManager;
use kalei_value::builder::Builder;
use kalei_value::ir::{BinaryOp, BlockId, CmpPredicate, Function, Module, Operand, SlotId};
use tracing::debug;

/// Declares `name` in `module`, replacing a declaration with a different parameter count.
fn declare(module: &mut Module, name: &str, params: &[String]) {
    let stale = module
        .get_function(name)
        .map_or(false, |func| func.is_declaration() && func.arity() != params.len());
    if stale {
        module.define(Function::declaration(name, params.to_vec()));
    } else {
        module.declare(name, params);
    }
}

/// Declares the signature of `proto` in `module`.
pub fn codegen_prototype(module: &mut Module, proto: &Prototype) {
    declare(module, &proto.name, &proto.params);
}

/// Generates the body of one function.
pub struct Codegen<'a> {
    /// The compilation unit the function is generated into.
    module: &'a mut Module,
    /// Signatures from earlier units, declared in `module` on first use.
    registry: &'a PrototypeRegistry,
    builder: Builder,
    scope: ScopeTable,
}

impl<'a> Codegen<'a> {
    /// Generates `func` into `module`, then verifies and optimizes it with `passes`.
    ///
    /// The signature is declared before the body is generated so that the body can call the
    /// function recursively. On error the module may keep that declaration but never a partial body.
    pub fn codegen_function(
        module: &'a mut Module,
        registry: &'a PrototypeRegistry,
        passes: &PassManager,
        func: &ast::Function,
    ) -> Result<(), CodegenError> {
        let proto = &func.proto;
        declare(module, &proto.name, &proto.params);

        let mut codegen = Codegen {
            module,
            registry,
            builder: Builder::new(Function::declaration(&proto.name, proto.params.clone())),
            scope: ScopeTable::new(),
        };
        for (index, param) in proto.params.iter().enumerate() {
            let slot = codegen.builder.build_alloca(param);
            codegen.builder.build_store(slot, Operand::Arg(index));
            codegen.scope.bind_param(param, slot);
        }

        let value = func.body.accept(&mut codegen)?;
        codegen.builder.build_ret(value);

        let Codegen {
            module, builder, ..
        } = codegen;
        let mut function = builder.finish();
        verify_function(&function)?;
        let rounds = passes.run(&mut function);
        debug!(function = %function.name, rounds, "generated function");
        module.define(function);
        Ok(())
    }

    /// Arity of the function called `name`, declaring it from the registry if needed.
    fn function_arity(&mut self, name: &str) -> Option<usize> {
        if let Some(func) = self.module.get_function(name) {
            return Some(func.arity());
        }
        let proto = self.registry.get(name)?;
        declare(self.module, &proto.name, &proto.params);
        Some(proto.arity())
    }

    /// Fails unless `callee` is known and takes `found` arguments.
    fn check_arity(&mut self, callee: &str, found: usize) -> Result<(), CodegenError> {
        let expected = self
            .function_arity(callee)
            .ok_or_else(|| CodegenError::UnknownFunction(callee.to_string()))?;
        if expected != found {
            return Err(CodegenError::ArityMismatch {
                callee: callee.to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }

    fn build_checked_call(
        &mut self,
        callee: &str,
        args: Vec<Operand>,
        name: &str,
    ) -> Result<Operand, CodegenError> {
        self.check_arity(callee, args.len())?;
        Ok(self.builder.build_call(callee, args, name))
    }

    /// Allocates, initializes and binds each variable in order. Each initializer sees the variables
    /// bound before it but not itself.
    fn bind_vars(
        &mut self,
        vars: &[(String, Option<Expr>)],
        shadowed: &mut Vec<Shadowed>,
    ) -> Result<(), CodegenError> {
        for (name, init) in vars {
            let slot = self.builder.build_alloca(name);
            let value = match init {
                Some(init) => init.accept(self)?,
                None => Operand::Const(0.0),
            };
            self.builder.build_store(slot, value);
            shadowed.push(self.scope.bind(name, slot));
        }
        Ok(())
    }

    /// Emits the loop body, the increment and the exit test, leaving the cursor after the loop.
    fn codegen_loop(
        &mut self,
        expr: &ForExpr,
        slot: SlotId,
        loop_block: BlockId,
    ) -> Result<(), CodegenError> {
        expr.body.accept(self)?;
        let step = expr.step.accept(self)?;
        let current = self.builder.build_load(slot, &expr.var);
        let next = self
            .builder
            .build_binary(BinaryOp::Add, current, step, "nextvar");
        self.builder.build_store(slot, next);

        // the test sees the incremented variable
        let end = expr.end.accept(self)?;
        let end = self
            .builder
            .build_fcmp(CmpPredicate::One, end, Operand::Const(0.0), "loopcond");
        let after_block = self.builder.append_new_block("afterloop");
        self.builder.build_cond_br(end, loop_block, after_block);
        self.builder.position_at_end(after_block);
        Ok(())
    }
}

impl<'a, 'ast> Visitor<'ast> for Codegen<'a> {
    type Output = Result<Operand, CodegenError>;

    fn visit_number(&mut self, value: f64) -> Self::Output {
        Ok(Operand::Const(value))
    }

    fn visit_variable(&mut self, name: &'ast str) -> Self::Output {
        let slot = self
            .scope
            .get(name)
            .ok_or_else(|| CodegenError::UnknownVariable(name.to_string()))?;
        Ok(self.builder.build_load(slot, name))
    }

    fn visit_unary(&mut self, expr: &'ast UnaryExpr) -> Self::Output {
        let operand = expr.operand.accept(self)?;
        self.build_checked_call(&format!("unary{}", expr.op), vec![operand], "unop")
    }

    fn visit_binary(&mut self, expr: &'ast BinaryExpr) -> Self::Output {
        if expr.op == '=' {
            let name = match &*expr.lhs {
                Expr::Variable(name) => name,
                _ => return Err(CodegenError::InvalidAssignmentTarget),
            };
            let value = expr.rhs.accept(self)?;
            let slot = self
                .scope
                .get(name)
                .ok_or_else(|| CodegenError::UnknownVariable(name.clone()))?;
            self.builder.build_store(slot, value);
            return Ok(value);
        }

        let lhs = expr.lhs.accept(self)?;
        let rhs = expr.rhs.accept(self)?;
        let (op, name) = match expr.op {
            '+' => (BinaryOp::Add, "addtmp"),
            '-' => (BinaryOp::Sub, "subtmp"),
            '*' => (BinaryOp::Mul, "multmp"),
            '/' => (BinaryOp::Div, "divtmp"),
            '<' => {
                let cmp = self
                    .builder
                    .build_fcmp(CmpPredicate::Ult, lhs, rhs, "cmptmp");
                return Ok(self.builder.build_uitofp(cmp, "booltmp"));
            }
            op => return self.build_checked_call(&format!("binary{}", op), vec![lhs, rhs], "binop"),
        };
        Ok(self.builder.build_binary(op, lhs, rhs, name))
    }

    fn visit_declaration(&mut self, expr: &'ast DeclarationExpr) -> Self::Output {
        let mut shadowed = Vec::with_capacity(expr.vars.len());
        let value = self
            .bind_vars(&expr.vars, &mut shadowed)
            .and_then(|()| expr.body.accept(self));
        // restored on the error path too
        self.scope.restore_all(shadowed);
        value
    }

    fn visit_call(&mut self, expr: &'ast CallExpr) -> Self::Output {
        // checked before any argument is generated
        self.check_arity(&expr.callee, expr.args.len())?;
        let args = expr
            .args
            .iter()
            .map(|arg| arg.accept(self))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.builder.build_call(&expr.callee, args, "calltmp"))
    }

    fn visit_if(&mut self, expr: &'ast IfExpr) -> Self::Output {
        let cond = expr.cond.accept(self)?;
        let cond = self
            .builder
            .build_fcmp(CmpPredicate::One, cond, Operand::Const(0.0), "ifcond");

        let then_block = self.builder.append_new_block("then");
        let else_block = self.builder.create_block("else");
        let merge_block = self.builder.create_block("ifcont");
        self.builder.build_cond_br(cond, then_block, else_block);

        self.builder.position_at_end(then_block);
        let then_value = expr.then.accept(self)?;
        self.builder.build_br(merge_block);
        // the then branch may have opened blocks of its own
        let then_end = self.builder.insert_block();

        self.builder.append_block(else_block);
        self.builder.position_at_end(else_block);
        let otherwise = expr.otherwise.as_ref().ok_or(CodegenError::MissingElse)?;
        let else_value = otherwise.accept(self)?;
        self.builder.build_br(merge_block);
        let else_end = self.builder.insert_block();

        self.builder.append_block(merge_block);
        self.builder.position_at_end(merge_block);
        Ok(self.builder.build_phi(
            vec![(then_value, then_end), (else_value, else_end)],
            "iftmp",
        ))
    }

    fn visit_for(&mut self, expr: &'ast ForExpr) -> Self::Output {
        let slot = self.builder.build_alloca(&expr.var);
        let start = expr.start.accept(self)?;
        self.builder.build_store(slot, start);

        let loop_block = self.builder.append_new_block("loop");
        self.builder.build_br(loop_block);
        self.builder.position_at_end(loop_block);

        let shadowed = self.scope.bind(&expr.var, slot);
        let result = self.codegen_loop(expr, slot, loop_block);
        self.scope.restore(shadowed);
        result?;

        Ok(Operand::Const(0.0))
    }
}
