//! Textual form of the IR.

use crate::ir::{Function, InstKind, Module, Operand, Terminator, Type};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Formats a double the way assembly listings do (e.g. `1.000000e+00`).
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "0x7FF8000000000000".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "0x7FF0000000000000".to_string()
        } else {
            "0xFFF0000000000000".to_string()
        };
    }
    let formatted = format!("{:.6e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => formatted,
    }
}

fn type_name(ty: Type) -> &'static str {
    match ty {
        Type::Double => "double",
        Type::I1 => "i1",
    }
}

/// Assigns unique printable names, appending a counter on collision (`x`, `x1`, `x2`, ...).
#[derive(Default)]
struct Namer {
    used: HashSet<String>,
    counters: HashMap<String, usize>,
}

impl Namer {
    fn unique(&mut self, hint: &str) -> String {
        let hint = if hint.is_empty() { "tmp" } else { hint };
        if self.used.insert(hint.to_string()) {
            return hint.to_string();
        }
        let counter = self.counters.entry(hint.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}{}", hint, counter);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Printable names for one function: arguments, used slots, results and blocks share one namespace.
struct Names {
    args: Vec<String>,
    slots: Vec<Option<String>>,
    insts: Vec<Option<String>>,
    blocks: Vec<Option<String>>,
}

impl Names {
    fn new(function: &Function) -> Self {
        let mut namer = Namer::default();
        let args = function
            .params
            .iter()
            .map(|param| namer.unique(param))
            .collect();
        let slots = function
            .slot_usage()
            .iter()
            .zip(&function.slots)
            .map(|(usage, name)| {
                if usage.is_used() {
                    Some(namer.unique(name))
                } else {
                    None
                }
            })
            .collect();
        let mut insts = vec![None; function.insts.len()];
        let mut blocks = vec![None; function.blocks.len()];
        for &block in &function.layout {
            blocks[block.0] = Some(namer.unique(&function.block(block).name));
            for &inst in &function.block(block).insts {
                if function.inst(inst).kind.ty().is_some() {
                    insts[inst.0] = Some(namer.unique(&function.inst(inst).name));
                }
            }
        }
        Self {
            args,
            slots,
            insts,
            blocks,
        }
    }

    fn operand(&self, operand: Operand) -> String {
        match operand {
            Operand::Inst(id) => format!(
                "%{}",
                self.insts[id.0].as_deref().unwrap_or("<detached>")
            ),
            Operand::Arg(index) => format!("%{}", self.args[index]),
            Operand::Const(value) => format_double(value),
            Operand::Bool(value) => value.to_string(),
        }
    }

    fn block(&self, block: crate::ir::BlockId) -> String {
        format!("%{}", self.blocks[block.0].as_deref().unwrap_or("<detached>"))
    }

    fn slot(&self, slot: crate::ir::SlotId) -> String {
        format!("%{}", self.slots[slot.0].as_deref().unwrap_or("<unused>"))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = Names::new(self);
        let params = names
            .args
            .iter()
            .map(|arg| format!("double %{}", arg))
            .collect::<Vec<_>>()
            .join(", ");

        if self.is_declaration() {
            return writeln!(f, "declare double @{}({})", self.name, params);
        }

        writeln!(f, "define double @{}({}) {{", self.name, params)?;
        for (index, &block) in self.layout.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", &names.block(block)[1..])?;
            if index == 0 {
                for slot in names.slots.iter().flatten() {
                    writeln!(f, "  %{} = alloca double", slot)?;
                }
            }
            for &inst in &self.block(block).insts {
                write!(f, "  ")?;
                let kind = &self.inst(inst).kind;
                if let Some(name) = &names.insts[inst.0] {
                    write!(f, "%{} = ", name)?;
                }
                match kind {
                    InstKind::Binary { op, lhs, rhs } => writeln!(
                        f,
                        "{} double {}, {}",
                        op.mnemonic(),
                        names.operand(*lhs),
                        names.operand(*rhs)
                    )?,
                    InstKind::FCmp { pred, lhs, rhs } => writeln!(
                        f,
                        "fcmp {} double {}, {}",
                        pred.mnemonic(),
                        names.operand(*lhs),
                        names.operand(*rhs)
                    )?,
                    InstKind::UiToFp(value) => {
                        writeln!(f, "uitofp i1 {} to double", names.operand(*value))?
                    }
                    InstKind::Load(slot) => {
                        writeln!(f, "load double, double* {}", names.slot(*slot))?
                    }
                    InstKind::Store { slot, value } => writeln!(
                        f,
                        "store double {}, double* {}",
                        names.operand(*value),
                        names.slot(*slot)
                    )?,
                    InstKind::Call { callee, args } => {
                        let args = args
                            .iter()
                            .map(|arg| format!("double {}", names.operand(*arg)))
                            .collect::<Vec<_>>()
                            .join(", ");
                        writeln!(f, "call double @{}({})", callee, args)?
                    }
                    InstKind::Phi(incoming) => {
                        let incoming = incoming
                            .iter()
                            .map(|(value, block)| {
                                format!("[ {}, {} ]", names.operand(*value), names.block(*block))
                            })
                            .collect::<Vec<_>>()
                            .join(", ");
                        writeln!(f, "phi double {}", incoming)?
                    }
                }
            }
            match &self.block(block).terminator {
                Some(Terminator::Br(target)) => writeln!(f, "  br label {}", names.block(*target))?,
                Some(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                }) => writeln!(
                    f,
                    "  br i1 {}, label {}, label {}",
                    names.operand(*cond),
                    names.block(*then_block),
                    names.block(*else_block)
                )?,
                Some(Terminator::Ret(value)) => {
                    let ty = self.operand_type(*value).unwrap_or(Type::Double);
                    writeln!(f, "  ret {} {}", type_name(ty), names.operand(*value))?
                }
                None => writeln!(f, "  <unterminated>")?,
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name())?;
        for function in self.functions() {
            writeln!(f)?;
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::ir::{BinaryOp, CmpPredicate};

    #[test]
    fn test_format_double() {
        assert_eq!(format_double(1.0), "1.000000e+00");
        assert_eq!(format_double(0.0), "0.000000e+00");
        assert_eq!(format_double(-2.5), "-2.500000e+00");
        assert_eq!(format_double(1234.0), "1.234000e+03");
        assert_eq!(format_double(0.001), "1.000000e-03");
        assert_eq!(format_double(f64::NAN), "0x7FF8000000000000");
    }

    #[test]
    fn test_print_declaration() {
        let function = Function::declaration("putchard", vec!["char".to_string()]);
        assert_eq!(function.to_string(), "declare double @putchard(double %char)\n");
    }

    #[test]
    fn test_print_definition() {
        let mut builder = Builder::new(Function::declaration("sq", vec!["x".to_string()]));
        let slot = builder.build_alloca("x");
        builder.build_store(slot, Operand::Arg(0));
        let lhs = builder.build_load(slot, "x");
        let rhs = builder.build_load(slot, "x");
        let product = builder.build_binary(BinaryOp::Mul, lhs, rhs, "multmp");
        builder.build_ret(product);

        assert_eq!(
            builder.finish().to_string(),
            "define double @sq(double %x) {\n\
             entry:\n  \
             %x1 = alloca double\n  \
             store double %x, double* %x1\n  \
             %x2 = load double, double* %x1\n  \
             %x3 = load double, double* %x1\n  \
             %multmp = fmul double %x2, %x3\n  \
             ret double %multmp\n\
             }\n"
        );
    }

    #[test]
    fn test_print_branches() {
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
            vec![(Operand::Const(1.0), then_block), (Operand::Arg(0), else_block)],
            "iftmp",
        );
        builder.build_ret(phi);

        let text = builder.finish().to_string();
        assert!(text.contains("%ifcond = fcmp one double %x, 0.000000e+00\n"));
        assert!(text.contains("  br i1 %ifcond, label %then, label %else\n"));
        assert!(text.contains("\nifcont:\n  %iftmp = phi double [ 1.000000e+00, %then ], [ %x, %else ]\n"));
    }
}
