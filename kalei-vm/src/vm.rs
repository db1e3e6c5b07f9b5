use crate::error::{LinkError, RuntimeError};
use crate::jit::Jit;
use kalei_value::chunk::OpCode;
use kalei_value::ir::{BinaryOp, CmpPredicate};
use kalei_value::object::{Address, CompiledFn};
use kalei_value::{Value, ValueArray};
use num_traits::FromPrimitive;
use std::mem;
use std::rc::Rc;

/// Default limit of nested calls before execution is aborted.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;

struct CallFrame {
    function: Rc<CompiledFn>,
    /// Instruction pointer.
    ip: usize,
    /// Index of register 0 of this frame in the register stack.
    base: usize,
    /// Register of the caller receiving the return value.
    ret_dst: u16,
}

impl CallFrame {
    fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.function.chunk.code.get(self.ip)?;
        self.ip += 1;
        Some(byte)
    }

    fn read_u16(&mut self) -> Option<u16> {
        let hi = self.read_byte()?;
        let lo = self.read_byte()?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    fn invalid_instruction(&self) -> RuntimeError {
        RuntimeError::InvalidInstruction {
            function: self.function.ident.clone(),
            offset: self.ip,
        }
    }
}

/// Executes linked bytecode.
///
/// Calls between compiled functions do not recurse on the Rust stack: each call pushes a
/// [`CallFrame`] and a window of registers.
pub struct Vm<'a> {
    jit: &'a Jit,
    /// Register windows of every active frame.
    registers: ValueArray,
    /// Suspended callers. The running frame is kept out of this stack.
    call_stack: Vec<CallFrame>,
    max_call_depth: usize,
}

impl<'a> Vm<'a> {
    pub fn new(jit: &'a Jit, max_call_depth: usize) -> Self {
        Self {
            jit,
            registers: Vec::with_capacity(256),
            call_stack: Vec::new(),
            max_call_depth,
        }
    }

    /// Calls the function at `address` with `args` and runs it to completion.
    pub fn call(&mut self, address: Address, args: &[Value]) -> Result<Value, RuntimeError> {
        match address {
            Address::Native(index) => {
                let native = self
                    .jit
                    .native(index)
                    .ok_or_else(|| RuntimeError::DanglingFunction {
                        name: format!("<native {}>", index),
                    })?;
                check_arity(&native.ident, native.arity, args.len())?;
                Ok(native.call(args))
            }
            Address::Compiled(index) => {
                let function =
                    self.jit
                        .compiled(index)
                        .cloned()
                        .ok_or_else(|| RuntimeError::DanglingFunction {
                            name: format!("<compiled {}>", index),
                        })?;
                check_arity(&function.ident, function.arity, args.len())?;
                self.registers.clear();
                self.call_stack.clear();
                self.registers
                    .resize(function.chunk.register_count as usize, 0.0);
                self.registers[..args.len()].copy_from_slice(args);
                self.run(CallFrame {
                    function,
                    ip: 0,
                    base: 0,
                    ret_dst: 0,
                })
            }
        }
    }

    /// Looks up an import that was not defined yet when its caller was linked.
    fn resolve_deferred(&self, name: &str, arity: usize) -> Result<Address, LinkError> {
        let address = self
            .jit
            .find_symbol(name)
            .ok_or_else(|| LinkError::UnresolvedSymbol {
                name: name.to_string(),
            })?;
        match self.jit.arity_of(address) {
            Some(expected) if expected == arity => Ok(address),
            Some(expected) => Err(LinkError::ArityMismatch {
                name: name.to_string(),
                expected,
                found: arity,
            }),
            None => Err(LinkError::UnresolvedSymbol {
                name: name.to_string(),
            }),
        }
    }

    fn run(&mut self, mut frame: CallFrame) -> Result<Value, RuntimeError> {
        macro_rules! operand {
            () => {
                match frame.read_u16() {
                    Some(operand) => operand,
                    None => return Err(frame.invalid_instruction()),
                }
            };
        }

        macro_rules! reg {
            ($index: expr) => {
                match self.registers.get(frame.base + $index as usize) {
                    Some(value) => *value,
                    None => return Err(frame.invalid_instruction()),
                }
            };
        }

        macro_rules! set_reg {
            ($index: expr, $value: expr) => {{
                let value: Value = $value;
                match self.registers.get_mut(frame.base + $index as usize) {
                    Some(slot) => *slot = value,
                    None => return Err(frame.invalid_instruction()),
                }
            }};
        }

        /// Generate vm for binary operator.
        macro_rules! gen_num_binary_op {
            (|$a: ident, $b: ident| $result: expr) => {{
                let dst = operand!();
                let $a = reg!(operand!());
                let $b = reg!(operand!());
                set_reg!(dst, $result);
            }};
        }

        loop {
            let byte = match frame.read_byte() {
                Some(byte) => byte,
                None => return Err(frame.invalid_instruction()),
            };
            match OpCode::from_u8(byte) {
                Some(OpCode::Ldc) => {
                    let dst = operand!();
                    let index = operand!();
                    let constant = match frame.function.chunk.constants.get(index as usize) {
                        Some(constant) => *constant,
                        None => return Err(frame.invalid_instruction()),
                    };
                    set_reg!(dst, constant);
                }
                Some(OpCode::Mov) => {
                    let dst = operand!();
                    let src = reg!(operand!());
                    set_reg!(dst, src);
                }
                Some(OpCode::Add) => gen_num_binary_op!(|a, b| BinaryOp::Add.apply(a, b)),
                Some(OpCode::Sub) => gen_num_binary_op!(|a, b| BinaryOp::Sub.apply(a, b)),
                Some(OpCode::Mul) => gen_num_binary_op!(|a, b| BinaryOp::Mul.apply(a, b)),
                Some(OpCode::Div) => gen_num_binary_op!(|a, b| BinaryOp::Div.apply(a, b)),
                Some(OpCode::Lt) => {
                    gen_num_binary_op!(|a, b| bool_to_value(CmpPredicate::Ult.apply(a, b)))
                }
                Some(OpCode::Ne) => {
                    gen_num_binary_op!(|a, b| bool_to_value(CmpPredicate::One.apply(a, b)))
                }
                Some(OpCode::Jmp) => {
                    frame.ip = operand!() as usize;
                }
                Some(OpCode::JmpIfFalse) => {
                    let cond = reg!(operand!());
                    let target = operand!();
                    if cond == 0.0 {
                        frame.ip = target as usize;
                    }
                }
                Some(OpCode::Call) => {
                    let dst = operand!();
                    let import = operand!() as usize;
                    let first_arg = frame.base + operand!() as usize;

                    let (name, arity) = match frame.function.chunk.imports.get(import) {
                        Some(import) => (import.name.clone(), import.arity as usize),
                        None => return Err(frame.invalid_instruction()),
                    };
                    let address = match frame.function.imports.get(import) {
                        Some(Some(address)) => *address,
                        Some(None) => self.resolve_deferred(&name, arity)?,
                        None => return Err(frame.invalid_instruction()),
                    };
                    if first_arg + arity > self.registers.len() {
                        return Err(frame.invalid_instruction());
                    }

                    match address {
                        Address::Native(index) => {
                            let native = self
                                .jit
                                .native(index)
                                .ok_or(RuntimeError::DanglingFunction { name })?;
                            check_arity(&native.ident, native.arity, arity)?;
                            let result =
                                native.call(&self.registers[first_arg..first_arg + arity]);
                            set_reg!(dst, result);
                        }
                        Address::Compiled(index) => {
                            let callee = self
                                .jit
                                .compiled(index)
                                .cloned()
                                .ok_or(RuntimeError::DanglingFunction { name })?;
                            check_arity(&callee.ident, callee.arity, arity)?;

                            // the running frame plus the one being pushed
                            let depth = self.call_stack.len() + 2;
                            if depth > self.max_call_depth {
                                return Err(RuntimeError::StackOverflow {
                                    depth: self.max_call_depth,
                                });
                            }

                            let base =
                                frame.base + frame.function.chunk.register_count as usize;
                            self.registers.truncate(base);
                            self.registers
                                .resize(base + callee.chunk.register_count as usize, 0.0);
                            self.registers
                                .copy_within(first_arg..first_arg + arity, base);

                            let caller = mem::replace(
                                &mut frame,
                                CallFrame {
                                    function: callee,
                                    ip: 0,
                                    base,
                                    ret_dst: dst,
                                },
                            );
                            self.call_stack.push(caller);
                        }
                    }
                }
                Some(OpCode::Ret) => {
                    let value = reg!(operand!());
                    match self.call_stack.pop() {
                        Some(caller) => {
                            let dst = frame.ret_dst;
                            frame = caller;
                            set_reg!(dst, value);
                        }
                        None => return Ok(value),
                    }
                }
                None => {
                    frame.ip -= 1;
                    return Err(frame.invalid_instruction());
                }
            }
        }
    }
}

fn bool_to_value(value: bool) -> Value {
    if value {
        1.0
    } else {
        0.0
    }
}

fn check_arity(name: &str, expected: u8, found: usize) -> Result<(), RuntimeError> {
    if expected as usize == found {
        Ok(())
    } else {
        Err(RuntimeError::ArityMismatch {
            name: name.to_string(),
            expected: expected as usize,
            found,
        })
    }
}
