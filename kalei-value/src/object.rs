//! Runtime function objects.

use crate::chunk::Chunk;
use crate::Value;
use std::fmt;
use std::rc::Rc;

/// Where a linked symbol lives: in the table of compiled functions or of native functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    Compiled(usize),
    Native(usize),
}

/// A function lowered to bytecode.
#[derive(Debug, Clone)]
pub struct CompiledFn {
    pub ident: String,
    /// Number of arguments that the function accepts.
    pub arity: u8,
    pub chunk: Chunk,
    /// Addresses of `chunk.imports`, filled in by the linker. `None` for a symbol that was not
    /// defined yet when the function was linked; it is looked up again when called.
    pub imports: Vec<Option<Address>>,
}

/// A function implemented in Rust and callable from compiled code.
#[derive(Clone)]
pub struct NativeFn {
    pub ident: String,
    pub arity: u8,
    pub func: Rc<dyn Fn(&[Value]) -> Value>,
}

impl NativeFn {
    pub fn new(ident: impl ToString, arity: u8, func: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self {
            ident: ident.to_string(),
            arity,
            func: Rc::new(func),
        }
    }

    pub fn call(&self, args: &[Value]) -> Value {
        debug_assert_eq!(args.len(), self.arity as usize);
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}/{}>", self.ident, self.arity)
    }
}
