//! Code generation, linking and execution of parsed top-level items.

pub mod codegen;
pub mod error;
pub mod jit;
pub mod lower;
pub mod registry;
pub mod scope;
pub mod session;
pub mod vm;
