//! Backend data model: IR, bytecode and runtime objects.

pub mod builder;
pub mod chunk;
pub mod disassemble;
pub mod ir;
pub mod object;
pub mod print;

/// The only runtime type of the language. Booleans are `0.0` and `1.0`.
pub type Value = f64;

pub type ValueArray = Vec<Value>;
