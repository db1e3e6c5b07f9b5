//! Definitions for [`Chunk`] and [`OpCode`].
//!
//! The bytecode is register based. Every operand is a `u16` stored big endian right after the
//! opcode byte. Registers hold [`Value`]s; comparison results are stored as `0.0` or `1.0`.

use crate::{Value, ValueArray};
use enum_primitive_derive::Primitive;
use std::collections::HashMap;
use std::convert::TryFrom;

/// Represents an opcode. Internally represented using 1 byte (`u8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum OpCode {
    /// Load a constant into a register.
    /// *5 bytes (dst, constant)*
    Ldc = 0,
    /// Copy a register.
    /// *5 bytes (dst, src)*
    Mov = 1,
    Add = 2,
    Sub = 3,
    Mul = 4,
    Div = 5,
    /// `dst = !(lhs >= rhs)`, i.e. unordered or less than.
    /// *7 bytes (dst, lhs, rhs)*
    Lt = 6,
    /// `dst = lhs < rhs || lhs > rhs`, i.e. ordered and not equal.
    /// *7 bytes (dst, lhs, rhs)*
    Ne = 7,
    /// Jump to an absolute offset.
    /// *3 bytes (target)*
    Jmp = 8,
    /// Jump to an absolute offset if the register holds `0.0`.
    /// *5 bytes (cond, target)*
    JmpIfFalse = 9,
    /// Call an imported function. Arguments are read from consecutive registers starting at
    /// `first_arg`, the count is the arity of the import.
    /// *7 bytes (dst, import, first_arg)*
    Call = 10,
    /// Return the value of a register.
    /// *3 bytes (src)*
    Ret = 11,
}

impl OpCode {
    /// Number of `u16` operands following the opcode.
    pub fn operand_count(self) -> usize {
        match self {
            OpCode::Jmp | OpCode::Ret => 1,
            OpCode::Ldc | OpCode::Mov | OpCode::JmpIfFalse => 2,
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Lt
            | OpCode::Ne
            | OpCode::Call => 3,
        }
    }
}

/// A function referenced by a [`Chunk`]. Resolved to an address when the chunk is linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub name: String,
    pub arity: u8,
}

/// Represents a chunk of bytecode.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// A [`Vec`] of [`OpCode`]s and operands.
    pub code: Vec<u8>, // a byte array
    /// Constant table for this [`Chunk`].
    pub constants: ValueArray,
    /// Functions called by this chunk, indexed by the `call` operand.
    pub imports: Vec<Import>,
    /// Number of registers a frame of this chunk needs. Arguments occupy the first registers.
    pub register_count: u16,
    /// The name of the chunk. Should be the name of the function.
    pub name: String,
    /// Comments attached to code offsets, shown by the disassembler.
    pub debug_annotations: HashMap<usize, String>,
}

/// `u8` and `OpCode` should implement this trait.
pub trait ToByteCode {
    /// Transforms `self` into an `u8`.
    fn to_byte_code(&self) -> u8;
}

impl ToByteCode for OpCode {
    fn to_byte_code(&self) -> u8 {
        *self as u8
    }
}

impl ToByteCode for u8 {
    fn to_byte_code(&self) -> u8 {
        *self
    }
}

impl Chunk {
    /// Create an empty chunk with the specified `name`.
    ///
    /// # Example
    /// ```
    /// use kalei_value::chunk::Chunk;
    /// let chunk = Chunk::new("my_chunk".to_string());
    /// assert_eq!(chunk.name, "my_chunk");
    /// ```
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Write a single byte to the [`Chunk`]. This can be an [`OpCode`] or a raw `u8`.
    ///
    /// # Example
    /// ```
    /// use kalei_value::chunk::{Chunk, OpCode};
    /// let mut chunk = Chunk::new("my_chunk".to_string());
    /// chunk.write_chunk(OpCode::Ret);
    /// chunk.write_u16(258);
    /// assert_eq!(chunk.code, vec![11, 1, 2]);
    /// ```
    pub fn write_chunk(&mut self, opcode: impl ToByteCode) {
        self.code.push(opcode.to_byte_code());
    }

    /// Write a big endian `u16` operand.
    pub fn write_u16(&mut self, operand: u16) {
        self.code.extend_from_slice(&operand.to_be_bytes());
    }

    /// Write an instruction with its operands.
    pub fn write_instr(&mut self, opcode: OpCode, operands: &[u16]) {
        debug_assert_eq!(opcode.operand_count(), operands.len());
        self.write_chunk(opcode);
        for &operand in operands {
            self.write_u16(operand);
        }
    }

    /// Read the `u16` operand at `offset`.
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    /// Overwrite the `u16` operand at `offset`. Used to patch forward jumps.
    pub fn patch_u16(&mut self, offset: usize, operand: u16) {
        self.code[offset..offset + 2].copy_from_slice(&operand.to_be_bytes());
    }

    /// Add a constant to the constant table, reusing an identical entry if there is one.
    /// Returns the index of the constant, or `None` if the table is full.
    ///
    /// # Example
    /// ```
    /// use kalei_value::chunk::Chunk;
    /// let mut chunk = Chunk::new("my_chunk".to_string());
    /// assert_eq!(chunk.add_constant(1.5), Some(0));
    /// assert_eq!(chunk.add_constant(2.0), Some(1));
    /// assert_eq!(chunk.add_constant(1.5), Some(0));
    /// assert_eq!(chunk.constants, vec![1.5, 2.0]);
    /// ```
    pub fn add_constant(&mut self, value: Value) -> Option<u16> {
        let index = match self
            .constants
            .iter()
            .position(|constant| constant.to_bits() == value.to_bits())
        {
            Some(index) => index,
            None => {
                self.constants.push(value);
                self.constants.len() - 1
            }
        };
        u16::try_from(index).ok()
    }

    /// Add an import, reusing an existing one with the same name.
    /// Returns the index of the import, or `None` if the table is full.
    pub fn add_import(&mut self, name: &str, arity: u8) -> Option<u16> {
        let index = match self.imports.iter().position(|import| import.name == name) {
            Some(index) => index,
            None => {
                self.imports.push(Import {
                    name: name.to_string(),
                    arity,
                });
                self.imports.len() - 1
            }
        };
        u16::try_from(index).ok()
    }

    /// Attach `annotation` to the next instruction that will be written.
    pub fn annotate(&mut self, annotation: impl Into<String>) {
        let offset = self.code.len();
        match self.debug_annotations.get_mut(&offset) {
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(&annotation.into());
            }
            None => {
                self.debug_annotations.insert(offset, annotation.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_patch() {
        let mut chunk = Chunk::new("f".to_string());
        chunk.write_instr(OpCode::JmpIfFalse, &[3, 0]);
        chunk.patch_u16(3, 0x1234);
        assert_eq!(chunk.code, vec![OpCode::JmpIfFalse as u8, 0, 3, 0x12, 0x34]);
        assert_eq!(chunk.read_u16(3), 0x1234);
    }

    #[test]
    fn test_imports_are_shared() {
        let mut chunk = Chunk::new("f".to_string());
        assert_eq!(chunk.add_import("sq", 1), Some(0));
        assert_eq!(chunk.add_import("putchard", 1), Some(1));
        assert_eq!(chunk.add_import("sq", 1), Some(0));
        assert_eq!(chunk.imports.len(), 2);
    }

    #[test]
    fn test_annotations_merge() {
        let mut chunk = Chunk::new("f".to_string());
        chunk.annotate("entry");
        chunk.annotate("loop");
        assert_eq!(chunk.debug_annotations[&0], "entry, loop");
    }
}
