//! Binary operator precedence table.

use std::collections::HashMap;

/// Valid precedences for user defined binary operators.
pub const PRECEDENCE_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Maps binary operator characters to their precedence. Higher binds tighter.
/// User defined operators are installed while parsing their `binary` prototype.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecedenceTable {
    precedences: HashMap<char, u32>,
}

impl PrecedenceTable {
    /// Create a table without any operators.
    pub fn empty() -> Self {
        Self {
            precedences: HashMap::new(),
        }
    }

    pub fn get(&self, op: char) -> Option<u32> {
        self.precedences.get(&op).copied()
    }

    /// Installs (or overrides) the precedence of `op`.
    pub fn install(&mut self, op: char, precedence: u32) {
        self.precedences.insert(op, precedence);
    }

    /// Returns the binary binding power or `None` if `op` is not a binary operator.
    /// Binding power `0` and `1` is reserved for accepting any expression.
    /// Assignment (`=`) is the only right associative operator.
    pub fn binding_power(&self, op: char) -> Option<(u32, u32)> {
        let precedence = self.get(op)?;
        if op == '=' {
            Some((precedence * 2 + 1, precedence * 2))
        } else {
            Some((precedence * 2, precedence * 2 + 1))
        }
    }
}

impl Default for PrecedenceTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.install('=', 2);
        table.install('<', 10);
        table.install('+', 20);
        table.install('-', 20);
        table.install('*', 40);
        table.install('/', 40);
        table
    }
}
