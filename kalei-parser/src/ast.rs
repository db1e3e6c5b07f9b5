//! AST node model.
//!
//! Nodes are plain data. All semantics live in the code generator, which reaches the nodes through
//! [`Expr::accept`](crate::visitor) dispatch.

/// Name of the nameless function wrapping a top-level expression.
pub const ANON_FN_NAME: &str = "__anon_expr";

/// Precedence given to a user defined binary operator that does not specify one.
pub const DEFAULT_OPERATOR_PRECEDENCE: u32 = 30;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A number literal (e.g. `1.5`).
    Number(f64),
    /// A variable reference (e.g. `foo`).
    Variable(String),
    /// A prefix operator application (e.g. `!x`).
    Unary(UnaryExpr),
    /// A binary expression (e.g. `1 + 1`).
    Binary(BinaryExpr),
    /// Variable declarations scoped to a body (e.g. `var a = 1, b in a + b`).
    Declaration(DeclarationExpr),
    /// A function call (e.g. `foo(1, 2)`).
    Call(CallExpr),
    If(IfExpr),
    For(ForExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub op: char,
    pub operand: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: char,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclarationExpr {
    /// Declared names with their optional initializers, in source order.
    pub vars: Vec<(String, Option<Expr>)>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub callee: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfExpr {
    pub cond: Box<Expr>,
    pub then: Box<Expr>,
    /// `None` when the source omitted the else branch. Code generation rejects this.
    pub otherwise: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForExpr {
    pub var: String,
    pub start: Box<Expr>,
    pub end: Box<Expr>,
    pub step: Box<Expr>,
    pub body: Box<Expr>,
}

/// Marks a prototype that installs an overloaded operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatorKind {
    Unary,
    Binary { precedence: u32 },
}

/// A function signature: name, parameter names and operator metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
    pub operator: Option<OperatorKind>,
}

impl Prototype {
    pub fn new(name: impl ToString, params: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            params,
            operator: None,
        }
    }

    /// Prototype of the nameless function wrapping a top-level expression.
    pub fn anonymous() -> Self {
        Self::new(ANON_FN_NAME, Vec::new())
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_anonymous(&self) -> bool {
        self.name == ANON_FN_NAME
    }

    pub fn is_unary_op(&self) -> bool {
        matches!(self.operator, Some(OperatorKind::Unary))
    }

    pub fn is_binary_op(&self) -> bool {
        matches!(self.operator, Some(OperatorKind::Binary { .. }))
    }

    /// The operator character for `unary<op>` and `binary<op>` prototypes.
    pub fn operator_name(&self) -> Option<char> {
        self.operator?;
        self.name.chars().last()
    }

    pub fn precedence(&self) -> Option<u32> {
        match self.operator {
            Some(OperatorKind::Binary { precedence }) => Some(precedence),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub proto: Prototype,
    pub body: Expr,
}

impl Function {
    /// Wraps a top-level expression into a nameless function.
    pub fn anonymous(body: Expr) -> Self {
        Self {
            proto: Prototype::anonymous(),
            body,
        }
    }
}

/// A top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// A function definition. Bare expressions are wrapped as [`ANON_FN_NAME`] functions.
    Function(Function),
    /// An `extern` declaration.
    Extern(Prototype),
}

impl Item {
    pub fn name(&self) -> &str {
        match self {
            Item::Function(func) => &func.proto.name,
            Item::Extern(proto) => &proto.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_metadata() {
        let proto = Prototype {
            name: "binary|".to_string(),
            params: vec!["a".to_string(), "b".to_string()],
            operator: Some(OperatorKind::Binary { precedence: 5 }),
        };
        assert!(proto.is_binary_op());
        assert!(!proto.is_unary_op());
        assert_eq!(proto.operator_name(), Some('|'));
        assert_eq!(proto.precedence(), Some(5));

        let plain = Prototype::new("foo", vec![]);
        assert_eq!(plain.operator_name(), None);
        assert_eq!(plain.precedence(), None);
    }

    #[test]
    fn test_anonymous() {
        let func = Function::anonymous(Expr::Number(1.0));
        assert!(func.proto.is_anonymous());
        assert_eq!(func.proto.arity(), 0);
        assert_eq!(Item::Function(func).name(), ANON_FN_NAME);
    }
}
