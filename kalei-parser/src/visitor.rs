//! Visitor pattern for AST nodes.

use crate::ast::{BinaryExpr, CallExpr, DeclarationExpr, Expr, ForExpr, IfExpr, UnaryExpr};

/// One handler per [`Expr`] variant. Adding a node kind means adding a method here and handling it
/// in every visitor.
pub trait Visitor<'ast>: Sized {
    type Output;

    fn visit_number(&mut self, value: f64) -> Self::Output;
    fn visit_variable(&mut self, name: &'ast str) -> Self::Output;
    fn visit_unary(&mut self, expr: &'ast UnaryExpr) -> Self::Output;
    fn visit_binary(&mut self, expr: &'ast BinaryExpr) -> Self::Output;
    fn visit_declaration(&mut self, expr: &'ast DeclarationExpr) -> Self::Output;
    fn visit_call(&mut self, expr: &'ast CallExpr) -> Self::Output;
    fn visit_if(&mut self, expr: &'ast IfExpr) -> Self::Output;
    fn visit_for(&mut self, expr: &'ast ForExpr) -> Self::Output;
}

impl Expr {
    /// Dispatches to the `visitor` handler matching the concrete node kind.
    pub fn accept<'ast, V: Visitor<'ast>>(&'ast self, visitor: &mut V) -> V::Output {
        match self {
            Expr::Number(value) => visitor.visit_number(*value),
            Expr::Variable(name) => visitor.visit_variable(name),
            Expr::Unary(expr) => visitor.visit_unary(expr),
            Expr::Binary(expr) => visitor.visit_binary(expr),
            Expr::Declaration(expr) => visitor.visit_declaration(expr),
            Expr::Call(expr) => visitor.visit_call(expr),
            Expr::If(expr) => visitor.visit_if(expr),
            Expr::For(expr) => visitor.visit_for(expr),
        }
    }
}
