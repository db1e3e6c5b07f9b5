use crate::ast::{
    BinaryExpr, CallExpr, DeclarationExpr, Expr, ForExpr, Function, IfExpr, Item, OperatorKind,
    Prototype, UnaryExpr, DEFAULT_OPERATOR_PRECEDENCE,
};
use crate::lexer::Token;
use crate::precedence::{PrecedenceTable, PRECEDENCE_RANGE};
use kalei_source::{Source, SyntaxError};
use logos::{Lexer, Logos};
use std::mem;

mod expr;
mod item;

pub struct Parser<'a> {
    /// Cached token for peeking.
    current_token: Token,
    lexer: Lexer<'a, Token>,
    /// Source code
    source: &'a Source<'a>,
    /// Binary operators known to the parser. Grows when a `binary` prototype is parsed.
    precedence: PrecedenceTable,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a Source<'a>) -> Self {
        Self::with_precedence(source, PrecedenceTable::default())
    }

    /// Create a parser that continues with a previously extracted operator table.
    pub fn with_precedence(source: &'a Source<'a>, precedence: PrecedenceTable) -> Self {
        let mut lexer = Token::lexer(source.content);
        Self {
            current_token: lexer.next().unwrap_or(Token::Eof),
            lexer,
            source,
            precedence,
        }
    }

    pub fn precedence(&self) -> &PrecedenceTable {
        &self.precedence
    }

    /// Consumes the parser and returns its operator table, including user defined operators.
    pub fn into_precedence(self) -> PrecedenceTable {
        self.precedence
    }

    /// Parses every top-level item until the end of input.
    /// Items that fail to parse are reported to the [`Source`] and skipped.
    pub fn parse_program(&mut self) -> Vec<Item> {
        let mut items = Vec::new();
        loop {
            match self.current_token {
                Token::Eof => break,
                Token::Semi => {
                    self.next();
                }
                _ => match self.parse_item() {
                    Some(item) => items.push(item),
                    None => self.synchronize(),
                },
            }
        }
        items
    }
}

/// Parse utilities
impl<'a> Parser<'a> {
    fn next(&mut self) -> Token {
        let token = self.lexer.next().unwrap_or(Token::Eof);
        self.current_token = token.clone();
        token
    }

    /// Predicate that tests whether the next token has the same discriminant and eats the next token if yes as a side effect.
    fn eat(&mut self, tok: Token) -> bool {
        if mem::discriminant(&self.current_token) == mem::discriminant(&tok) {
            self.next(); // eat token
            true
        } else {
            false
        }
    }

    /// Like [`Self::eat`] but also compares the operator character.
    fn eat_op(&mut self, op: char) -> bool {
        if self.current_token == Token::Op(op) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token) -> Option<()> {
        if self.eat(tok) {
            Some(())
        } else {
            self.unexpected()
        }
    }

    fn expect_op(&mut self, op: char) -> Option<()> {
        if self.eat_op(op) {
            Some(())
        } else {
            self.expected(&format!("'{}'", op))
        }
    }

    /// Raises an unexpected token error.
    fn unexpected<T>(&mut self) -> Option<T> {
        self.error(format!("Unexpected token {:?}", self.current_token))
    }

    fn expected<T>(&mut self, what: &str) -> Option<T> {
        self.error(format!("Expected {}, found {:?}", what, self.current_token))
    }

    fn error<T>(&mut self, message: String) -> Option<T> {
        self.source
            .errors
            .add_error(SyntaxError::new(message, self.lexer.span()));
        None
    }

    /// Skips tokens until a point where a new item can start.
    fn synchronize(&mut self) {
        loop {
            match self.current_token {
                Token::Semi | Token::Def | Token::Extern | Token::Eof => break,
                _ => {
                    self.next();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(source: &str) -> Vec<Item> {
        let source: Source = source.into();
        let items = Parser::new(&source).parse_program();
        assert!(source.has_no_errors(), "{}", source.report());
        items
    }

    #[test]
    fn test_program() {
        let items = program("def sq(x) x * x; extern printd(x); sq(5);");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].name(), "sq");
        assert!(matches!(items[1], Item::Extern(_)));
        match &items[2] {
            Item::Function(func) => {
                assert!(func.proto.is_anonymous());
                assert!(matches!(func.body, Expr::Call(_)));
            }
            item => panic!("expected anonymous function, found {:?}", item),
        }
    }

    #[test]
    fn test_program_without_semicolons() {
        let items = program("def one() 1\none()\n# comment\n2");
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_error_recovery() {
        let source: Source = "def (x) 1; 2 + 3; extern; 4".into();
        let items = Parser::new(&source).parse_program();
        assert_eq!(source.errors.len(), 2);
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1],
            Item::Function(Function::anonymous(Expr::Number(4.0)))
        );
    }

    #[test]
    fn test_precedence_is_carried_over() {
        let first: Source = "def binary| 5 (a b) if a then 1 else b".into();
        let mut parser = Parser::new(&first);
        parser.parse_program();
        let precedence = parser.into_precedence();
        assert_eq!(precedence.get('|'), Some(5));

        let second: Source = "1 | 0 < 1".into();
        let items = Parser::with_precedence(&second, precedence).parse_program();
        assert!(second.has_no_errors());
        match &items[..] {
            [Item::Function(func)] => match &func.body {
                Expr::Binary(BinaryExpr { op: '|', rhs, .. }) => {
                    assert!(matches!(**rhs, Expr::Binary(BinaryExpr { op: '<', .. })));
                }
                body => panic!("unexpected body {:?}", body),
            },
            items => panic!("unexpected items {:?}", items),
        }
    }
}
