use super::*;

impl<'a> Parser<'a> {
    /// Parses a top-level item: a definition, an extern declaration or a bare expression.
    pub fn parse_item(&mut self) -> Option<Item> {
        match self.current_token {
            Token::Def => self.parse_definition().map(Item::Function),
            Token::Extern => self.parse_extern().map(Item::Extern),
            _ => self.parse_top_level_expr().map(Item::Function),
        }
    }

    fn parse_definition(&mut self) -> Option<Function> {
        self.expect(Token::Def)?;
        let proto = self.parse_prototype()?;
        let body = self.parse_expr()?;
        Some(Function { proto, body })
    }

    fn parse_extern(&mut self) -> Option<Prototype> {
        self.expect(Token::Extern)?;
        self.parse_prototype()
    }

    fn parse_top_level_expr(&mut self) -> Option<Function> {
        let body = self.parse_expr()?;
        Some(Function::anonymous(body))
    }

    /// Parses `name(params)`, `unary<op>(param)` or `binary<op> precedence? (lhs rhs)`.
    /// Parameters may be separated by whitespace or commas.
    /// A binary operator prototype installs its precedence so that the rest of the input can use it.
    pub fn parse_prototype(&mut self) -> Option<Prototype> {
        let (name, operator) = match self.current_token.clone() {
            Token::Identifier(ident) => {
                self.next();
                (ident, None)
            }
            Token::Unary => {
                self.next();
                let op = self.parse_operator_char()?;
                (format!("unary{}", op), Some((op, OperatorKind::Unary)))
            }
            Token::Binary => {
                self.next();
                let op = self.parse_operator_char()?;
                let precedence = match self.current_token {
                    Token::Number(val) => {
                        let precedence = val as u32;
                        if precedence as f64 != val || !PRECEDENCE_RANGE.contains(&precedence) {
                            return self.error(format!(
                                "Invalid precedence {}: must be {}..{}",
                                val,
                                PRECEDENCE_RANGE.start(),
                                PRECEDENCE_RANGE.end()
                            ));
                        }
                        self.next();
                        precedence
                    }
                    _ => DEFAULT_OPERATOR_PRECEDENCE,
                };
                (
                    format!("binary{}", op),
                    Some((op, OperatorKind::Binary { precedence })),
                )
            }
            _ => return self.expected("function name in prototype"),
        };

        self.expect(Token::OpenParen)?;
        let mut params = Vec::new();
        while let Token::Identifier(ident) = self.current_token.clone() {
            params.push(ident);
            self.next();
            self.eat(Token::Comma);
        }
        self.expect(Token::CloseParen)?;

        let operator = match operator {
            Some((op, kind)) => {
                let operands = match kind {
                    OperatorKind::Unary => 1,
                    OperatorKind::Binary { .. } => 2,
                };
                if params.len() != operands {
                    return self.error(format!(
                        "Invalid number of operands for operator '{}': expected {}, found {}",
                        op,
                        operands,
                        params.len()
                    ));
                }
                if let OperatorKind::Binary { precedence } = kind {
                    self.precedence.install(op, precedence);
                }
                Some(kind)
            }
            None => None,
        };

        Some(Prototype {
            name,
            params,
            operator,
        })
    }

    fn parse_operator_char(&mut self) -> Option<char> {
        match self.current_token {
            Token::Op(op) => {
                self.next();
                Some(op)
            }
            _ => self.expected("operator"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prototype(source: &str) -> (Option<Prototype>, usize) {
        let source: Source = source.into();
        let proto = Parser::new(&source).parse_prototype();
        (proto, source.errors.len())
    }

    #[test]
    fn test_prototype() {
        let (proto, errors) = prototype("foo(a b, c)");
        assert_eq!(errors, 0);
        let proto = proto.unwrap();
        assert_eq!(proto.name, "foo");
        assert_eq!(proto.params, vec!["a", "b", "c"]);
        assert_eq!(proto.operator, None);
    }

    #[test]
    fn test_operator_prototypes() {
        let (proto, _) = prototype("binary| 5 (lhs rhs)");
        let proto = proto.unwrap();
        assert_eq!(proto.name, "binary|");
        assert_eq!(proto.precedence(), Some(5));

        let (proto, _) = prototype("binary& (lhs rhs)");
        assert_eq!(
            proto.unwrap().precedence(),
            Some(DEFAULT_OPERATOR_PRECEDENCE)
        );

        let (proto, _) = prototype("unary!(v)");
        let proto = proto.unwrap();
        assert_eq!(proto.name, "unary!");
        assert!(proto.is_unary_op());
    }

    #[test]
    fn test_invalid_operator_prototypes() {
        assert_eq!(prototype("binary| 500 (a b)"), (None, 1));
        assert_eq!(prototype("binary| 1.5 (a b)"), (None, 1));
        assert_eq!(prototype("binary| (a)"), (None, 1));
        assert_eq!(prototype("unary- (a b)"), (None, 1));
    }

    #[test]
    fn test_binary_prototype_installs_precedence() {
        let source: Source = "def binary: 1 (x y) y; 1 : 2 + 3".into();
        let mut parser = Parser::new(&source);
        let items = parser.parse_program();
        assert!(source.has_no_errors());
        assert_eq!(parser.precedence().get(':'), Some(1));
        match &items[1] {
            Item::Function(func) => {
                assert!(matches!(func.body, Expr::Binary(BinaryExpr { op: ':', .. })))
            }
            item => panic!("unexpected {:?}", item),
        }
    }
}
