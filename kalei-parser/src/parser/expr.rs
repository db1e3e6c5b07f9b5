use super::*;

impl<'a> Parser<'a> {
    /* Expressions */
    /// Parses any expression.
    /// This is equivalent to calling [`Self::parse_expr_bp`] with `min_bp = 0`.
    pub fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_expr_bp(0) // 0 to accept any expression
    }

    /// Parses an expression with the specified `min_bp`.
    /// To parse any expression use, [`Self::parse_expr`].
    fn parse_expr_bp(&mut self, min_bp: u32) -> Option<Expr> {
        let mut lhs = self.parse_unary_expr()?;

        loop {
            let op = match self.current_token {
                Token::Op(op) => op,
                _ => break,
            };
            let (l_bp, r_bp) = match self.precedence.binding_power(op) {
                Some(bp) => bp,
                None => break, // not a known binop, stop parsing
            };
            if l_bp < min_bp {
                break; // less than the min_bp, stop parsing
            }

            // self.current_token is a valid binop
            self.next();

            let rhs = self.parse_expr_bp(r_bp)?;

            lhs = Expr::Binary(BinaryExpr {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }

        Some(lhs)
    }

    /// Parses a prefix operator application or a primary expression.
    /// Any operator character in prefix position is a (possibly user defined) unary operator.
    fn parse_unary_expr(&mut self) -> Option<Expr> {
        match self.current_token {
            Token::Op(op) => {
                self.next();
                let operand = self.parse_unary_expr()?;
                Some(Expr::Unary(UnaryExpr {
                    op,
                    operand: Box::new(operand),
                }))
            }
            _ => self.parse_primary_expr(),
        }
    }

    /// Parses a primary (atom) expression.
    fn parse_primary_expr(&mut self) -> Option<Expr> {
        match self.current_token {
            Token::Number(val) => {
                self.next();
                Some(Expr::Number(val))
            }
            Token::Identifier(_) => self.parse_identifier_or_call_expr(),
            Token::OpenParen => self.parse_paren_expr(),
            Token::If => self.parse_if_expr(),
            Token::For => self.parse_for_expr(),
            Token::Var => self.parse_var_expr(),
            _ => self.unexpected(),
        }
    }

    fn parse_paren_expr(&mut self) -> Option<Expr> {
        self.expect(Token::OpenParen)?;
        let expr = self.parse_expr()?;
        self.expect(Token::CloseParen)?;
        Some(expr)
    }

    /* Expressions.Identifier */
    /// Parses an identifier or a call expression.
    fn parse_identifier_or_call_expr(&mut self) -> Option<Expr> {
        let ident = self.parse_ident()?;

        if self.eat(Token::OpenParen) {
            // parse call expression
            let mut args = Vec::new();

            if !self.eat(Token::CloseParen) {
                loop {
                    args.push(self.parse_expr()?);

                    if self.eat(Token::CloseParen) {
                        break;
                    } else if !self.eat(Token::Comma) {
                        return self.expected("',' or ')' in argument list");
                    }
                }
            }

            Some(Expr::Call(CallExpr {
                callee: ident,
                args,
            }))
        } else {
            // parse identifier expression
            Some(Expr::Variable(ident))
        }
    }

    /* Expressions.ControlFlow */
    /// Parses `if cond then expr (else expr)?`.
    /// A missing else branch is accepted here and rejected by code generation.
    fn parse_if_expr(&mut self) -> Option<Expr> {
        self.expect(Token::If)?;
        let cond = self.parse_expr()?;
        self.expect(Token::Then)?;
        let then = self.parse_expr()?;
        let otherwise = if self.eat(Token::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        Some(Expr::If(IfExpr {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise,
        }))
    }

    /// Parses `for ident = start, end (, step)? in body`. The step defaults to `1.0`.
    fn parse_for_expr(&mut self) -> Option<Expr> {
        self.expect(Token::For)?;
        let var = self.parse_ident()?;
        self.expect_op('=')?;
        let start = self.parse_expr()?;
        self.expect(Token::Comma)?;
        let end = self.parse_expr()?;
        let step = if self.eat(Token::Comma) {
            self.parse_expr()?
        } else {
            Expr::Number(1.0)
        };
        self.expect(Token::In)?;
        let body = self.parse_expr()?;

        Some(Expr::For(ForExpr {
            var,
            start: Box::new(start),
            end: Box::new(end),
            step: Box::new(step),
            body: Box::new(body),
        }))
    }

    /// Parses `var a (= init)?, b (= init)? in body`.
    fn parse_var_expr(&mut self) -> Option<Expr> {
        self.expect(Token::Var)?;

        let mut vars = Vec::new();
        loop {
            let name = self.parse_ident()?;
            let init = if self.eat_op('=') {
                Some(self.parse_expr()?)
            } else {
                None
            };
            vars.push((name, init));

            if !self.eat(Token::Comma) {
                break;
            }
        }

        self.expect(Token::In)?;
        let body = self.parse_expr()?;

        Some(Expr::Declaration(DeclarationExpr {
            vars,
            body: Box::new(body),
        }))
    }

    fn parse_ident(&mut self) -> Option<String> {
        match self.current_token.clone() {
            Token::Identifier(ident) => {
                self.next();
                Some(ident)
            }
            _ => self.expected("identifier"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_debug_snapshot;

    fn expr(source: &str) -> Expr {
        let source: Source = source.into();
        let ast = Parser::new(&source).parse_expr();
        assert!(source.has_no_errors(), "{}", source.report());
        ast.unwrap()
    }

    #[test]
    fn test_literal() {
        assert_eq!(expr("1"), Expr::Number(1.0));
        assert_eq!(expr("2.5"), Expr::Number(2.5));
        assert_eq!(expr("(((4)))"), Expr::Number(4.0));
    }

    #[test]
    fn test_binary_expr() {
        assert_debug_snapshot!(expr("1 + 2 * 3"), @r###"
        Binary(
            BinaryExpr {
                op: '+',
                lhs: Number(
                    1.0,
                ),
                rhs: Binary(
                    BinaryExpr {
                        op: '*',
                        lhs: Number(
                            2.0,
                        ),
                        rhs: Number(
                            3.0,
                        ),
                    },
                ),
            },
        )
        "###);
    }

    #[test]
    fn test_binary_associativity() {
        // should be (8 - 4) - 2
        match expr("8 - 4 - 2") {
            Expr::Binary(BinaryExpr { op: '-', lhs, rhs }) => {
                assert!(matches!(*lhs, Expr::Binary(_)));
                assert_eq!(*rhs, Expr::Number(2.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_assignment_associativity() {
        // should be a = (b = c)
        assert_debug_snapshot!(expr("a = b = c"), @r###"
        Binary(
            BinaryExpr {
                op: '=',
                lhs: Variable(
                    "a",
                ),
                rhs: Binary(
                    BinaryExpr {
                        op: '=',
                        lhs: Variable(
                            "b",
                        ),
                        rhs: Variable(
                            "c",
                        ),
                    },
                ),
            },
        )
        "###);
    }

    #[test]
    fn test_unary_expr() {
        assert_eq!(
            expr("!-x"),
            Expr::Unary(UnaryExpr {
                op: '!',
                operand: Box::new(Expr::Unary(UnaryExpr {
                    op: '-',
                    operand: Box::new(Expr::Variable("x".to_string())),
                })),
            })
        );
    }

    #[test]
    fn test_fn_call() {
        assert_eq!(
            expr("foo()"),
            Expr::Call(CallExpr {
                callee: "foo".to_string(),
                args: vec![],
            })
        );
        match expr("foo(1, bar, baz())") {
            Expr::Call(call) => {
                assert_eq!(call.callee, "foo");
                assert_eq!(call.args.len(), 3);
                assert!(matches!(call.args[2], Expr::Call(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_if_expr() {
        match expr("if x < 3 then 1 else 2") {
            Expr::If(if_expr) => assert!(if_expr.otherwise.is_some()),
            other => panic!("unexpected {:?}", other),
        }
        match expr("if x then 1") {
            Expr::If(if_expr) => assert!(if_expr.otherwise.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_for_expr_default_step() {
        assert_debug_snapshot!(expr("for i = 1, i < 4 in i"), @r###"
        For(
            ForExpr {
                var: "i",
                start: Number(
                    1.0,
                ),
                end: Binary(
                    BinaryExpr {
                        op: '<',
                        lhs: Variable(
                            "i",
                        ),
                        rhs: Number(
                            4.0,
                        ),
                    },
                ),
                step: Number(
                    1.0,
                ),
                body: Variable(
                    "i",
                ),
            },
        )
        "###);
    }

    #[test]
    fn test_var_expr() {
        match expr("var x = 1, y in x + y") {
            Expr::Declaration(decl) => {
                assert_eq!(
                    decl.vars,
                    vec![
                        ("x".to_string(), Some(Expr::Number(1.0))),
                        ("y".to_string(), None)
                    ]
                );
                assert!(matches!(*decl.body, Expr::Binary(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_in() {
        let source: Source = "var x = 1 x".into();
        assert_eq!(Parser::new(&source).parse_expr(), None);
        assert_eq!(source.errors.len(), 1);
    }
}
