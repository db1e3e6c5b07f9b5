use logos::Logos;

#[derive(Debug, Logos, Clone, PartialEq)]
pub enum Token {
    // literals
    #[regex(r"[0-9.]+", |lex| lex.slice().parse())]
    Number(f64),

    // identifiers
    #[regex("[a-zA-Z][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    /// Any single operator character. Whether it is a binary operator depends on the
    /// [`PrecedenceTable`](crate::precedence::PrecedenceTable) at parse time.
    #[regex(r"[!$%&*+\-/:<=>?@^|~]", |lex| lex.slice().chars().next())]
    Op(char),

    // punctuation
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,

    // keywords
    #[token("def")]
    Def,
    #[token("extern")]
    Extern,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("var")]
    Var,
    #[token("binary")]
    Binary,
    #[token("unary")]
    Unary,

    // misc
    #[regex(r"[ \t\n\r\f]+", logos::skip)]
    #[regex(r"#[^\n]*", logos::skip)] // single line comments
    #[error]
    Error,

    /// Only generated in parse phase when `lexer.next()` returns `None`.
    Eof,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        Token::lexer(source).collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            tokens("def define extern var in"),
            vec![
                Token::Def,
                Token::Identifier("define".to_string()),
                Token::Extern,
                Token::Var,
                Token::In,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("binary| 5 (a b)"),
            vec![
                Token::Binary,
                Token::Op('|'),
                Token::Number(5.0),
                Token::OpenParen,
                Token::Identifier("a".to_string()),
                Token::Identifier("b".to_string()),
                Token::CloseParen,
            ]
        );
        assert_eq!(tokens("x=y"), tokens("x = y"));
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            tokens("1.5 # trailing comment\n2"),
            vec![Token::Number(1.5), Token::Number(2.0)]
        );
    }

    #[test]
    fn test_invalid_number() {
        assert_eq!(tokens("1.2.3"), vec![Token::Error]);
    }
}
