//! Source code representation and syntax error management.

use std::{cell::RefCell, fmt, ops::Range};

/// Represents source code.
pub struct Source<'a> {
    /// Original source code.
    pub content: &'a str,
    /// Accumulated errors.
    pub errors: ErrorReporter,
}

impl<'a> Source<'a> {
    /// Create a new `Source` with the specified `content`.
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            errors: ErrorReporter::new(),
        }
    }

    /// Returns `true` if `Source` has no accumulated errors. Returns `false` otherwise.
    pub fn has_no_errors(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the 1-based `(line, column)` of the byte `offset`.
    /// Offsets past the end of the content are clamped to the end.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.content.len());
        let before = &self.content[..offset];
        let line = before.matches('\n').count() + 1;
        let col = match before.rfind('\n') {
            Some(newline) => offset - newline,
            None => offset + 1,
        };
        (line, col)
    }

    /// Renders all accumulated errors with line and column information.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for error in self.errors.errors.borrow().iter() {
            let (line, col) = self.line_col(error.span.start);
            out.push_str(&format!(
                "ERROR: {message} at {line}:{col}\n",
                message = error.message,
                line = line,
                col = col
            ));
        }
        out
    }
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(content: &'a str) -> Self {
        Source::new(content)
    }
}

/// Represents a syntax error (compile time error).
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub span: Range<usize>,
}

impl SyntaxError {
    /// Create a new syntax error with the specified `message` and `span`.
    pub fn new(message: impl ToString, span: Range<usize>) -> Self {
        Self {
            message: message.to_string(),
            span,
        }
    }
}

/// Manages all the errors.
pub struct ErrorReporter {
    errors: RefCell<Vec<SyntaxError>>,
}

impl ErrorReporter {
    /// Create an empty `ErrorReporter`.
    pub fn new() -> Self {
        Self {
            errors: RefCell::new(Vec::new()),
        }
    }

    /// Adds an error to the `ErrorReporter`.
    /// This method uses the interior mutability pattern so that the parser only needs a shared reference.
    pub fn add_error(&self, error: SyntaxError) {
        // This should be the only place where self.errors is borrowed mutably.
        self.errors.borrow_mut().push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.borrow().len()
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self.errors.borrow();
        for error in errors.iter() {
            writeln!(
                f,
                "ERROR: {message} at position {position}",
                message = error.message,
                position = error.span.start
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let source = Source::new("def f(x)\n  x + 1\n");
        assert_eq!(source.line_col(0), (1, 1));
        assert_eq!(source.line_col(4), (1, 5));
        assert_eq!(source.line_col(11), (2, 3));
        assert_eq!(source.line_col(1000), (3, 1));
    }

    #[test]
    fn test_report() {
        let source: Source = "1 +\n)".into();
        assert!(source.has_no_errors());
        source
            .errors
            .add_error(SyntaxError::new("Unexpected token", 4..5));
        assert!(!source.has_no_errors());
        assert_eq!(source.errors.len(), 1);
        assert_eq!(source.report(), "ERROR: Unexpected token at 2:1\n");
        assert_eq!(
            source.errors.to_string(),
            "ERROR: Unexpected token at position 4\n"
        );
    }
}
