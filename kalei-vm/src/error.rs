//! Error types for code generation, linking and execution.

use kalei_passes::verify::VerifyError;
use thiserror::Error;

/// Failure while generating IR for one top-level item.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    #[error("Unknown variable name `{0}`")]
    UnknownVariable(String),
    #[error("Function not found: `{0}`")]
    UnknownFunction(String),
    #[error("Invalid number of arguments for `{callee}`: expected {expected}, found {found}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
    },
    #[error("destination of '=' must be a variable")]
    InvalidAssignmentTarget,
    #[error("Omitted Else are not supported yet")]
    MissingElse,
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl CodegenError {
    /// Whether this is an unknown variable or function name.
    pub fn is_unresolved_identifier(&self) -> bool {
        matches!(
            self,
            CodegenError::UnknownVariable(_) | CodegenError::UnknownFunction(_)
        )
    }
}

/// Failure while adding a compiled unit to the JIT.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("unresolved symbol `{name}`")]
    UnresolvedSymbol { name: String },
    #[error("`{name}` takes {expected} arguments but is called with {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("function `{name}` is too large to compile")]
    FunctionTooLarge { name: String },
}

/// Failure while executing bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("stack overflow: call depth exceeded {depth}")]
    StackOverflow { depth: usize },
    #[error("call to a function that is no longer loaded (`{name}`)")]
    DanglingFunction { name: String },
    #[error("invalid instruction in `{function}` at offset {offset}")]
    InvalidInstruction { function: String, offset: usize },
    #[error("`{name}` takes {expected} arguments but was given {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// A symbol left unresolved at link time is still missing when it is called.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Failure of one top-level item in a session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            CodegenError::UnknownVariable("x".to_string()).to_string(),
            "Unknown variable name `x`"
        );
        assert_eq!(
            CodegenError::MissingElse.to_string(),
            "Omitted Else are not supported yet"
        );
        let err: SessionError = CodegenError::InvalidAssignmentTarget.into();
        assert_eq!(err.to_string(), "destination of '=' must be a variable");
        assert!(CodegenError::UnknownFunction("f".to_string()).is_unresolved_identifier());
        assert!(!CodegenError::MissingElse.is_unresolved_identifier());
    }
}
