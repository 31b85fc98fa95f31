use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("[line {line}] {message}")]
    LexError { line: usize, message: String },
    #[error("[line {line}] {message}")]
    ParseError { line: usize, message: String },
    #[error("[line {line}] {message}")]
    ResolutionError { line: usize, message: String },
    #[error("non-ASCII character detected: {character:?}")]
    AsciiViolation { character: char },
    #[error("invalid entry point '{name}': {reason}")]
    InvalidEntryPoint { name: String, reason: String },
    #[error("code generation failed: {0}")]
    Codegen(String),
    #[error("execution failed: {0}")]
    Execution(String),
}

impl CoreError {
    pub fn lex(line: usize, message: impl Into<String>) -> Self {
        CoreError::LexError {
            line,
            message: message.into(),
        }
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        CoreError::ParseError {
            line,
            message: message.into(),
        }
    }

    pub fn resolution(line: usize, message: impl Into<String>) -> Self {
        CoreError::ResolutionError {
            line,
            message: message.into(),
        }
    }

    /// Source line the error points at, if it came from the front-end.
    pub fn line(&self) -> Option<usize> {
        match self {
            CoreError::LexError { line, .. }
            | CoreError::ParseError { line, .. }
            | CoreError::ResolutionError { line, .. } => Some(*line),
            _ => None,
        }
    }
}
