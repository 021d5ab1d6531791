// error.rs — Error types for the CCL engine.
//
// Parsing is the only fallible path through the engine. Lexical and syntax
// errors carry the 1-based line/column of the offending token so editors and
// linters can point at it. Evaluation never returns an error: it always
// produces a Decision (fail-closed).

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while turning CCL source into a [`Document`](crate::Document).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CclError {
    /// The lexer hit an unterminated string, a bad escape, or an illegal character.
    #[error("lexical error at {line}:{column}: {message}")]
    Lex {
        message: String,
        line: usize,
        column: usize,
    },

    /// The parser found a token it did not expect.
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    /// A document built outside the parser violates a structural invariant.
    #[error("invalid document: {reason}")]
    InvalidDocument { reason: String },
}

impl CclError {
    /// Source line of the error, if it has a position.
    pub fn line(&self) -> Option<usize> {
        match self {
            CclError::Lex { line, .. } | CclError::Syntax { line, .. } => Some(*line),
            CclError::InvalidDocument { .. } => None,
        }
    }

    /// Source column of the error, if it has a position.
    pub fn column(&self) -> Option<usize> {
        match self {
            CclError::Lex { column, .. } | CclError::Syntax { column, .. } => Some(*column),
            CclError::InvalidDocument { .. } => None,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        CclError::InvalidDocument {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid YAML for [`EngineConfig`](crate::EngineConfig).
    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The values parsed but are out of range.
    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}
