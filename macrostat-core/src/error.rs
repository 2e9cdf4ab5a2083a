//! Typed error handling for macrostat.
//!
//! Library operations return [`MacrostatError`] so callers can tell a broken
//! source file apart from a failed `cargo expand` or an unreadable results file.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for macrostat operations.
#[derive(Error, Debug)]
pub enum MacrostatError {
    /// I/O error when reading/writing files
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Syntax error when parsing Rust source
    #[error("Parse error in {path}: {message}")]
    Parse {
        path: PathBuf,
        message: String,
        /// Line number (1-indexed) if available
        line: Option<usize>,
        /// Column number (1-indexed) if available
        column: Option<usize>,
    },

    /// Configuration file errors
    #[error("Config error at {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Workspace/crate structure errors
    #[error("Workspace error at {path}: {message}")]
    Workspace { path: PathBuf, message: String },

    /// `cargo expand` failed for a crate
    #[error("Expansion failed for {path}: {message}")]
    Expand { path: PathBuf, message: String },

    /// Results or state file could not be read or written
    #[error("Results error: {message}")]
    Results { message: String },

    /// A record violates a cross-field invariant
    #[error("Invariant violated: {message}")]
    Invariant { message: String },

    /// Invalid argument provided
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MacrostatError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a parse error without location.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Create a parse error with line/column info.
    pub fn parse_at(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }

    /// Create a parse error from a `syn` error, keeping its span location.
    pub fn from_syn(path: impl Into<PathBuf>, err: &syn::Error) -> Self {
        let start = err.span().start();
        // syn columns are 0-indexed
        Self::parse_at(path, err.to_string(), start.line, start.column + 1)
    }

    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn workspace(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Workspace {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn expand(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Expand {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn results(message: impl Into<String>) -> Self {
        Self::Results {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error (can continue analysis).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Expand { .. } | Self::Config { .. }
        )
    }

    /// Get the path associated with this error, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::Parse { path, .. } => Some(path),
            Self::Config { path, .. } => Some(path),
            Self::Workspace { path, .. } => Some(path),
            Self::Expand { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Convenience type alias for macrostat results.
pub type MacrostatResult<T> = Result<T, MacrostatError>;

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> MacrostatResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> MacrostatResult<T> {
        self.map_err(|e| MacrostatError::io(path, e))
    }
}
