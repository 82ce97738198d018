//! Unified error handling.
//!
//! A `thiserror`-based model with:
//!   * Typed variants for the failure domains of a log analysis run
//!   * A categorization layer (`ErrorCategory`) for the run summary
//!   * Helper constructors
//!   * `From` conversions for common lower-level errors
//!
//! Recoverable problems (a malformed log line, a missing field, a bad
//! blocklist pattern) are counted by the parsers and the matcher and never
//! surface as an `AnalyzerError`. The variants here are fatal for the unit of
//! work that raised them: a single source file, the blocklist file, or the
//! whole run when no source could be used.
//!
//! Usage:
//!   use dnslog_analyzer::errors::{Result, AnalyzerError};
//!
//!   fn do_something() -> Result<()> {
//!       Err(AnalyzerError::Configuration { message: "invalid format".into() })
//!   }

use std::io;

use thiserror::Error;

/// High-level classification for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Parse,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Primary application error type.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    // ------------------------ Input / Validation ----------------------------
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("{path} is {size} bytes, above the configured limit of {limit} bytes")]
    InputTooLarge { path: String, size: u64, limit: u64 },

    #[error("No usable log source: {reason}")]
    NoUsableSource { reason: String },

    // ---------------------------- Parsing -----------------------------------
    #[error("Invalid blocklist pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{source_name} export has no {column} column (header: {header})")]
    MissingColumn {
        source_name: String,
        column: String,
        header: String,
    },

    #[error("CSV error in {source_name} export: {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to serialize analysis output: {reason}")]
    Serialization { reason: String },

    // ----------------------------- I/O / FS ---------------------------------
    #[error("I/O error during {operation} on {path}: {source}")]
    Io {
        path: String,
        operation: String,
        #[source]
        source: io::Error,
    },

    // ---------------------------- Internal ----------------------------------
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl AnalyzerError {
    /// Categorize the error for the run summary.
    pub fn category(&self) -> ErrorCategory {
        use AnalyzerError::*;
        match self {
            Configuration { .. } | InputTooLarge { .. } | NoUsableSource { .. } => {
                ErrorCategory::Input
            }

            InvalidPattern { .. }
            | MissingColumn { .. }
            | Csv { .. }
            | Serialization { .. } => ErrorCategory::Parse,

            Io { .. } | Internal { .. } => ErrorCategory::Internal,
        }
    }

    // ---------------------------- Constructors -----------------------------

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn no_usable_source(reason: impl Into<String>) -> Self {
        Self::NoUsableSource {
            reason: reason.into(),
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_column(
        source_name: impl Into<String>,
        column: impl Into<String>,
        header: impl Into<String>,
    ) -> Self {
        Self::MissingColumn {
            source_name: source_name.into(),
            column: column.into(),
            header: header.into(),
        }
    }

    pub fn csv(source_name: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            source_name: source_name.into(),
            source,
        }
    }

    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<String>, operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Public result alias.
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Map standard IO errors into `Io` variant (generic context).
impl From<io::Error> for AnalyzerError {
    fn from(e: io::Error) -> Self {
        AnalyzerError::Io {
            path: "<unknown>".into(),
            operation: "unspecified".into(),
            source: e,
        }
    }
}

impl From<tokio::task::JoinError> for AnalyzerError {
    fn from(e: tokio::task::JoinError) -> Self {
        AnalyzerError::internal_with("source parsing task failed", e)
    }
}

/// Extension trait for enriching IO results with path + operation context.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<String>, operation: impl Into<String>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, io::Error> {
    fn with_path(self, path: impl Into<String>, operation: impl Into<String>) -> Result<T> {
        self.map_err(|e| AnalyzerError::io(path.into(), operation.into(), e))
    }
}
