//! Error types for log access

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while locating, reading or searching logs
#[derive(Debug, Error)]
pub enum LogError {
    /// The file could not be opened or read
    #[error("log file {file_id} unavailable at {}: {source}", path.display())]
    FileUnavailable {
        /// File id that was requested
        file_id: String,
        /// Path it resolved to
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The file id is malformed or names no known file
    #[error("unknown log file: {0}")]
    UnknownFile(String),

    /// No log path is configured under this id
    #[error("unknown log path id: {0}")]
    UnknownPath(String),

    /// Request parameters are inconsistent or out of range
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A configured pattern does not compile
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern text
        pattern: String,
        /// Compiler error
        source: regex::Error,
    },
}

impl LogError {
    pub(crate) fn unavailable(file_id: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::FileUnavailable {
            file_id: file_id.to_string(),
            path: path.into(),
            source,
        }
    }
}
