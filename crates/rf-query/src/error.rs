//! Error types for unified queries

use rf_logs::LogError;
use rf_protocol::Origin;
use rf_traffic::TrafficError;
use thiserror::Error;

/// Errors that abort a unified query
#[derive(Debug, Error)]
pub enum QueryError {
    /// Request parameters are inconsistent
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// No provider is registered for a requested source
    #[error("source not configured: {0}")]
    SourceNotConfigured(Origin),

    /// A file-backed provider failed
    #[error(transparent)]
    Log(#[from] LogError),

    /// The live provider failed
    #[error(transparent)]
    Traffic(#[from] TrafficError),

    /// A blocking worker panicked or was cancelled
    #[error("provider worker failed: {0}")]
    WorkerFailed(String),
}
