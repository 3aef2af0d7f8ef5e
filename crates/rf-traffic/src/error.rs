//! Error types for the traffic service

use thiserror::Error;

/// Errors returned by [`crate::TrafficHandle`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrafficError {
    /// The aggregator actor has shut down
    #[error("traffic service is not running")]
    ServiceStopped,
}
