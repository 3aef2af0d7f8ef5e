//! JSON-lines RPC envelope
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! -> {"id": 1, "type": "log/search", "file_id": "system:current", "include": "ramses"}
//! <- {"id": 1, "success": true, "result": {...}}
//! <- {"id": 2, "success": false, "error": {"code": "unknown_file", "message": "..."}}
//! ```

use std::fmt;

use rf_logs::LogError;
use rf_query::QueryError;
use rf_traffic::TrafficError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A decoded request line
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
    /// Echoed back in the response
    #[serde(default)]
    pub id: Value,
    /// Operation name, e.g. `traffic/get_stats`
    #[serde(rename = "type")]
    pub kind: String,
    /// Remaining fields, decoded per operation
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Request {
    /// Decode the parameters into an operation-specific type
    pub fn params<T: serde::de::DeserializeOwned>(&self) -> Result<T, RpcError> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(|e| {
            RpcError::new(
                ErrorCode::InvalidRequest,
                format!("invalid parameters for {}: {}", self.kind, e),
            )
        })
    }
}

/// Machine-readable failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    InvalidFilter,
    FileUnavailable,
    UnknownFile,
    SourceNotConfigured,
    Internal,
}

impl ErrorCode {
    /// Wire name of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InvalidFilter => "invalid_filter",
            ErrorCode::FileUnavailable => "file_unavailable",
            ErrorCode::UnknownFile => "unknown_file",
            ErrorCode::SourceNotConfigured => "source_not_configured",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body of a failed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    /// Failure class
    pub code: ErrorCode,
    /// Human-readable detail
    pub message: String,
}

impl RpcError {
    /// Error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<LogError> for RpcError {
    fn from(err: LogError) -> Self {
        let code = match &err {
            LogError::FileUnavailable { .. } => ErrorCode::FileUnavailable,
            LogError::UnknownFile(_) | LogError::UnknownPath(_) => ErrorCode::UnknownFile,
            LogError::InvalidFilter(_) | LogError::InvalidPattern { .. } => {
                ErrorCode::InvalidFilter
            }
        };
        RpcError::new(code, err.to_string())
    }
}

impl From<TrafficError> for RpcError {
    fn from(err: TrafficError) -> Self {
        RpcError::new(ErrorCode::Internal, err.to_string())
    }
}

impl From<QueryError> for RpcError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidFilter(_) => {
                RpcError::new(ErrorCode::InvalidFilter, err.to_string())
            }
            QueryError::SourceNotConfigured(_) => {
                RpcError::new(ErrorCode::SourceNotConfigured, err.to_string())
            }
            QueryError::Log(log) => log.into(),
            QueryError::Traffic(traffic) => traffic.into(),
            QueryError::WorkerFailed(_) => RpcError::new(ErrorCode::Internal, err.to_string()),
        }
    }
}

/// A response line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Copied from the request
    pub id: Value,
    /// True when `result` is set
    pub success: bool,
    /// Operation output on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure details otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Successful response carrying `result`
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response carrying `error`
    pub fn err(id: Value, error: RpcError) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error),
        }
    }
}
