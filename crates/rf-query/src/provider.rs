//! Message sources behind the unified query
//!
//! Each [`MessageProvider`] answers for exactly one [`Origin`]. The live
//! provider talks to the traffic actor; the file providers run their blocking
//! scans on tokio's blocking pool so the runtime threads stay free.

use std::sync::Arc;

use async_trait::async_trait;
use rf_logs::{PacketLogProvider, ProviderResult, SystemLogProvider};
use rf_protocol::{MessageFilter, NormalizedMessage, Origin};
use rf_traffic::TrafficHandle;

use crate::error::QueryError;

/// Messages returned by one provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBatch {
    /// Matching messages, oldest first
    pub messages: Vec<NormalizedMessage>,
    /// The provider had more matches than `limit`
    pub truncated: bool,
    /// Lines or events the provider skipped
    pub parse_warnings: Vec<String>,
}

impl From<ProviderResult> for SourceBatch {
    fn from(result: ProviderResult) -> Self {
        Self {
            messages: result.messages,
            truncated: result.truncated,
            parse_warnings: result.parse_warnings,
        }
    }
}

/// A single source of normalized messages
#[async_trait]
pub trait MessageProvider: Send + Sync {
    /// Origin tag carried by every message this provider returns
    fn origin(&self) -> Origin;

    /// Up to `limit` of the most recent messages matching `filter`
    async fn fetch(&self, filter: &MessageFilter, limit: usize) -> Result<SourceBatch, QueryError>;
}

/// Messages still held in the live traffic buffers
#[derive(Debug, Clone)]
pub struct LiveProvider {
    handle: TrafficHandle,
}

impl LiveProvider {
    pub fn new(handle: TrafficHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl MessageProvider for LiveProvider {
    fn origin(&self) -> Origin {
        Origin::Live
    }

    async fn fetch(&self, filter: &MessageFilter, limit: usize) -> Result<SourceBatch, QueryError> {
        let page = self.handle.get_messages(filter.clone(), limit).await?;
        let mut messages = page.messages;
        // Buffers answer newest first
        messages.reverse();
        Ok(SourceBatch {
            messages,
            truncated: page.truncated,
            parse_warnings: Vec::new(),
        })
    }
}

/// Packet log reader on the blocking pool
#[derive(Debug, Clone)]
pub struct PacketLogSource {
    provider: Arc<PacketLogProvider>,
    include_rotated: bool,
}

impl PacketLogSource {
    pub fn new(provider: PacketLogProvider, include_rotated: bool) -> Self {
        Self {
            provider: Arc::new(provider),
            include_rotated,
        }
    }
}

#[async_trait]
impl MessageProvider for PacketLogSource {
    fn origin(&self) -> Origin {
        Origin::PacketLog
    }

    async fn fetch(&self, filter: &MessageFilter, limit: usize) -> Result<SourceBatch, QueryError> {
        let provider = Arc::clone(&self.provider);
        let filter = filter.clone();
        let include_rotated = self.include_rotated;
        let result = tokio::task::spawn_blocking(move || {
            provider.fetch(&filter, limit, include_rotated)
        })
        .await
        .map_err(|e| QueryError::WorkerFailed(e.to_string()))??;
        Ok(result.into())
    }
}

/// System log reader on the blocking pool
#[derive(Debug, Clone)]
pub struct SystemLogSource {
    provider: Arc<SystemLogProvider>,
    include_rotated: bool,
}

impl SystemLogSource {
    pub fn new(provider: SystemLogProvider, include_rotated: bool) -> Self {
        Self {
            provider: Arc::new(provider),
            include_rotated,
        }
    }
}

#[async_trait]
impl MessageProvider for SystemLogSource {
    fn origin(&self) -> Origin {
        Origin::SystemLog
    }

    async fn fetch(&self, filter: &MessageFilter, limit: usize) -> Result<SourceBatch, QueryError> {
        let provider = Arc::clone(&self.provider);
        let filter = filter.clone();
        let include_rotated = self.include_rotated;
        let result = tokio::task::spawn_blocking(move || {
            provider.fetch(&filter, limit, include_rotated)
        })
        .await
        .map_err(|e| QueryError::WorkerFailed(e.to_string()))??;
        Ok(result.into())
    }
}
