//! Unified message query across live traffic and log files
//!
//! The bridge leaves traces of the same radio traffic in three places: the
//! live event stream, the packet log and the system log. This crate puts a
//! [`MessageProvider`] in front of each and merges their answers with
//! [`UnifiedMessageQuery`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rf_protocol::Origin;
//! use rf_query::{LiveProvider, UnifiedMessageQuery, UnifiedQueryRequest};
//!
//! let query = UnifiedMessageQuery::new()
//!     .with_provider(Arc::new(LiveProvider::new(traffic.handle())));
//!
//! let result = query
//!     .query(&UnifiedQueryRequest {
//!         sources: vec![Origin::Live],
//!         ..Default::default()
//!     })
//!     .await?;
//! ```

pub mod error;
pub mod provider;
pub mod query;

pub use error::QueryError;
pub use provider::{LiveProvider, MessageProvider, PacketLogSource, SourceBatch, SystemLogSource};
pub use query::{
    DedupeKey, UnifiedMessageQuery, UnifiedQueryRequest, UnifiedQueryResult, DEFAULT_QUERY_LIMIT,
};
