//! Unified message query
//!
//! Fetches the same filter from several sources, concatenates the results in
//! the caller's priority order, drops duplicates (first occurrence wins),
//! sorts by time and keeps the most recent `limit` records.
//!
//! Timestamps are only comparable within one source, so the merged order is
//! best effort across sources. The sort is stable: records with equal
//! timestamps stay in priority order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDateTime;
use rf_protocol::{MessageFilter, NormalizedMessage, Origin, Verb};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::QueryError;
use crate::provider::MessageProvider;

/// Default record limit for unified queries
pub const DEFAULT_QUERY_LIMIT: usize = 200;

/// Unified query parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifiedQueryRequest {
    /// Sources in priority order
    pub sources: Vec<Origin>,
    pub filter: MessageFilter,
    /// Drop records seen in an earlier source
    pub dedupe: bool,
    /// Maximum records returned
    pub limit: usize,
}

impl Default for UnifiedQueryRequest {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            filter: MessageFilter::default(),
            dedupe: true,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

/// Merged query result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedQueryResult {
    /// Records, oldest first
    pub messages: Vec<NormalizedMessage>,
    /// A source or the merge dropped records because of `limit`
    pub truncated: bool,
    pub duplicates_removed: usize,
    /// Records fetched per source, before de-duplication
    pub source_counts: BTreeMap<Origin, usize>,
    pub parse_warnings: Vec<String>,
}

/// Identity of a record across sources
///
/// The canonical frame text is the strongest signal; records built from
/// discrete event fields have none and fall back to the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    timestamp: NaiveDateTime,
    source_address: String,
    dest_address: String,
    verb: Verb,
    code: String,
    body: DedupeBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupeBody {
    Packet(String),
    Payload(String),
}

impl DedupeKey {
    pub fn of(msg: &NormalizedMessage) -> Self {
        let body = if msg.packet_raw.is_empty() {
            DedupeBody::Payload(msg.payload_raw.clone())
        } else {
            DedupeBody::Packet(msg.packet_raw.clone())
        };
        Self {
            timestamp: msg.timestamp,
            source_address: msg.source_address.clone(),
            dest_address: msg.dest_address.clone(),
            verb: msg.verb,
            code: msg.code.clone(),
            body,
        }
    }
}

/// Query front end over registered providers
#[derive(Clone, Default)]
pub struct UnifiedMessageQuery {
    providers: HashMap<Origin, Arc<dyn MessageProvider>>,
}

impl UnifiedMessageQuery {
    /// Query with no providers registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one for its origin
    pub fn with_provider(mut self, provider: Arc<dyn MessageProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Register a provider, replacing any previous one for its origin
    pub fn register(&mut self, provider: Arc<dyn MessageProvider>) {
        self.providers.insert(provider.origin(), provider);
    }

    /// Origins with a registered provider
    pub fn sources(&self) -> Vec<Origin> {
        let mut sources: Vec<Origin> = self.providers.keys().copied().collect();
        sources.sort();
        sources
    }

    /// Run a query
    ///
    /// Fails before fetching anything if a requested source has no provider.
    /// Any provider error aborts the whole query.
    pub async fn query(&self, req: &UnifiedQueryRequest) -> Result<UnifiedQueryResult, QueryError> {
        if req.sources.is_empty() {
            return Err(QueryError::InvalidFilter("at least one source is required".into()));
        }

        let mut sources: Vec<Origin> = Vec::with_capacity(req.sources.len());
        for origin in &req.sources {
            if !sources.contains(origin) {
                sources.push(*origin);
            }
        }
        let providers = sources
            .iter()
            .map(|origin| {
                self.providers
                    .get(origin)
                    .cloned()
                    .ok_or(QueryError::SourceNotConfigured(*origin))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut messages = Vec::new();
        let mut truncated = false;
        let mut source_counts = BTreeMap::new();
        let mut parse_warnings = Vec::new();

        for provider in providers {
            let batch = provider.fetch(&req.filter, req.limit).await?;
            source_counts.insert(provider.origin(), batch.messages.len());
            truncated |= batch.truncated;
            parse_warnings.extend(batch.parse_warnings);
            messages.extend(batch.messages);
        }

        let fetched = messages.len();
        if req.dedupe {
            let mut seen = HashSet::with_capacity(fetched);
            messages.retain(|msg| seen.insert(DedupeKey::of(msg)));
        }
        let duplicates_removed = fetched - messages.len();

        messages.sort_by_key(|msg| msg.timestamp);
        if messages.len() > req.limit {
            messages.drain(..messages.len() - req.limit);
            truncated = true;
        }

        debug!(
            "Unified query over {:?}: {} fetched, {} duplicates, {} returned",
            sources,
            fetched,
            duplicates_removed,
            messages.len()
        );

        Ok(UnifiedQueryResult {
            messages,
            truncated,
            duplicates_removed,
            source_counts,
            parse_warnings,
        })
    }
}

impl std::fmt::Debug for UnifiedMessageQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedMessageQuery")
            .field("sources", &self.sources())
            .finish()
    }
}
