//! Traffic aggregation
//!
//! [`TrafficAggregator`] turns the unbounded live event stream into bounded,
//! queryable state: one global aggregate, one aggregate per observed flow,
//! and two tiers of ring buffers (global and per-flow).
//!
//! All mutation happens through `&mut self`, so the owner decides how access
//! is serialized. The actor in [`crate::actor`] owns one instance and handles
//! every command in turn, which makes [`TrafficAggregator::reset_stats`]
//! indivisible with respect to reads.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDateTime;
use rf_protocol::{FlowKey, MessageFilter, NormalizedMessage, Verb};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::BridgeEvent;
use crate::ring_buffer::RingBuffer;

/// Aggregator sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Capacity of the global message buffer
    pub global_capacity: usize,
    /// Capacity of each per-flow message buffer
    pub flow_capacity: usize,
    /// Depth of the actor command channel
    pub channel_capacity: usize,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            global_capacity: 2000,
            flow_capacity: 200,
            channel_capacity: 1024,
        }
    }
}

/// Time window applied to flow statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsWindow {
    /// Everything since the last reset
    #[default]
    SinceReset,
    /// Flows seen within the last `minutes`
    LastMinutes {
        /// Window length
        minutes: u32,
    },
}

impl StatsWindow {
    fn admits(&self, last_seen: NaiveDateTime, now: NaiveDateTime) -> bool {
        match self {
            StatsWindow::SinceReset => true,
            StatsWindow::LastMinutes { minutes } => {
                last_seen >= now - chrono::Duration::minutes(i64::from(*minutes))
            }
        }
    }
}

/// Counters over every accepted message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GlobalAggregate {
    /// Messages accepted since reset
    pub total_count: u64,
    /// Count per opcode
    pub by_code: BTreeMap<String, u64>,
    /// Count per verb
    pub by_verb: BTreeMap<Verb, u64>,
    /// Latest message timestamp
    pub last_seen: Option<NaiveDateTime>,
}

impl GlobalAggregate {
    fn record(&mut self, msg: &NormalizedMessage) {
        self.total_count += 1;
        *self.by_code.entry(msg.code.clone()).or_insert(0) += 1;
        *self.by_verb.entry(msg.verb).or_insert(0) += 1;
        self.last_seen = self.last_seen.max(Some(msg.timestamp));
    }
}

#[derive(Debug, Clone)]
struct Buffered {
    seq: u64,
    message: Arc<NormalizedMessage>,
}

/// Counters and recent history for one flow
#[derive(Debug, Clone)]
pub struct FlowAggregate {
    /// Messages seen on this flow
    pub count_total: u64,
    /// Count per verb
    pub verbs_counter: BTreeMap<Verb, u64>,
    /// Count per opcode
    pub codes_counter: BTreeMap<String, u64>,
    /// First message timestamp
    pub first_seen: NaiveDateTime,
    /// Latest message timestamp
    pub last_seen: NaiveDateTime,
    buffer: RingBuffer<Buffered>,
}

impl FlowAggregate {
    fn new(first_seen: NaiveDateTime, capacity: usize) -> Self {
        Self {
            count_total: 0,
            verbs_counter: BTreeMap::new(),
            codes_counter: BTreeMap::new(),
            first_seen,
            last_seen: first_seen,
            buffer: RingBuffer::new(capacity),
        }
    }

    fn record(&mut self, entry: Buffered) {
        let msg = &entry.message;
        self.count_total += 1;
        *self.verbs_counter.entry(msg.verb).or_insert(0) += 1;
        *self.codes_counter.entry(msg.code.clone()).or_insert(0) += 1;
        self.first_seen = self.first_seen.min(msg.timestamp);
        self.last_seen = self.last_seen.max(msg.timestamp);
        self.buffer.push(entry);
    }

    /// Messages currently held in this flow's buffer
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn passes(&self, filter: &MessageFilter) -> bool {
        filter
            .verb
            .is_none_or(|verb| self.verbs_counter.contains_key(&verb))
            && (filter.code.is_none()
                || self.codes_counter.keys().any(|code| filter.matches_code(code)))
    }

    fn to_stats(&self, key: &FlowKey) -> FlowStats {
        FlowStats {
            source_address: key.source_address.clone(),
            dest_address: key.dest_address.clone(),
            count_total: self.count_total,
            verbs_counter: self.verbs_counter.clone(),
            codes_counter: self.codes_counter.clone(),
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            buffered: self.buffer.len(),
        }
    }
}

/// One flow row of a stats response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowStats {
    /// Sending device
    pub source_address: String,
    /// Receiving device
    pub dest_address: String,
    /// Messages seen on this flow
    pub count_total: u64,
    /// Count per verb
    pub verbs_counter: BTreeMap<Verb, u64>,
    /// Count per opcode
    pub codes_counter: BTreeMap<String, u64>,
    /// First message timestamp
    pub first_seen: NaiveDateTime,
    /// Latest message timestamp
    pub last_seen: NaiveDateTime,
    /// Messages held in the flow buffer
    pub buffered: usize,
}

/// Totals block of a stats response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficTotals {
    /// Messages accepted since reset
    pub total_count: u64,
    /// Count per opcode
    pub by_code: BTreeMap<String, u64>,
    /// Count per verb
    pub by_verb: BTreeMap<Verb, u64>,
    /// Latest message timestamp
    pub last_seen: Option<NaiveDateTime>,
    /// Events dropped because they could not be parsed
    pub parse_errors: u64,
    /// Events dropped because the aggregator was saturated
    pub dropped_events: u64,
    /// Flows observed since reset
    pub flow_count: usize,
    /// Messages in the global buffer
    pub buffered_messages: usize,
    /// Capacity of the global buffer
    pub global_capacity: usize,
}

/// Result of [`TrafficAggregator::get_stats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficStats {
    /// Global counters
    pub totals: TrafficTotals,
    /// Matching flows, busiest first
    pub flows: Vec<FlowStats>,
    /// Flows that matched before the limit was applied
    pub flows_matched: usize,
    /// True if `flows` was cut by the limit
    pub truncated: bool,
}

/// Result of [`TrafficAggregator::get_messages`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePage {
    /// Matching messages, newest first
    pub messages: Vec<NormalizedMessage>,
    /// True if more messages matched than were returned
    pub truncated: bool,
}

/// Bounded aggregation over the live event stream
#[derive(Debug)]
pub struct TrafficAggregator {
    config: TrafficConfig,
    global: GlobalAggregate,
    buffer: RingBuffer<Buffered>,
    flows: HashMap<FlowKey, FlowAggregate>,
    parse_errors: u64,
    dropped_events: Arc<AtomicU64>,
    next_seq: u64,
}

impl TrafficAggregator {
    /// Create an empty aggregator
    pub fn new(config: TrafficConfig) -> Self {
        Self {
            config,
            global: GlobalAggregate::default(),
            buffer: RingBuffer::new(config.global_capacity),
            flows: HashMap::new(),
            parse_errors: 0,
            dropped_events: Arc::new(AtomicU64::new(0)),
            next_seq: 0,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    /// Shared counter for events dropped before reaching the aggregator
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped_events)
    }

    /// Consume one live event
    ///
    /// A payload that fails to parse is counted and dropped; this never
    /// fails. Returns true if the event was recorded.
    pub fn on_event(&mut self, event: &BridgeEvent) -> bool {
        match event.to_message() {
            Ok(msg) => {
                self.ingest(msg);
                true
            }
            Err(e) => {
                self.parse_errors += 1;
                debug!("Dropping unparseable '{}' event: {}", event.event_type, e);
                false
            }
        }
    }

    /// Record an already-normalized message
    pub fn ingest(&mut self, msg: NormalizedMessage) {
        self.next_seq += 1;
        let entry = Buffered {
            seq: self.next_seq,
            message: Arc::new(msg),
        };

        self.global.record(&entry.message);
        self.buffer.push(entry.clone());

        let flow_capacity = self.config.flow_capacity;
        let timestamp = entry.message.timestamp;
        self.flows
            .entry(entry.message.flow_key())
            .or_insert_with(|| FlowAggregate::new(timestamp, flow_capacity))
            .record(entry);
    }

    /// Flow statistics using the current local time for windows
    pub fn get_stats(&self, filter: &MessageFilter, window: StatsWindow, limit: usize) -> TrafficStats {
        self.get_stats_at(filter, window, limit, chrono::Local::now().naive_local())
    }

    /// Flow statistics evaluated against an explicit `now`
    ///
    /// Address, verb and code criteria of `filter` are applied to flows; a
    /// flow passes the verb or code criterion if it has seen that verb or
    /// code. Flows are ranked by `count_total` descending, then by most
    /// recent `last_seen`.
    pub fn get_stats_at(
        &self,
        filter: &MessageFilter,
        window: StatsWindow,
        limit: usize,
        now: NaiveDateTime,
    ) -> TrafficStats {
        let mut matched: Vec<(&FlowKey, &FlowAggregate)> = self
            .flows
            .iter()
            .filter(|(key, flow)| {
                filter.matches_flow(&key.source_address, &key.dest_address)
                    && flow.passes(filter)
                    && window.admits(flow.last_seen, now)
            })
            .collect();

        matched.sort_by(|(ka, a), (kb, b)| {
            b.count_total
                .cmp(&a.count_total)
                .then(b.last_seen.cmp(&a.last_seen))
                .then(ka.cmp(kb))
        });

        let flows_matched = matched.len();
        let flows = matched
            .into_iter()
            .take(limit)
            .map(|(key, flow)| flow.to_stats(key))
            .collect();

        TrafficStats {
            totals: self.totals(),
            flows,
            flows_matched,
            truncated: flows_matched > limit,
        }
    }

    /// Global counters
    pub fn totals(&self) -> TrafficTotals {
        TrafficTotals {
            total_count: self.global.total_count,
            by_code: self.global.by_code.clone(),
            by_verb: self.global.by_verb.clone(),
            last_seen: self.global.last_seen,
            parse_errors: self.parse_errors,
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            flow_count: self.flows.len(),
            buffered_messages: self.buffer.len(),
            global_capacity: self.buffer.capacity(),
        }
    }

    /// Buffered messages matching `filter`, newest first
    ///
    /// Only the ring buffers are consulted. When the filter names both ends
    /// of a flow, that flow's buffer is merged in, so its history survives
    /// eviction from the busier global buffer.
    pub fn get_messages(&self, filter: &MessageFilter, limit: usize) -> MessagePage {
        let flow = match (&filter.source_address, &filter.dest_address) {
            (Some(src), Some(dst)) => self.flows.get(&FlowKey::new(src.clone(), dst.clone())),
            _ => None,
        };

        let candidates: Vec<&Buffered> = match flow {
            Some(flow) => {
                let mut seen = HashSet::new();
                let mut merged: Vec<&Buffered> = flow
                    .buffer
                    .iter()
                    .chain(self.buffer.iter())
                    .filter(|entry| seen.insert(entry.seq))
                    .collect();
                merged.sort_by(|a, b| b.seq.cmp(&a.seq));
                merged
            }
            None => self.buffer.iter().rev().collect(),
        };

        let mut matching = candidates
            .into_iter()
            .filter(|entry| filter.matches(&entry.message));
        let messages: Vec<NormalizedMessage> = matching
            .by_ref()
            .take(limit)
            .map(|entry| NormalizedMessage::clone(&entry.message))
            .collect();
        let truncated = matching.next().is_some();

        MessagePage {
            messages,
            truncated,
        }
    }

    /// Clear every counter, flow and buffer
    ///
    /// Performs no I/O and never yields, so an owner that serializes access
    /// observes either the old state or the empty state.
    pub fn reset_stats(&mut self) {
        self.global = GlobalAggregate::default();
        self.buffer.clear();
        self.flows.clear();
        self.parse_errors = 0;
        self.dropped_events.store(0, Ordering::Relaxed);
    }

    /// Aggregate for one flow
    pub fn flow(&self, key: &FlowKey) -> Option<&FlowAggregate> {
        self.flows.get(key)
    }

    /// Every observed flow, in no particular order
    pub fn flows(&self) -> impl Iterator<Item = (&FlowKey, &FlowAggregate)> {
        self.flows.iter()
    }

    /// Number of observed flows
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Events dropped as unparseable
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors
    }

    /// Messages in the global buffer, oldest first
    pub fn buffered_messages(&self) -> impl Iterator<Item = &NormalizedMessage> {
        self.buffer.iter().map(|entry| entry.message.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_protocol::{parse_timestamp, Frame, Origin};
    use serde_json::json;

    fn at(ts: &str) -> NaiveDateTime {
        parse_timestamp(ts).unwrap()
    }

    fn message(ts: &str, src: &str, dst: &str, verb: &str, code: &str) -> NormalizedMessage {
        let text = format!("{verb} --- {src} {dst} --:------ {code} 001 00");
        Frame::parse(&text).unwrap().into_message(at(ts), Origin::Live)
    }

    fn small() -> TrafficAggregator {
        TrafficAggregator::new(TrafficConfig {
            global_capacity: 4,
            flow_capacity: 2,
            channel_capacity: 8,
        })
    }

    #[test]
    fn test_flow_counters() {
        let mut agg = small();
        agg.ingest(message("2024-01-15T10:00:00", "18:000001", "01:000001", "RQ", "30C9"));
        agg.ingest(message("2024-01-15T10:00:01", "18:000001", "01:000001", "RQ", "30C9"));
        agg.ingest(message("2024-01-15T10:00:02", "18:000001", "01:000001", "W", "2309"));

        let flow = agg.flow(&FlowKey::new("18:000001", "01:000001")).unwrap();
        assert_eq!(flow.count_total, 3);
        assert_eq!(flow.codes_counter.get("30C9"), Some(&2));
        assert_eq!(flow.codes_counter.get("2309"), Some(&1));
        assert_eq!(flow.verbs_counter.get(&Verb::Request), Some(&2));
        assert_eq!(flow.last_seen, at("2024-01-15T10:00:02"));
        assert_eq!(flow.buffered(), 2);
    }

    #[test]
    fn test_on_event_counts_parse_errors() {
        let mut agg = small();
        let bad = BridgeEvent::new("rf_bridge_message", json!({"packet": "nonsense"}));
        let good = BridgeEvent::new(
            "rf_bridge_message",
            json!({"packet": "RQ --- 18:000001 01:000001 --:------ 30C9 001 00"}),
        );
        assert!(!agg.on_event(&bad));
        assert!(agg.on_event(&good));
        assert_eq!(agg.parse_errors(), 1);
        assert_eq!(agg.totals().total_count, 1);
    }

    #[test]
    fn test_global_buffer_is_bounded() {
        let mut agg = small();
        for i in 0..10 {
            agg.ingest(message(
                &format!("2024-01-15T10:00:{i:02}"),
                "18:000001",
                "01:000001",
                "I",
                "1F09",
            ));
        }
        let totals = agg.totals();
        assert_eq!(totals.total_count, 10);
        assert_eq!(totals.buffered_messages, 4);
        let kept: Vec<_> = agg.buffered_messages().map(|m| m.timestamp).collect();
        assert_eq!(kept.first(), Some(&at("2024-01-15T10:00:06")));
    }

    #[test]
    fn test_stats_ranking_and_limit() {
        let mut agg = small();
        agg.ingest(message("2024-01-15T10:00:00", "18:000001", "01:000001", "RQ", "30C9"));
        agg.ingest(message("2024-01-15T10:00:01", "18:000002", "01:000001", "RQ", "30C9"));
        agg.ingest(message("2024-01-15T10:00:02", "18:000002", "01:000001", "RQ", "30C9"));
        agg.ingest(message("2024-01-15T10:00:03", "18:000003", "01:000001", "RQ", "30C9"));

        let stats = agg.get_stats_at(
            &MessageFilter::default(),
            StatsWindow::SinceReset,
            2,
            at("2024-01-15T10:05:00"),
        );
        assert_eq!(stats.flows_matched, 3);
        assert!(stats.truncated);
        assert_eq!(stats.flows[0].source_address, "18:000002");
        // Tie on count broken by most recent last_seen
        assert_eq!(stats.flows[1].source_address, "18:000003");
    }

    #[test]
    fn test_stats_window_excludes_stale_flows() {
        let mut agg = small();
        agg.ingest(message("2024-01-15T09:00:00", "18:000001", "01:000001", "RQ", "30C9"));
        agg.ingest(message("2024-01-15T09:58:00", "18:000002", "01:000001", "RQ", "30C9"));

        let stats = agg.get_stats_at(
            &MessageFilter::default(),
            StatsWindow::LastMinutes { minutes: 10 },
            10,
            at("2024-01-15T10:00:00"),
        );
        assert_eq!(stats.flows.len(), 1);
        assert_eq!(stats.flows[0].source_address, "18:000002");
        // The stale flow still exists
        assert_eq!(agg.flow_count(), 2);
    }

    #[test]
    fn test_stats_filters_by_code_and_verb() {
        let mut agg = small();
        agg.ingest(message("2024-01-15T10:00:00", "18:000001", "01:000001", "RQ", "30C9"));
        agg.ingest(message("2024-01-15T10:00:01", "01:000001", "18:000001", "RP", "30C9"));
        agg.ingest(message("2024-01-15T10:00:02", "32:000001", "--:------", "I", "31DA"));

        let now = at("2024-01-15T10:01:00");
        let by_code = agg.get_stats_at(
            &MessageFilter::default().with_code("31da"),
            StatsWindow::SinceReset,
            10,
            now,
        );
        assert_eq!(by_code.flows.len(), 1);
        assert_eq!(by_code.flows[0].source_address, "32:000001");

        let by_verb = agg.get_stats_at(
            &MessageFilter::default().with_verb(Verb::Response),
            StatsWindow::SinceReset,
            10,
            now,
        );
        assert_eq!(by_verb.flows.len(), 1);
        assert_eq!(by_verb.flows[0].source_address, "01:000001");
    }

    #[test]
    fn test_get_messages_newest_first_with_limit() {
        let mut agg = small();
        for i in 0..3 {
            agg.ingest(message(
                &format!("2024-01-15T10:00:0{i}"),
                "18:000001",
                "01:000001",
                "RQ",
                "30C9",
            ));
        }
        let page = agg.get_messages(&MessageFilter::default(), 2);
        assert_eq!(page.messages.len(), 2);
        assert!(page.truncated);
        assert_eq!(page.messages[0].timestamp, at("2024-01-15T10:00:02"));
        assert_eq!(page.messages[1].timestamp, at("2024-01-15T10:00:01"));
    }

    #[test]
    fn test_get_messages_uses_flow_buffer_after_global_eviction() {
        let mut agg = small();
        agg.ingest(message("2024-01-15T10:00:00", "18:000001", "01:000001", "RQ", "30C9"));
        for i in 1..=4 {
            agg.ingest(message(
                &format!("2024-01-15T10:00:0{i}"),
                "32:000001",
                "--:------",
                "I",
                "31DA",
            ));
        }

        let filter = MessageFilter::default()
            .with_source("18:000001")
            .with_dest("01:000001");
        let page = agg.get_messages(&filter, 10);
        assert_eq!(page.messages.len(), 1);
        assert!(!page.truncated);

        // Without both addresses only the global tier is consulted
        let page = agg.get_messages(&MessageFilter::default().with_source("18:000001"), 10);
        assert!(page.messages.is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut agg = small();
        agg.ingest(message("2024-01-15T10:00:00", "18:000001", "01:000001", "RQ", "30C9"));
        agg.on_event(&BridgeEvent::new("rf_bridge_message", json!(null)));
        agg.dropped_counter().fetch_add(3, Ordering::Relaxed);

        agg.reset_stats();

        let stats = agg.get_stats(&MessageFilter::default(), StatsWindow::SinceReset, 10);
        assert_eq!(stats.totals.total_count, 0);
        assert_eq!(stats.totals.parse_errors, 0);
        assert_eq!(stats.totals.dropped_events, 0);
        assert!(stats.totals.by_code.is_empty());
        assert!(stats.flows.is_empty());
        assert!(agg.get_messages(&MessageFilter::default(), 10).messages.is_empty());
    }
}
