//! Integration tests for live traffic aggregation
//!
//! These tests drive the aggregator through its public surface:
//! - Flow counters built from live bridge events
//! - Ring buffer bounds under sustained traffic
//! - Reset semantics through the running service

use rf_protocol::{FlowKey, MessageFilter, Verb};
use rf_traffic::{
    BridgeEvent, EventBus, RingBuffer, StatsWindow, TrafficAggregator, TrafficConfig,
    TrafficService, DEFAULT_EVENT_NAME,
};
use serde_json::json;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// A live packet event with an explicit timestamp
    pub fn packet_event(dtm: &str, packet: &str) -> BridgeEvent {
        BridgeEvent::new(DEFAULT_EVENT_NAME, json!({ "dtm": dtm, "packet": packet }))
    }

    /// Remote (18:) asking a controller (01:) for an opcode
    pub fn request(dtm: &str, code: &str) -> BridgeEvent {
        packet_event(
            dtm,
            &format!("RQ --- 18:100001 01:200001 --:------ {code} 001 00"),
        )
    }

    pub fn small_config() -> TrafficConfig {
        TrafficConfig {
            global_capacity: 5,
            flow_capacity: 3,
            channel_capacity: 64,
        }
    }
}

// ============================================================================
// Flow Aggregation
// ============================================================================

mod flow_aggregation {
    use super::*;

    #[test]
    fn repeated_requests_accumulate_on_one_flow() {
        let mut agg = TrafficAggregator::new(TrafficConfig::default());
        agg.on_event(&helpers::request("2024-01-15T10:00:00", "30C9"));
        agg.on_event(&helpers::request("2024-01-15T10:00:05", "30C9"));
        agg.on_event(&helpers::request("2024-01-15T10:00:10", "1F09"));

        let flow = agg
            .flow(&FlowKey::new("18:100001", "01:200001"))
            .expect("flow created on first message");
        assert_eq!(flow.count_total, 3);
        assert_eq!(flow.codes_counter.get("30C9"), Some(&2));
        assert_eq!(flow.codes_counter.get("1F09"), Some(&1));
        assert_eq!(flow.verbs_counter.get(&Verb::Request), Some(&3));
        assert_eq!(agg.flow_count(), 1);
    }

    #[test]
    fn reply_is_a_separate_flow() {
        let mut agg = TrafficAggregator::new(TrafficConfig::default());
        agg.on_event(&helpers::request("2024-01-15T10:00:00", "30C9"));
        agg.on_event(&helpers::packet_event(
            "2024-01-15T10:00:00.1",
            "RP --- 01:200001 18:100001 --:------ 30C9 003 0007D0",
        ));

        assert_eq!(agg.flow_count(), 2);
        let stats = agg.get_stats(
            &MessageFilter::default().with_device("18:100001"),
            StatsWindow::SinceReset,
            10,
        );
        assert_eq!(stats.flows_matched, 2);
        assert_eq!(stats.totals.by_verb.get(&Verb::Response), Some(&1));
    }

    #[test]
    fn unparseable_events_do_not_create_flows() {
        let mut agg = TrafficAggregator::new(TrafficConfig::default());
        agg.on_event(&BridgeEvent::new(DEFAULT_EVENT_NAME, json!({"packet": ""})));
        agg.on_event(&BridgeEvent::new(DEFAULT_EVENT_NAME, json!(42)));

        let totals = agg.totals();
        assert_eq!(totals.parse_errors, 2);
        assert_eq!(totals.total_count, 0);
        assert_eq!(totals.flow_count, 0);
    }

    #[test]
    fn stats_serialize_with_stable_keys() {
        let mut agg = TrafficAggregator::new(TrafficConfig::default());
        agg.on_event(&helpers::request("2024-01-15T10:00:00", "30C9"));
        let stats = agg.get_stats(&MessageFilter::default(), StatsWindow::SinceReset, 10);

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["totals"]["total_count"], 1);
        assert_eq!(value["totals"]["by_verb"]["RQ"], 1);
        assert_eq!(value["flows"][0]["codes_counter"]["30C9"], 1);
        assert_eq!(value["flows"][0]["source_address"], "18:100001");
    }
}

// ============================================================================
// Buffer Bounds
// ============================================================================

mod buffer_bounds {
    use super::*;

    #[test]
    fn flow_buffer_keeps_most_recent() {
        let mut agg = TrafficAggregator::new(helpers::small_config());
        for i in 0..10 {
            agg.on_event(&helpers::request(&format!("2024-01-15T10:00:{i:02}"), "30C9"));
        }

        let filter = MessageFilter::default()
            .with_source("18:100001")
            .with_dest("01:200001");
        let page = agg.get_messages(&filter, 100);
        // Union of global (5) and flow (3) tiers, which overlap completely here
        assert_eq!(page.messages.len(), 5);
        assert!(!page.truncated);
        assert_eq!(page.messages[0].timestamp.to_string(), "2024-01-15 10:00:09");
        assert_eq!(
            agg.flow(&FlowKey::new("18:100001", "01:200001"))
                .unwrap()
                .buffered(),
            3
        );
    }

    #[test]
    fn get_messages_applies_time_bounds() {
        let mut agg = TrafficAggregator::new(TrafficConfig::default());
        for i in 0..6 {
            agg.on_event(&helpers::request(&format!("2024-01-15T10:0{i}:00"), "30C9"));
        }
        let since = rf_protocol::parse_timestamp("2024-01-15T10:02:00").unwrap();
        let until = rf_protocol::parse_timestamp("2024-01-15T10:04:00").unwrap();
        let page = agg.get_messages(
            &MessageFilter::default().with_since(since).with_until(until),
            10,
        );
        assert_eq!(page.messages.len(), 3);
    }
}

// ============================================================================
// Service Lifecycle
// ============================================================================

mod service_lifecycle {
    use super::*;

    #[tokio::test]
    async fn reset_through_handle_zeroes_everything() {
        let bus = EventBus::new();
        let service = TrafficService::start(&bus, DEFAULT_EVENT_NAME, TrafficConfig::default());
        let handle = service.handle();

        for i in 0..4 {
            bus.publish(&helpers::request(&format!("2024-01-15T10:00:0{i}"), "30C9"));
        }
        let before = handle
            .get_stats(MessageFilter::default(), StatsWindow::SinceReset, 10)
            .await
            .unwrap();
        assert_eq!(before.totals.total_count, 4);

        handle.reset_stats().await.unwrap();

        let after = handle
            .get_stats(MessageFilter::default(), StatsWindow::SinceReset, 10)
            .await
            .unwrap();
        assert_eq!(after.totals.total_count, 0);
        assert!(after.totals.by_code.is_empty());
        assert!(after.flows.is_empty());
        let page = handle.get_messages(MessageFilter::default(), 10).await.unwrap();
        assert!(page.messages.is_empty());

        service.stop(&bus).await.unwrap();
    }

    #[tokio::test]
    async fn events_after_stop_are_not_counted() {
        let bus = EventBus::new();
        let service = TrafficService::start(&bus, DEFAULT_EVENT_NAME, TrafficConfig::default());
        bus.publish(&helpers::request("2024-01-15T10:00:00", "30C9"));
        let aggregator = service.stop(&bus).await.unwrap();

        assert_eq!(bus.publish(&helpers::request("2024-01-15T10:00:01", "30C9")), 0);
        assert_eq!(aggregator.totals().total_count, 1);
    }

    #[tokio::test]
    async fn other_event_names_are_ignored() {
        let bus = EventBus::new();
        let service = TrafficService::start(&bus, DEFAULT_EVENT_NAME, TrafficConfig::default());
        bus.publish(&BridgeEvent::new(
            "state_changed",
            json!({"packet": "RQ --- 18:100001 01:200001 --:------ 30C9 001 00"}),
        ));
        let aggregator = service.stop(&bus).await.unwrap();
        assert_eq!(aggregator.totals().total_count, 0);
        assert_eq!(aggregator.parse_errors(), 0);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ring_buffer_holds_last_min_n_capacity(
            capacity in 1usize..64,
            items in prop::collection::vec(any::<u32>(), 0..200),
        ) {
            let mut buf = RingBuffer::new(capacity);
            for item in &items {
                buf.push(*item);
                prop_assert!(buf.len() <= capacity);
            }
            let keep = items.len().min(capacity);
            let expected: Vec<u32> = items[items.len() - keep..].to_vec();
            let actual: Vec<u32> = buf.iter().copied().collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn flow_counts_sum_to_total(codes in prop::collection::vec(0usize..4, 1..50)) {
            const CODES: [&str; 4] = ["30C9", "1F09", "2309", "31DA"];
            let mut agg = TrafficAggregator::new(helpers::small_config());
            for (i, code) in codes.iter().enumerate() {
                let dtm = format!("2024-01-15T10:{:02}:{:02}", i / 60, i % 60);
                agg.on_event(&helpers::request(&dtm, CODES[*code]));
            }

            let totals = agg.totals();
            prop_assert_eq!(totals.total_count, codes.len() as u64);
            prop_assert_eq!(totals.by_code.values().sum::<u64>(), codes.len() as u64);
            prop_assert!(totals.buffered_messages <= 5);
        }
    }
}
