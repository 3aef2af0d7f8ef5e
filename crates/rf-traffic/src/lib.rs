//! Live traffic aggregation
//!
//! This crate turns the bridge's live event stream into bounded, queryable
//! state.
//!
//! # Architecture
//!
//! - [`EventBus`] routes named events to subscribers and hands back a
//!   [`SubscriptionToken`] that is consumed on unsubscribe
//! - [`TrafficService`] subscribes to the bus and owns a [`TrafficAggregator`]
//!   inside a single actor task
//! - [`TrafficHandle`] is the cloneable query side: stats, buffered
//!   messages and reset, each a request/response round trip to the actor
//!
//! Memory is bounded by [`RingBuffer`]s: one global buffer plus one smaller
//! buffer per flow. Counters keep growing until reset.
//!
//! # Example
//!
//! ```rust,no_run
//! use rf_protocol::MessageFilter;
//! use rf_traffic::{EventBus, StatsWindow, TrafficConfig, TrafficService, DEFAULT_EVENT_NAME};
//!
//! # async fn demo() -> Result<(), rf_traffic::TrafficError> {
//! let bus = EventBus::new();
//! let service = TrafficService::start(&bus, DEFAULT_EVENT_NAME, TrafficConfig::default());
//!
//! let stats = service
//!     .handle()
//!     .get_stats(MessageFilter::default(), StatsWindow::SinceReset, 20)
//!     .await?;
//! println!("{} messages", stats.totals.total_count);
//!
//! service.stop(&bus).await?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod aggregator;
pub mod bus;
pub mod error;
pub mod event;
pub mod ring_buffer;
pub mod service;

pub use actor::{run_traffic_actor, TrafficCommand};
pub use aggregator::{
    FlowAggregate, FlowStats, GlobalAggregate, MessagePage, StatsWindow, TrafficAggregator,
    TrafficConfig, TrafficStats, TrafficTotals,
};
pub use bus::{EventBus, SubscriptionToken};
pub use error::TrafficError;
pub use event::{BridgeEvent, DEFAULT_EVENT_NAME};
pub use ring_buffer::RingBuffer;
pub use service::{TrafficHandle, TrafficService};
