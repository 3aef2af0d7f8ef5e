//! Traffic aggregator actor
//!
//! One task owns the [`TrafficAggregator`] and applies commands from a
//! channel in arrival order. Live events and queries share the channel, so a
//! query observes every event accepted before it, and a reset can never be
//! interleaved with a read.
//!
//! # Example
//!
//! ```rust,ignore
//! use rf_traffic::actor::{run_traffic_actor, TrafficCommand};
//! use rf_traffic::{TrafficAggregator, TrafficConfig};
//! use tokio::sync::mpsc;
//!
//! let (cmd_tx, cmd_rx) = mpsc::channel(1024);
//! tokio::spawn(run_traffic_actor(TrafficAggregator::new(TrafficConfig::default()), cmd_rx));
//! ```

use rf_protocol::MessageFilter;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::aggregator::{MessagePage, StatsWindow, TrafficAggregator, TrafficStats};
use crate::event::BridgeEvent;

/// Commands sent to the traffic actor
#[derive(Debug)]
pub enum TrafficCommand {
    /// A live event from the bus
    Event(BridgeEvent),

    /// Compute flow statistics
    GetStats {
        /// Flow filter
        filter: MessageFilter,
        /// Recency window
        window: StatsWindow,
        /// Maximum number of flows
        limit: usize,
        /// Channel to send back the stats
        response: oneshot::Sender<TrafficStats>,
    },

    /// Read buffered messages
    GetMessages {
        /// Message filter
        filter: MessageFilter,
        /// Maximum number of messages
        limit: usize,
        /// Channel to send back the page
        response: oneshot::Sender<MessagePage>,
    },

    /// Clear all aggregated state
    Reset {
        /// Signalled once the reset has been applied
        response: oneshot::Sender<()>,
    },

    /// Stop the actor
    Shutdown,
}

/// Run the actor until `Shutdown` arrives or every sender is dropped
///
/// Returns the aggregator so callers can inspect the final state.
pub async fn run_traffic_actor(
    mut aggregator: TrafficAggregator,
    mut cmd_rx: mpsc::Receiver<TrafficCommand>,
) -> TrafficAggregator {
    info!("Traffic actor started");

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            TrafficCommand::Event(event) => {
                aggregator.on_event(&event);
            }

            TrafficCommand::GetStats {
                filter,
                window,
                limit,
                response,
            } => {
                let _ = response.send(aggregator.get_stats(&filter, window, limit));
            }

            TrafficCommand::GetMessages {
                filter,
                limit,
                response,
            } => {
                let _ = response.send(aggregator.get_messages(&filter, limit));
            }

            TrafficCommand::Reset { response } => {
                aggregator.reset_stats();
                debug!("Traffic statistics reset");
                let _ = response.send(());
            }

            TrafficCommand::Shutdown => {
                info!("Traffic actor shutting down");
                break;
            }
        }
    }

    info!(
        "Traffic actor stopped after {} messages",
        aggregator.totals().total_count
    );
    aggregator
}
