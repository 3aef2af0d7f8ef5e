//! Traffic service lifecycle
//!
//! [`TrafficService`] wires an [`EventBus`] subscription to the aggregator
//! actor. It has an explicit `start`/`stop` pair; [`TrafficHandle`] is the
//! cloneable query side handed to whoever needs traffic data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rf_protocol::MessageFilter;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actor::{run_traffic_actor, TrafficCommand};
use crate::aggregator::{MessagePage, StatsWindow, TrafficAggregator, TrafficConfig, TrafficStats};
use crate::bus::{EventBus, SubscriptionToken};
use crate::error::TrafficError;
use crate::event::BridgeEvent;

/// Cloneable request side of the traffic actor
#[derive(Debug, Clone)]
pub struct TrafficHandle {
    cmd_tx: mpsc::Sender<TrafficCommand>,
    dropped: Arc<AtomicU64>,
}

impl TrafficHandle {
    /// Queue a live event without waiting
    ///
    /// If the actor is saturated the event is dropped and counted in
    /// `dropped_events`. Returns true if the event was queued.
    pub fn dispatch(&self, event: BridgeEvent) -> bool {
        match self.cmd_tx.try_send(TrafficCommand::Event(event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let previous = self.dropped.fetch_add(1, Ordering::Relaxed);
                if previous == 0 {
                    warn!("Traffic actor saturated, dropping live events");
                } else {
                    debug!("Dropped live event ({} total)", previous + 1);
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Traffic actor stopped, ignoring live event");
                false
            }
        }
    }

    /// Flow statistics
    pub async fn get_stats(
        &self,
        filter: MessageFilter,
        window: StatsWindow,
        limit: usize,
    ) -> Result<TrafficStats, TrafficError> {
        let (response, rx) = oneshot::channel();
        self.request(
            TrafficCommand::GetStats {
                filter,
                window,
                limit,
                response,
            },
            rx,
        )
        .await
    }

    /// Buffered messages, newest first
    pub async fn get_messages(
        &self,
        filter: MessageFilter,
        limit: usize,
    ) -> Result<MessagePage, TrafficError> {
        let (response, rx) = oneshot::channel();
        self.request(
            TrafficCommand::GetMessages {
                filter,
                limit,
                response,
            },
            rx,
        )
        .await
    }

    /// Clear all aggregated state, resolving once the reset is applied
    pub async fn reset_stats(&self) -> Result<(), TrafficError> {
        let (response, rx) = oneshot::channel();
        self.request(TrafficCommand::Reset { response }, rx).await
    }

    /// True once the actor has exited
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    async fn request<T>(
        &self,
        cmd: TrafficCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, TrafficError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| TrafficError::ServiceStopped)?;
        rx.await.map_err(|_| TrafficError::ServiceStopped)
    }
}

/// Running traffic aggregation
#[derive(Debug)]
pub struct TrafficService {
    handle: TrafficHandle,
    token: SubscriptionToken,
    task: JoinHandle<TrafficAggregator>,
}

impl TrafficService {
    /// Spawn the actor and subscribe it to `event_name` on `bus`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(bus: &EventBus, event_name: &str, config: TrafficConfig) -> Self {
        let aggregator = TrafficAggregator::new(config);
        let dropped = aggregator.dropped_counter();
        let (cmd_tx, cmd_rx) = mpsc::channel(config.channel_capacity.max(1));
        let task = tokio::spawn(run_traffic_actor(aggregator, cmd_rx));

        let handle = TrafficHandle { cmd_tx, dropped };
        let sink = handle.clone();
        let token = bus.subscribe(event_name, move |event| {
            sink.dispatch(event.clone());
        });

        info!(
            "Traffic service listening for '{}' (global buffer {}, flow buffer {})",
            event_name, config.global_capacity, config.flow_capacity
        );
        Self {
            handle,
            token,
            task,
        }
    }

    /// Query handle for the running service
    pub fn handle(&self) -> TrafficHandle {
        self.handle.clone()
    }

    /// Unsubscribe from the bus and stop the actor
    ///
    /// Events queued before the call are still applied. Returns the final
    /// aggregator state.
    pub async fn stop(self, bus: &EventBus) -> Result<TrafficAggregator, TrafficError> {
        let event_name = self.token.event_name().to_string();
        if !bus.unsubscribe(self.token) {
            warn!("Traffic subscription for '{}' was already gone", event_name);
        }
        // A closed channel means the actor is already exiting
        let _ = self.handle.cmd_tx.send(TrafficCommand::Shutdown).await;
        let aggregator = self.task.await.map_err(|_| TrafficError::ServiceStopped)?;
        info!("Traffic service stopped");
        Ok(aggregator)
    }
}
