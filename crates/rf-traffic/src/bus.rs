//! Event subscription primitive
//!
//! [`EventBus`] routes [`BridgeEvent`]s to handlers registered by event name.
//! Registration returns a [`SubscriptionToken`]; handing the token back to
//! [`EventBus::unsubscribe`] consumes it, so teardown is explicit and a
//! subscription cannot be removed twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::event::BridgeEvent;

type Handler = Arc<dyn Fn(&BridgeEvent) + Send + Sync>;

static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(1);

/// Proof of a live subscription, consumed on unsubscribe
#[derive(Debug)]
#[must_use = "dropping the token leaks the subscription"]
pub struct SubscriptionToken {
    bus_id: u64,
    id: u64,
    event_name: String,
}

impl SubscriptionToken {
    /// Event name this token subscribes to
    pub fn event_name(&self) -> &str {
        &self.event_name
    }
}

struct Registration {
    id: u64,
    event_name: String,
    handler: Handler,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    registrations: Vec<Registration>,
}

/// Name-routed event dispatcher
pub struct EventBus {
    id: u64,
    state: Mutex<BusState>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            id: NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(BusState::default()),
        }
    }

    /// Register `handler` for events named `event_name`
    ///
    /// Handlers run on the publisher's task and must not block.
    pub fn subscribe<F>(&self, event_name: impl Into<String>, handler: F) -> SubscriptionToken
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        let event_name = event_name.into();
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.registrations.push(Registration {
            id,
            event_name: event_name.clone(),
            handler: Arc::new(handler),
        });
        debug!("Subscribed to '{}' (subscription {})", event_name, id);
        SubscriptionToken {
            bus_id: self.id,
            id,
            event_name,
        }
    }

    /// Remove a subscription
    ///
    /// Returns false if the token belongs to a different bus.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        if token.bus_id != self.id {
            return false;
        }
        let mut state = self.state.lock();
        let before = state.registrations.len();
        state.registrations.retain(|r| r.id != token.id);
        let removed = state.registrations.len() != before;
        if removed {
            debug!(
                "Unsubscribed from '{}' (subscription {})",
                token.event_name, token.id
            );
        }
        removed
    }

    /// Deliver an event to every handler registered for its name
    ///
    /// Returns the number of handlers invoked. Handlers are called outside
    /// the registration lock, so a handler may subscribe or unsubscribe.
    pub fn publish(&self, event: &BridgeEvent) -> usize {
        let handlers: Vec<Handler> = {
            let state = self.state.lock();
            state
                .registrations
                .iter()
                .filter(|r| r.event_name == event.event_type)
                .map(|r| Arc::clone(&r.handler))
                .collect()
        };
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Number of live subscriptions for an event name
    pub fn subscriber_count(&self, event_name: &str) -> usize {
        self.state
            .lock()
            .registrations
            .iter()
            .filter(|r| r.event_name == event_name)
            .count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventBus")
            .field("subscriptions", &state.registrations.len())
            .finish()
    }
}
