//! Event bus: ordered subscriptions and synchronous dispatch.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

/// Handler invoked with the emitted payload.
pub type EventHandler = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// Event name → ordered handlers.
///
/// Subscribing takes `&mut self` and only happens while the host is
/// bootstrapping; afterwards the bus is shared immutably and `emit` needs no
/// lock. There is no teardown and no unsubscribe.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<String, Vec<EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `event`. Subscribing the same
    /// handler twice makes it fire twice.
    pub fn subscribe<F>(&mut self, event: &str, handler: F)
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_arc(event, Arc::new(handler));
    }

    pub fn subscribe_arc(&mut self, event: &str, handler: EventHandler) {
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    /// Invoke every handler for `event` in subscription order.
    ///
    /// Emitting an event nobody subscribed to is a no-op.
    pub fn emit(&self, event: &str, payload: &Value) {
        let Some(handlers) = self.handlers.get(event) else {
            return;
        };
        debug!(event, handlers = handlers.len(), "Emitting event");

        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(event, handler = index, "Event handler failed: {e:#}"),
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    error!(event, handler = index, "Event handler panicked: {msg}");
                }
            }
        }
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// Names with at least one subscriber, sorted.
    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Append all of `other`'s subscriptions after the existing ones,
    /// preserving `other`'s per-event order.
    pub fn merge(&mut self, other: EventBus) {
        for (event, handlers) in other.handlers {
            self.handlers.entry(event).or_default().extend(handlers);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}
