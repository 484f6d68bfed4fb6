//! Page-scoped message bus.
//!
//! The bridge only depends on [`MessageBus`]; [`PageChannel`] is the
//! in-process transport, with the agent side reading posted messages from an
//! outbox receiver and delivering its replies through [`PageChannel::dispatch`].

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use super::messages::{OutgoingMessage, PageEvent};

pub type EventFilter = Arc<dyn Fn(&PageEvent) -> bool + Send + Sync>;
pub type EventHandler = Arc<dyn Fn(&PageEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Message transport between the page and the notarization agent.
pub trait MessageBus: Send + Sync {
    /// Origin of the page this bus belongs to.
    fn origin(&self) -> &str;

    /// Posts a message. Fire-and-forget: success only means it was handed to the transport.
    fn send(&self, message: &OutgoingMessage) -> Result<()>;

    /// Registers `handler` for events accepted by `filter`.
    fn subscribe(&self, filter: EventFilter, handler: EventHandler) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    handler: EventHandler,
}

/// In-process page channel.
pub struct PageChannel {
    origin: String,
    outbox: mpsc::UnboundedSender<serde_json::Value>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl PageChannel {
    /// Creates a channel for a page at `origin`.
    ///
    /// # Returns
    ///
    /// The channel and the receiver on which posted messages arrive as JSON.
    pub fn new(origin: &str) -> (Self, mpsc::UnboundedReceiver<serde_json::Value>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let channel = Self {
            origin: origin.to_string(),
            outbox,
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        };
        (channel, rx)
    }

    /// Delivers an event to every subscriber whose filter accepts it.
    ///
    /// Handlers run outside the subscriber lock, so they may (un)subscribe.
    ///
    /// # Returns
    ///
    /// Number of handlers invoked.
    pub fn dispatch(&self, event: PageEvent) -> usize {
        let matching: Vec<EventHandler> = {
            let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
            subscribers
                .iter()
                .filter(|s| (s.filter)(&event))
                .map(|s| s.handler.clone())
                .collect()
        };
        if matching.is_empty() {
            debug!("No subscriber accepted page event from {}", event.origin);
        }
        for handler in &matching {
            handler(&event);
        }
        matching.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl MessageBus for PageChannel {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let value = serde_json::to_value(message).context("Failed to encode page message")?;
        self.outbox
            .send(value)
            .map_err(|_| anyhow::anyhow!("Page channel closed: no agent is reading posted messages"))
    }

    fn subscribe(&self, filter: EventFilter, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { id, filter, handler });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| s.id != id);
    }
}
