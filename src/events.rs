//! Balance-change events and the sink that collects them.

use crate::decimal::Amount;
use crate::transaction::TxKind;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use uuid::Uuid;

/// An immutable record of a balance change on one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: TxKind,
    pub subject_account: String,
    pub old_value: Amount,
    pub new_value: Amount,
}

impl Event {
    /// Creates an event stamped with a fresh id and the current time.
    pub fn value_changed(
        kind: TxKind,
        subject_account: impl Into<String>,
        old_value: Amount,
        new_value: Amount,
    ) -> Self {
        Event {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            subject_account: subject_account.into(),
            old_value,
            new_value,
        }
    }
}

/// Ordered, append-only destination for events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);

    /// Returns every event emitted since the last drain and clears them.
    fn drain(&self) -> Vec<Event>;

    /// Returns the pending events without clearing them.
    fn snapshot(&self) -> Vec<Event>;

    /// Receives every event emitted after this call.
    fn subscribe(&self) -> mpsc::Receiver<Event>;
}

/// Session-scoped sink kept in process memory.
///
/// - Events are kept in emission order
/// - Subscribers whose receiver was dropped are pruned on the next emit
/// - Nothing survives a restart; use the transaction log for that
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<Event>>,
    subscribers: Mutex<Vec<mpsc::Sender<Event>>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: Event) {
        // Hold the event lock while fanning out so subscribers observe the
        // same order as drain().
        let mut events = self.events.lock();
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
        events.push(event);
    }

    fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }
}
