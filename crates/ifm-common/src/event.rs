//! Per-key coalescing event queue.
//!
//! Listener callbacks push keyed Set/Del events here; the owning component
//! drains the queue on its own schedule. Events for the same key are
//! coalesced so a burst of updates collapses to the latest intent:
//!
//! - Set after a pending Set replaces it (payloads are whole documents,
//!   newest wins)
//! - Del clears any pending events for the key and enqueues the Del
//! - Set after a pending Del is kept behind it (delete-then-recreate must
//!   stay two operations)

use std::collections::{BTreeMap, VecDeque};

/// Operation carried by a keyed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOp<T> {
    /// Create or replace the keyed entry with the payload.
    Set(T),
    /// Delete the keyed entry.
    Del,
}

impl<T> EventOp<T> {
    /// Returns true if this is a Set operation.
    pub fn is_set(&self) -> bool {
        matches!(self, EventOp::Set(_))
    }

    /// Returns true if this is a Del operation.
    pub fn is_del(&self) -> bool {
        matches!(self, EventOp::Del)
    }
}

/// A keyed event from one input source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedEvent<T> {
    /// The entry key (e.g. an interface name).
    pub key: String,
    /// The operation.
    pub op: EventOp<T>,
}

impl<T> KeyedEvent<T> {
    /// Creates a Set event.
    pub fn set(key: impl Into<String>, payload: T) -> Self {
        Self {
            key: key.into(),
            op: EventOp::Set(payload),
        }
    }

    /// Creates a Del event.
    pub fn del(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            op: EventOp::Del,
        }
    }
}

/// Coalescing queue of keyed events from one input source.
pub struct EventQueue<T> {
    /// Pending events indexed by key for coalescing.
    to_sync: BTreeMap<String, VecDeque<KeyedEvent<T>>>,
    /// Total count of pending events.
    pending_count: usize,
}

impl<T> EventQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            to_sync: BTreeMap::new(),
            pending_count: 0,
        }
    }

    /// Returns true if there are pending events.
    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    /// Returns the number of pending events.
    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    /// Adds an event, coalescing against pending events for the same key.
    pub fn push(&mut self, event: KeyedEvent<T>) {
        let queue = self.to_sync.entry(event.key.clone()).or_default();

        match event.op {
            EventOp::Del => {
                // Del clears any pending events and replaces them
                if !queue.is_empty() {
                    self.pending_count -= queue.len();
                    queue.clear();
                }
                queue.push_back(event);
                self.pending_count += 1;
            }
            EventOp::Set(_) => {
                if let Some(last) = queue.back_mut() {
                    if last.op.is_set() {
                        // Newest whole-document Set wins
                        *last = event;
                        return;
                    }
                }
                // Either empty queue or last was Del - append the Set
                queue.push_back(event);
                self.pending_count += 1;
            }
        }
    }

    /// Drains all pending events, grouped by key in key order.
    pub fn drain(&mut self) -> Vec<KeyedEvent<T>> {
        let mut result = Vec::with_capacity(self.pending_count);

        for (_key, mut queue) in std::mem::take(&mut self.to_sync) {
            while let Some(event) = queue.pop_front() {
                result.push(event);
            }
        }

        self.pending_count = 0;
        result
    }

    /// Dumps pending events for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.to_sync
            .iter()
            .flat_map(|(key, queue)| {
                queue.iter().map(move |e| {
                    format!("{}: {}", key, if e.op.is_set() { "SET" } else { "DEL" })
                })
            })
            .collect()
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
