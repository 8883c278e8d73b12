//! Transient liveness oper-status cache.

use dashmap::DashMap;

use ifm_types::OperStatus;

/// Last-known liveness status per interface, in-memory only.
///
/// Used to skip redundant operational-state writes and to answer concurrent
/// reads before the authoritative write lands. Never persisted.
#[derive(Default)]
pub struct LivenessCache {
    status_by_interface: DashMap<String, OperStatus>,
}

impl LivenessCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last-known status for an interface.
    pub fn get(&self, name: &str) -> Option<OperStatus> {
        self.status_by_interface.get(name).map(|s| *s)
    }

    /// Records a status; returns true when it differs from the previous one.
    pub fn update(&self, name: &str, status: OperStatus) -> bool {
        match self.status_by_interface.insert(name.to_string(), status) {
            Some(previous) => previous != status,
            None => true,
        }
    }

    /// Forgets an interface.
    pub fn remove(&self, name: &str) {
        self.status_by_interface.remove(name);
    }
}
