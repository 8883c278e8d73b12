//! In-memory datastore backend.
//!
//! Backs the daemon scaffold and all tests. Supports injected submit
//! failures so transaction-failure paths can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use ifm_common::{IfmError, IfmResult};

use crate::store::{DataStore, Partition, Transaction, TxOp};

type EntryKey = (Partition, String, String);

/// In-memory transactional store with two partitions.
#[derive(Default)]
pub struct MemDataStore {
    entries: RwLock<HashMap<EntryKey, Value>>,
    /// Number of upcoming submits that should fail.
    inject_failures: AtomicUsize,
}

impl MemDataStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` submits fail with a datastore error.
    pub fn fail_submits(&self, count: usize) {
        self.inject_failures.store(count, Ordering::SeqCst);
    }

    /// Returns the total number of entries across both partitions.
    pub fn entry_count(&self) -> usize {
        self.entries.read().expect("store lock poisoned").len()
    }

    /// Returns true if the entry exists.
    pub fn contains(&self, partition: Partition, table: &str, key: &str) -> bool {
        self.entries
            .read()
            .expect("store lock poisoned")
            .contains_key(&(partition, table.to_string(), key.to_string()))
    }

    fn take_injected_failure(&self) -> bool {
        self.inject_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Deep-merges `patch` into `target`.
///
/// Objects merge field-wise recursively; arrays and scalars are replaced.
fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (field, patch_value) in patch_map {
                match target_map.get_mut(&field) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None => {
                        target_map.insert(field, patch_value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

#[async_trait]
impl DataStore for MemDataStore {
    async fn read(
        &self,
        partition: Partition,
        table: &str,
        key: &str,
    ) -> IfmResult<Option<Value>> {
        let entries = self.entries.read().expect("store lock poisoned");
        Ok(entries
            .get(&(partition, table.to_string(), key.to_string()))
            .cloned())
    }

    async fn read_keys(&self, partition: Partition, table: &str) -> IfmResult<Vec<String>> {
        let entries = self.entries.read().expect("store lock poisoned");
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|(p, t, _)| *p == partition && t == table)
            .map(|(_, _, k)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn submit(&self, tx: Transaction) -> IfmResult<()> {
        if self.take_injected_failure() {
            return Err(IfmError::datastore("submit", "injected failure"));
        }

        let ops = tx.into_ops();
        let mut entries = self.entries.write().expect("store lock poisoned");

        for op in ops {
            match op {
                TxOp::Put {
                    partition,
                    table,
                    key,
                    value,
                } => {
                    trace!("put {}/{}/{}", partition.name(), table, key);
                    entries.insert((partition, table, key), value);
                }
                TxOp::Merge {
                    partition,
                    table,
                    key,
                    value,
                } => {
                    trace!("merge {}/{}/{}", partition.name(), table, key);
                    match entries.get_mut(&(partition, table.clone(), key.clone())) {
                        Some(existing) => deep_merge(existing, value),
                        None => {
                            entries.insert((partition, table, key), value);
                        }
                    }
                }
                TxOp::Delete {
                    partition,
                    table,
                    key,
                } => {
                    trace!("delete {}/{}/{}", partition.name(), table, key);
                    entries.remove(&(partition, table, key));
                }
            }
        }

        Ok(())
    }
}
