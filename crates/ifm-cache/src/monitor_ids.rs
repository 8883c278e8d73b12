//! Bidirectional monitor-id <-> interface index.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ifm_common::IfmResult;
use ifm_datastore::{tables, DataStore, DataStoreExt, Partition, Transaction};

/// Persisted shape of an interface's monitor-id list.
///
/// Modeled as a list even though one session per tunnel is the norm; the
/// stop path deliberately processes only the first live entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MonitorIdList {
    monitor_ids: Vec<u32>,
}

/// Index routing async liveness callbacks back to their interface.
pub struct MonitorIndex {
    store: Arc<dyn DataStore>,
    interface_by_id: DashMap<u32, String>,
    ids_by_interface: DashMap<String, Vec<u32>>,
}

impl MonitorIndex {
    /// Creates an index over the given store.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            interface_by_id: DashMap::new(),
            ids_by_interface: DashMap::new(),
        }
    }

    /// Records a monitor id for an interface, both directions in one
    /// transaction.
    ///
    /// Idempotent: an id already on the interface's list performs no write.
    pub async fn add(&self, monitor_id: u32, name: &str) -> IfmResult<()> {
        let mut ids = self.monitor_ids(name).await?;
        if ids.contains(&monitor_id) {
            return Ok(());
        }
        ids.push(monitor_id);

        let mut tx = Transaction::new();
        tx.put_json(
            Partition::Operational,
            tables::MONITOR_IF_MAP,
            &monitor_id.to_string(),
            &name,
        )?;
        tx.merge_json(
            Partition::Operational,
            tables::IF_MONITOR_MAP,
            name,
            &MonitorIdList {
                monitor_ids: ids.clone(),
            },
        )?;
        self.store.submit(tx).await?;

        self.interface_by_id.insert(monitor_id, name.to_string());
        self.ids_by_interface.insert(name.to_string(), ids);
        debug!("Monitor id {} mapped to interface {}", monitor_id, name);
        Ok(())
    }

    /// Removes a monitor id from both directions of the mapping.
    pub async fn remove(&self, monitor_id: u32, name: &str) -> IfmResult<()> {
        let mut ids = self.monitor_ids(name).await?;
        let before = ids.len();
        ids.retain(|id| *id != monitor_id);
        let listed = ids.len() != before;

        let mut tx = Transaction::new();
        tx.delete(
            Partition::Operational,
            tables::MONITOR_IF_MAP,
            &monitor_id.to_string(),
        );
        if listed {
            if ids.is_empty() {
                tx.delete(Partition::Operational, tables::IF_MONITOR_MAP, name);
            } else {
                tx.merge_json(
                    Partition::Operational,
                    tables::IF_MONITOR_MAP,
                    name,
                    &MonitorIdList {
                        monitor_ids: ids.clone(),
                    },
                )?;
            }
        }
        self.store.submit(tx).await?;

        self.interface_by_id.remove(&monitor_id);
        if listed {
            if ids.is_empty() {
                self.ids_by_interface.remove(name);
            } else {
                self.ids_by_interface.insert(name.to_string(), ids);
            }
        }
        debug!("Monitor id {} unmapped from interface {}", monitor_id, name);
        Ok(())
    }

    /// Returns the monitor ids recorded for an interface.
    pub async fn monitor_ids(&self, name: &str) -> IfmResult<Vec<u32>> {
        if let Some(ids) = self.ids_by_interface.get(name) {
            return Ok(ids.clone());
        }

        let list: Option<MonitorIdList> = self
            .store
            .read_json(Partition::Operational, tables::IF_MONITOR_MAP, name)
            .await?;
        let ids = list.map(|l| l.monitor_ids).unwrap_or_default();
        if !ids.is_empty() {
            self.ids_by_interface.insert(name.to_string(), ids.clone());
        }
        Ok(ids)
    }

    /// Resolves a monitor id back to its interface, reading through on miss.
    pub async fn interface_for(&self, monitor_id: u32) -> IfmResult<Option<String>> {
        if let Some(name) = self.interface_by_id.get(&monitor_id) {
            return Ok(Some(name.clone()));
        }

        let name: Option<String> = self
            .store
            .read_json(
                Partition::Operational,
                tables::MONITOR_IF_MAP,
                &monitor_id.to_string(),
            )
            .await?;
        if let Some(name) = &name {
            self.interface_by_id.insert(monitor_id, name.clone());
        }
        Ok(name)
    }
}
