//! Bridge reference and bridge-interface bookkeeping, keyed by dpn.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ifm_common::IfmResult;
use ifm_datastore::{tables, DataStore, DataStoreExt, Partition, Transaction};
use ifm_types::{BridgeEntry, BridgeRefEntry, DpnId};

/// Persisted shape of a bridge's expected tunnel-interface list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BridgeInterfaceList {
    interfaces: Vec<String>,
}

/// Index over bridge pointers and per-bridge tunnel membership.
///
/// The operational bridge-ref entry tracks the live southbound node and is
/// removed on disconnect; the config bridge entry is the durable copy that
/// survives reconnection. Both are cached per dpn.
pub struct BridgeIndex {
    store: Arc<dyn DataStore>,
    refs_by_dpn: DashMap<DpnId, BridgeRefEntry>,
    entries_by_dpn: DashMap<DpnId, BridgeEntry>,
    interfaces_by_dpn: DashMap<DpnId, Vec<String>>,
}

impl BridgeIndex {
    /// Creates an index over the given store.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            refs_by_dpn: DashMap::new(),
            entries_by_dpn: DashMap::new(),
            interfaces_by_dpn: DashMap::new(),
        }
    }

    /// Records the live bridge pointer for a connected dpn.
    pub async fn add_bridge_ref(&self, entry: BridgeRefEntry) -> IfmResult<()> {
        let mut tx = Transaction::new();
        tx.put_json(
            Partition::Operational,
            tables::BRIDGE_REFS,
            &entry.dpn.to_string(),
            &entry,
        )?;
        self.store.submit(tx).await?;

        debug!("Bridge {} connected on dpn {}", entry.bridge, entry.dpn);
        self.refs_by_dpn.insert(entry.dpn, entry);
        Ok(())
    }

    /// Drops the live bridge pointer on disconnect.
    ///
    /// The durable config-partition bridge entry is intentionally retained.
    pub async fn remove_bridge_ref(&self, dpn: DpnId) -> IfmResult<()> {
        let mut tx = Transaction::new();
        tx.delete(Partition::Operational, tables::BRIDGE_REFS, &dpn.to_string());
        self.store.submit(tx).await?;

        self.refs_by_dpn.remove(&dpn);
        debug!("Bridge ref removed for dpn {}", dpn);
        Ok(())
    }

    /// Returns the live bridge pointer for a dpn, reading through on miss.
    pub async fn bridge_ref(&self, dpn: DpnId) -> IfmResult<Option<BridgeRefEntry>> {
        if let Some(entry) = self.refs_by_dpn.get(&dpn) {
            return Ok(Some(entry.clone()));
        }

        let entry: Option<BridgeRefEntry> = self
            .store
            .read_json(Partition::Operational, tables::BRIDGE_REFS, &dpn.to_string())
            .await?;
        if let Some(entry) = &entry {
            self.refs_by_dpn.insert(dpn, entry.clone());
        }
        Ok(entry)
    }

    /// Persists the durable bridge entry for a dpn.
    pub async fn add_bridge_entry(&self, entry: BridgeEntry) -> IfmResult<()> {
        let mut tx = Transaction::new();
        tx.put_json(
            Partition::Config,
            tables::BRIDGE_ENTRIES,
            &entry.dpn.to_string(),
            &entry,
        )?;
        self.store.submit(tx).await?;

        self.entries_by_dpn.insert(entry.dpn, entry);
        Ok(())
    }

    /// Removes the durable bridge entry (switch decommissioned).
    pub async fn remove_bridge_entry(&self, dpn: DpnId) -> IfmResult<()> {
        let mut tx = Transaction::new();
        tx.delete(Partition::Config, tables::BRIDGE_ENTRIES, &dpn.to_string());
        self.store.submit(tx).await?;

        self.entries_by_dpn.remove(&dpn);
        Ok(())
    }

    /// Returns the durable bridge entry for a dpn, reading through on miss.
    pub async fn bridge_entry(&self, dpn: DpnId) -> IfmResult<Option<BridgeEntry>> {
        if let Some(entry) = self.entries_by_dpn.get(&dpn) {
            return Ok(Some(entry.clone()));
        }

        let entry: Option<BridgeEntry> = self
            .store
            .read_json(Partition::Config, tables::BRIDGE_ENTRIES, &dpn.to_string())
            .await?;
        if let Some(entry) = &entry {
            self.entries_by_dpn.insert(dpn, entry.clone());
        }
        Ok(entry)
    }

    /// Records a tunnel interface as expected on the dpn's bridge.
    ///
    /// Idempotent: re-adding an already-listed interface performs no write.
    pub async fn add_bridge_interface(&self, dpn: DpnId, name: &str) -> IfmResult<()> {
        let mut interfaces = self.bridge_interfaces(dpn).await?;
        if interfaces.iter().any(|i| i == name) {
            return Ok(());
        }
        interfaces.push(name.to_string());

        let mut tx = Transaction::new();
        tx.merge_json(
            Partition::Config,
            tables::BRIDGE_INTERFACES,
            &dpn.to_string(),
            &BridgeInterfaceList {
                interfaces: interfaces.clone(),
            },
        )?;
        self.store.submit(tx).await?;

        self.interfaces_by_dpn.insert(dpn, interfaces);
        debug!("Interface {} expected on bridge of dpn {}", name, dpn);
        Ok(())
    }

    /// Forgets a tunnel interface; drops the dpn key with the last entry.
    pub async fn remove_bridge_interface(&self, dpn: DpnId, name: &str) -> IfmResult<()> {
        let mut interfaces = self.bridge_interfaces(dpn).await?;
        let before = interfaces.len();
        interfaces.retain(|i| i != name);
        if interfaces.len() == before {
            return Ok(());
        }

        let mut tx = Transaction::new();
        if interfaces.is_empty() {
            tx.delete(
                Partition::Config,
                tables::BRIDGE_INTERFACES,
                &dpn.to_string(),
            );
        } else {
            tx.merge_json(
                Partition::Config,
                tables::BRIDGE_INTERFACES,
                &dpn.to_string(),
                &BridgeInterfaceList {
                    interfaces: interfaces.clone(),
                },
            )?;
        }
        self.store.submit(tx).await?;

        if interfaces.is_empty() {
            self.interfaces_by_dpn.remove(&dpn);
        } else {
            self.interfaces_by_dpn.insert(dpn, interfaces);
        }
        Ok(())
    }

    /// Returns the tunnel interfaces expected on a dpn's bridge.
    pub async fn bridge_interfaces(&self, dpn: DpnId) -> IfmResult<Vec<String>> {
        if let Some(interfaces) = self.interfaces_by_dpn.get(&dpn) {
            return Ok(interfaces.clone());
        }

        let list: Option<BridgeInterfaceList> = self
            .store
            .read_json(
                Partition::Config,
                tables::BRIDGE_INTERFACES,
                &dpn.to_string(),
            )
            .await?;
        let interfaces = list.map(|l| l.interfaces).unwrap_or_default();
        if !interfaces.is_empty() {
            self.interfaces_by_dpn.insert(dpn, interfaces.clone());
        }
        Ok(interfaces)
    }
}
