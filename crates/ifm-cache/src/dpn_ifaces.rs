//! Dpn -> bound-interface-list index.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ifm_common::IfmResult;
use ifm_datastore::{tables, DataStore, DataStoreExt, Partition, Transaction};
use ifm_types::DpnId;

/// One interface currently bound to a dpn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpnInterfaceEntry {
    /// Interface name.
    pub name: String,
    /// Interface kind name (for bulk queries by type).
    pub kind: String,
}

/// Persisted shape of a dpn's interface list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DpnInterfaceList {
    interfaces: Vec<DpnInterfaceEntry>,
}

/// Operational index from dpn to the interfaces bound on it.
///
/// Answers "all interfaces on this switch"; the dpn key disappears with
/// its last entry.
pub struct DpnInterfaceIndex {
    store: Arc<dyn DataStore>,
    interfaces_by_dpn: DashMap<DpnId, Vec<DpnInterfaceEntry>>,
}

impl DpnInterfaceIndex {
    /// Creates an index over the given store.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            interfaces_by_dpn: DashMap::new(),
        }
    }

    /// Records an interface as bound to the dpn.
    ///
    /// Idempotent: re-adding an already-listed interface performs no write.
    pub async fn add(&self, dpn: DpnId, name: &str, kind: &str) -> IfmResult<()> {
        let mut interfaces = self.interfaces_on(dpn).await?;
        if interfaces.iter().any(|e| e.name == name) {
            return Ok(());
        }
        interfaces.push(DpnInterfaceEntry {
            name: name.to_string(),
            kind: kind.to_string(),
        });

        let mut tx = Transaction::new();
        tx.merge_json(
            Partition::Operational,
            tables::DPN_INTERFACES,
            &dpn.to_string(),
            &DpnInterfaceList {
                interfaces: interfaces.clone(),
            },
        )?;
        self.store.submit(tx).await?;

        self.interfaces_by_dpn.insert(dpn, interfaces);
        debug!("Interface {} ({}) bound on dpn {}", name, kind, dpn);
        Ok(())
    }

    /// Removes an interface binding; drops the dpn key with the last entry.
    pub async fn remove(&self, dpn: DpnId, name: &str) -> IfmResult<()> {
        let mut interfaces = self.interfaces_on(dpn).await?;
        let before = interfaces.len();
        interfaces.retain(|e| e.name != name);
        if interfaces.len() == before {
            debug!("Interface {} not recorded on dpn {}", name, dpn);
            return Ok(());
        }

        let mut tx = Transaction::new();
        if interfaces.is_empty() {
            tx.delete(
                Partition::Operational,
                tables::DPN_INTERFACES,
                &dpn.to_string(),
            );
        } else {
            tx.merge_json(
                Partition::Operational,
                tables::DPN_INTERFACES,
                &dpn.to_string(),
                &DpnInterfaceList {
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
        debug!("Interface {} unbound from dpn {}", name, dpn);
        Ok(())
    }

    /// Returns the interfaces bound to a dpn, reading through on miss.
    pub async fn interfaces_on(&self, dpn: DpnId) -> IfmResult<Vec<DpnInterfaceEntry>> {
        if let Some(interfaces) = self.interfaces_by_dpn.get(&dpn) {
            return Ok(interfaces.clone());
        }

        let list: Option<DpnInterfaceList> = self
            .store
            .read_json(
                Partition::Operational,
                tables::DPN_INTERFACES,
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

#[cfg(test)]
mod tests {
    use super::*;
    use ifm_datastore::MemDataStore;

    fn index() -> (Arc<MemDataStore>, DpnInterfaceIndex) {
        let store = Arc::new(MemDataStore::new());
        let idx = DpnInterfaceIndex::new(store.clone());
        (store, idx)
    }

    #[tokio::test]
    async fn test_add_and_query() {
        let (_store, idx) = index();
        let dpn = DpnId::new(1);

        idx.add(dpn, "vlan1", "vlan-trunk-member").await.unwrap();
        idx.add(dpn, "tun0", "vxlan").await.unwrap();

        let interfaces = idx.interfaces_on(dpn).await.unwrap();
        assert_eq!(interfaces.len(), 2);
        assert!(interfaces
            .iter()
            .any(|e| e.name == "tun0" && e.kind == "vxlan"));
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (store, idx) = index();
        let dpn = DpnId::new(1);

        idx.add(dpn, "vlan1", "vlan-trunk-member").await.unwrap();
        store.fail_submits(1);
        idx.add(dpn, "vlan1", "vlan-trunk-member").await.unwrap();

        assert_eq!(idx.interfaces_on(dpn).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_last_entry_removes_dpn_key() {
        let (store, idx) = index();
        let dpn = DpnId::new(7);

        idx.add(dpn, "vlan1", "vlan-trunk-member").await.unwrap();
        idx.remove(dpn, "vlan1").await.unwrap();

        assert!(idx.interfaces_on(dpn).await.unwrap().is_empty());
        assert!(!store.contains(Partition::Operational, tables::DPN_INTERFACES, "7"));
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let (_store, idx) = index();
        idx.remove(DpnId::new(7), "ghost").await.unwrap();
    }
}
