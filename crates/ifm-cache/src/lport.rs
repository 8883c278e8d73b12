//! Bijective interface-name <-> lport-tag index.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use ifm_common::IfmResult;
use ifm_datastore::{tables, DataStore, DataStoreExt, Partition, Transaction};
use ifm_types::LportTag;

/// Bidirectional index between interface names and lport tags.
///
/// Both directions are written in one transaction, so the persisted maps
/// agree whenever a submit succeeds. Invariant: at most one live tag per
/// interface name and vice versa.
pub struct LportIndex {
    store: Arc<dyn DataStore>,
    tag_by_name: DashMap<String, LportTag>,
    name_by_tag: DashMap<LportTag, String>,
}

impl LportIndex {
    /// Creates an index over the given store.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            tag_by_name: DashMap::new(),
            name_by_tag: DashMap::new(),
        }
    }

    /// Records the name<->tag pair in both directions.
    ///
    /// Re-adding the same pair is a no-op without a store write.
    pub async fn add(&self, name: &str, tag: LportTag) -> IfmResult<()> {
        if let Some(existing) = self.tag_for(name).await? {
            if existing == tag {
                return Ok(());
            }
        }

        let mut tx = Transaction::new();
        tx.put_json(Partition::Operational, tables::IF_LPORT_MAP, name, &tag)?;
        tx.put_json(
            Partition::Operational,
            tables::LPORT_IF_MAP,
            &tag.to_string(),
            &name,
        )?;
        self.store.submit(tx).await?;

        self.tag_by_name.insert(name.to_string(), tag);
        self.name_by_tag.insert(tag, name.to_string());
        debug!("Mapped interface {} <-> lport tag {}", name, tag);
        Ok(())
    }

    /// Removes both directions of the mapping for the interface.
    ///
    /// A missing mapping is a normal nothing-to-do condition.
    pub async fn remove(&self, name: &str) -> IfmResult<()> {
        let Some(tag) = self.tag_for(name).await? else {
            debug!("No lport tag recorded for {}", name);
            return Ok(());
        };

        let mut tx = Transaction::new();
        tx.delete(Partition::Operational, tables::IF_LPORT_MAP, name);
        tx.delete(
            Partition::Operational,
            tables::LPORT_IF_MAP,
            &tag.to_string(),
        );
        self.store.submit(tx).await?;

        self.tag_by_name.remove(name);
        self.name_by_tag.remove(&tag);
        debug!("Unmapped interface {} <-> lport tag {}", name, tag);
        Ok(())
    }

    /// Returns the tag for an interface name, reading through on miss.
    pub async fn tag_for(&self, name: &str) -> IfmResult<Option<LportTag>> {
        if let Some(tag) = self.tag_by_name.get(name) {
            return Ok(Some(*tag));
        }

        let tag: Option<LportTag> = self
            .store
            .read_json(Partition::Operational, tables::IF_LPORT_MAP, name)
            .await?;
        if let Some(tag) = tag {
            self.tag_by_name.insert(name.to_string(), tag);
        }
        Ok(tag)
    }

    /// Returns the interface name for a tag, reading through on miss.
    pub async fn interface_for(&self, tag: LportTag) -> IfmResult<Option<String>> {
        if let Some(name) = self.name_by_tag.get(&tag) {
            return Ok(Some(name.clone()));
        }

        let name: Option<String> = self
            .store
            .read_json(
                Partition::Operational,
                tables::LPORT_IF_MAP,
                &tag.to_string(),
            )
            .await?;
        if let Some(name) = &name {
            self.name_by_tag.insert(tag, name.clone());
        }
        Ok(name)
    }
}
