//! Parent-interface -> child-interface index with trunk exclusivity.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ifm_common::IfmResult;
use ifm_datastore::{tables, DataStore, DataStoreExt, Partition, Transaction};
use ifm_types::ChildMode;

/// One child interface bound under a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    /// Child interface name.
    pub name: String,
    /// Membership mode.
    pub mode: ChildMode,
}

/// Persisted shape of a parent's child list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChildList {
    children: Vec<ChildEntry>,
}

/// Index of child interfaces bound under each parent interface.
///
/// A physical port may carry at most one trunk-mode consumer at a time;
/// any number of trunk-member children are fine.
pub struct ParentChildIndex {
    store: Arc<dyn DataStore>,
    children_by_parent: DashMap<String, Vec<ChildEntry>>,
}

impl ParentChildIndex {
    /// Creates an index over the given store.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            children_by_parent: DashMap::new(),
        }
    }

    /// Binds `child` under `parent` unless the binding conflicts.
    ///
    /// Returns false without mutating anything when the child entry already
    /// exists, or when `mode` is trunk and the parent already carries a
    /// trunk-mode child.
    pub async fn create_child_entry_if_not_present(
        &self,
        parent: &str,
        child: &str,
        mode: ChildMode,
    ) -> IfmResult<bool> {
        let mut children = self.children(parent).await?;

        if children.iter().any(|c| c.name == child) {
            warn!("Child {} already present under {}", child, parent);
            return Ok(false);
        }
        if mode == ChildMode::Trunk && children.iter().any(|c| c.mode == ChildMode::Trunk) {
            warn!(
                "Rejecting second trunk-mode child {} under {}",
                child, parent
            );
            return Ok(false);
        }

        children.push(ChildEntry {
            name: child.to_string(),
            mode,
        });

        let mut tx = Transaction::new();
        tx.merge_json(
            Partition::Operational,
            tables::PARENT_CHILDREN,
            parent,
            &ChildList {
                children: children.clone(),
            },
        )?;
        self.store.submit(tx).await?;

        self.children_by_parent.insert(parent.to_string(), children);
        debug!("Bound child {} ({}) under {}", child, mode.as_str(), parent);
        Ok(true)
    }

    /// Removes one child binding; drops the parent entry with the last child.
    pub async fn remove_child(&self, parent: &str, child: &str) -> IfmResult<()> {
        let mut children = self.children(parent).await?;
        let before = children.len();
        children.retain(|c| c.name != child);
        if children.len() == before {
            debug!("No child {} recorded under {}", child, parent);
            return Ok(());
        }

        let mut tx = Transaction::new();
        if children.is_empty() {
            tx.delete(Partition::Operational, tables::PARENT_CHILDREN, parent);
        } else {
            tx.merge_json(
                Partition::Operational,
                tables::PARENT_CHILDREN,
                parent,
                &ChildList {
                    children: children.clone(),
                },
            )?;
        }
        self.store.submit(tx).await?;

        if children.is_empty() {
            self.children_by_parent.remove(parent);
        } else {
            self.children_by_parent.insert(parent.to_string(), children);
        }
        debug!("Unbound child {} from {}", child, parent);
        Ok(())
    }

    /// Removes the parent's container entry regardless of remaining children.
    ///
    /// Callers are expected to have removed or relocated the children first.
    pub async fn remove_parent(&self, parent: &str) -> IfmResult<()> {
        let mut tx = Transaction::new();
        tx.delete(Partition::Operational, tables::PARENT_CHILDREN, parent);
        self.store.submit(tx).await?;

        self.children_by_parent.remove(parent);
        debug!("Removed parent entry {}", parent);
        Ok(())
    }

    /// Returns the children bound under a parent, reading through on miss.
    pub async fn children(&self, parent: &str) -> IfmResult<Vec<ChildEntry>> {
        if let Some(children) = self.children_by_parent.get(parent) {
            return Ok(children.clone());
        }

        let list: Option<ChildList> = self
            .store
            .read_json(Partition::Operational, tables::PARENT_CHILDREN, parent)
            .await?;
        let children = list.map(|l| l.children).unwrap_or_default();
        if !children.is_empty() {
            self.children_by_parent
                .insert(parent.to_string(), children.clone());
        }
        Ok(children)
    }
}
