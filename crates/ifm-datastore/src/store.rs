//! Store partitions, table names, transactions and the `DataStore` trait.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use ifm_common::{IfmError, IfmResult};

/// Logical store partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// User intent; read-only to the reconciliation engine apart from the
    /// config mirror it maintains for listeners.
    Config,
    /// Derived and observed state.
    Operational,
}

impl Partition {
    /// Returns the partition name.
    pub fn name(&self) -> &'static str {
        match self {
            Partition::Config => "CONFIG",
            Partition::Operational => "OPERATIONAL",
        }
    }
}

/// Table names used by the ifmgr components.
pub mod tables {
    /// Declared interface configurations (CONFIG), keyed by name.
    pub const INTERFACES: &str = "INTERFACES";
    /// Derived interface states (OPERATIONAL), keyed by name.
    pub const INTERFACES_STATE: &str = "INTERFACES_STATE";
    /// Interface name -> lport tag (OPERATIONAL).
    pub const IF_LPORT_MAP: &str = "IF_LPORT_MAP";
    /// Lport tag -> interface name (OPERATIONAL).
    pub const LPORT_IF_MAP: &str = "LPORT_IF_MAP";
    /// Parent name -> child entries (OPERATIONAL).
    pub const PARENT_CHILDREN: &str = "PARENT_CHILDREN";
    /// Dpn -> live bridge reference (OPERATIONAL).
    pub const BRIDGE_REFS: &str = "BRIDGE_REFS";
    /// Dpn -> durable bridge entry (CONFIG).
    pub const BRIDGE_ENTRIES: &str = "BRIDGE_ENTRIES";
    /// Dpn -> tunnel interfaces expected on the bridge (CONFIG).
    pub const BRIDGE_INTERFACES: &str = "BRIDGE_INTERFACES";
    /// Dpn -> interfaces currently bound to it (OPERATIONAL).
    pub const DPN_INTERFACES: &str = "DPN_INTERFACES";
    /// Monitor id -> interface name (OPERATIONAL).
    pub const MONITOR_IF_MAP: &str = "MONITOR_IF_MAP";
    /// Interface name -> monitor ids (OPERATIONAL).
    pub const IF_MONITOR_MAP: &str = "IF_MONITOR_MAP";
}

/// A single operation inside a transaction.
#[derive(Debug, Clone)]
pub enum TxOp {
    /// Create or wholly replace an entry.
    Put {
        /// Target partition.
        partition: Partition,
        /// Table name.
        table: String,
        /// Entry key.
        key: String,
        /// New value.
        value: Value,
    },
    /// Deep-merge object fields into an entry, creating it when absent.
    Merge {
        /// Target partition.
        partition: Partition,
        /// Table name.
        table: String,
        /// Entry key.
        key: String,
        /// Fields to merge.
        value: Value,
    },
    /// Remove an entry if present.
    Delete {
        /// Target partition.
        partition: Partition,
        /// Table name.
        table: String,
        /// Entry key.
        key: String,
    },
}

/// An ordered set of store operations submitted atomically.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    ops: Vec<TxOp>,
}

impl Transaction {
    /// Creates an empty transaction.
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Returns true if no operations were queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Consumes the transaction, yielding its operations.
    pub fn into_ops(self) -> Vec<TxOp> {
        self.ops
    }

    /// Queues a put of a raw value.
    pub fn put(&mut self, partition: Partition, table: &str, key: &str, value: Value) {
        self.ops.push(TxOp::Put {
            partition,
            table: table.to_string(),
            key: key.to_string(),
            value,
        });
    }

    /// Queues a merge of a raw value.
    pub fn merge(&mut self, partition: Partition, table: &str, key: &str, value: Value) {
        self.ops.push(TxOp::Merge {
            partition,
            table: table.to_string(),
            key: key.to_string(),
            value,
        });
    }

    /// Queues a delete.
    pub fn delete(&mut self, partition: Partition, table: &str, key: &str) {
        self.ops.push(TxOp::Delete {
            partition,
            table: table.to_string(),
            key: key.to_string(),
        });
    }

    /// Queues a put of a serializable value.
    pub fn put_json<T: Serialize>(
        &mut self,
        partition: Partition,
        table: &str,
        key: &str,
        value: &T,
    ) -> IfmResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| IfmError::internal(format!("serialize {}/{}: {}", table, key, e)))?;
        self.put(partition, table, key, value);
        Ok(())
    }

    /// Queues a merge of a serializable value.
    pub fn merge_json<T: Serialize>(
        &mut self,
        partition: Partition,
        table: &str,
        key: &str,
        value: &T,
    ) -> IfmResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| IfmError::internal(format!("serialize {}/{}: {}", table, key, e)))?;
        self.merge(partition, table, key, value);
        Ok(())
    }
}

/// Transactional config/operational store.
///
/// Read-your-own-writes consistency within a submitted transaction is the
/// store's responsibility; callers read first, queue ops, then submit.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Reads one entry.
    async fn read(&self, partition: Partition, table: &str, key: &str)
        -> IfmResult<Option<Value>>;

    /// Lists the keys of a table.
    async fn read_keys(&self, partition: Partition, table: &str) -> IfmResult<Vec<String>>;

    /// Applies a transaction atomically: either every op lands or none do.
    async fn submit(&self, tx: Transaction) -> IfmResult<()>;
}

/// Typed read helpers over any [`DataStore`].
#[async_trait]
pub trait DataStoreExt: DataStore {
    /// Reads and deserializes one entry.
    async fn read_json<T: DeserializeOwned + Send>(
        &self,
        partition: Partition,
        table: &str,
        key: &str,
    ) -> IfmResult<Option<T>> {
        match self.read(partition, table, key).await? {
            Some(value) => {
                let parsed = serde_json::from_value(value).map_err(|e| {
                    IfmError::datastore("read", format!("decode {}/{}: {}", table, key, e))
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }
}

impl<S: DataStore + ?Sized> DataStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_names() {
        assert_eq!(Partition::Config.name(), "CONFIG");
        assert_eq!(Partition::Operational.name(), "OPERATIONAL");
    }

    #[test]
    fn test_transaction_builds_ops_in_order() {
        let mut tx = Transaction::new();
        assert!(tx.is_empty());

        tx.put(
            Partition::Config,
            tables::INTERFACES,
            "if1",
            serde_json::json!({"enabled": true}),
        );
        tx.delete(Partition::Operational, tables::INTERFACES_STATE, "if1");

        assert_eq!(tx.len(), 2);
        let ops = tx.into_ops();
        assert!(matches!(ops[0], TxOp::Put { .. }));
        assert!(matches!(ops[1], TxOp::Delete { .. }));
    }

    #[test]
    fn test_put_json_serializes() {
        #[derive(serde::Serialize)]
        struct Entry {
            tag: u32,
        }

        let mut tx = Transaction::new();
        tx.put_json(
            Partition::Operational,
            tables::IF_LPORT_MAP,
            "if1",
            &Entry { tag: 7 },
        )
        .unwrap();

        match &tx.into_ops()[0] {
            TxOp::Put { value, .. } => assert_eq!(value["tag"], 7),
            other => panic!("unexpected op: {:?}", other),
        }
    }
}
