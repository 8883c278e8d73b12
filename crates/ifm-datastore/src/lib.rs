//! Transactional key-path store contract for ifmgr.
//!
//! The reconciliation engine issues transactions against a store with two
//! logical partitions: CONFIG (user intent) and OPERATIONAL (derived and
//! observed state). This crate defines the consumed contract — it does not
//! implement a production datastore. [`MemDataStore`] is the in-memory
//! backend used by the daemon scaffold and by every test.
//!
//! # Semantics
//!
//! - `put` creates or wholly replaces a keyed entry
//! - `merge` deep-merges object fields into an existing entry, creating the
//!   entry (and any missing parents) when absent
//! - `delete` removes an entry if present; deleting an absent entry is not
//!   an error
//! - a [`Transaction`] is applied atomically on submit: all ops or none

mod mem;
mod store;

pub use mem::MemDataStore;
pub use store::{tables, DataStore, DataStoreExt, Partition, Transaction, TxOp};
