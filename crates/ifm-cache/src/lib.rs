//! Read-through cached bidirectional indexes over the ifmgr datastore.
//!
//! Each index pairs an in-process concurrent map with a persisted table.
//! The datastore is always the source of truth: a cache miss costs one read,
//! staleness costs nothing worse, because every cache write is gated on the
//! success of the corresponding persisted write. Mutators build a single
//! transaction, submit it, and only then touch the cache — a failed submit
//! leaves both sides as they were.
//!
//! List-valued entries (children under a parent, monitor ids per interface,
//! interfaces per dpn) are containment-checked before appending, so re-adding
//! an existing relation neither duplicates the entry nor performs a
//! redundant write. Removing the last element deletes the containing key.

mod bridge;
mod dpn_ifaces;
mod liveness;
mod lport;
mod monitor_ids;
mod parent_child;

pub use bridge::BridgeIndex;
pub use dpn_ifaces::{DpnInterfaceEntry, DpnInterfaceIndex};
pub use liveness::LivenessCache;
pub use lport::LportIndex;
pub use monitor_ids::MonitorIndex;
pub use parent_child::{ChildEntry, ParentChildIndex};
