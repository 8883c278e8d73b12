//! Shared domain types for the ifmgr interface-manager plugin.
//!
//! This crate defines the data model every other ifmgr crate speaks:
//! datapath/port identifiers, the lport tag, the interface configuration
//! model (a sum type resolved once at ingestion), the derived operational
//! state, and the bridge bookkeeping entries.
//!
//! The types here are plain data: all reconciliation behavior lives in
//! `ifmgrd`, all persistence in `ifm-datastore`/`ifm-cache`.

mod bridge;
mod ids;
mod interface;
mod state;

pub use bridge::{BridgeEntry, BridgeRef, BridgeRefEntry};
pub use ids::{DpnId, LportTag, PortId};
pub use interface::{
    ChildMode, InterfaceConfig, InterfaceKind, MonitorProtocol, TunnelConfig, TunnelKind, VlanMode,
};
pub use state::{AdminStatus, InterfaceState, OperStatus, StatusParseError};
