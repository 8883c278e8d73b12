//! Tunnel liveness-monitoring adapter.
//!
//! Owns the lifecycle of external liveness-probe profiles (threshold,
//! interval, window, protocol) and per-tunnel probe sessions, and keeps the
//! monitor-id <-> interface mapping current so async liveness callbacks can
//! be routed back to their interface.
//!
//! The external monitor service is consumed through [`AlivenessClient`];
//! every RPC returns a result-with-errors wrapper whose success flag must be
//! checked before the payload is read. RPC failures are absorbed here —
//! logged, surfaced as sentinel values — and healed by the next
//! reconciliation pass rather than retried in place.

mod client;
mod mgr;

pub use client::{AlivenessClient, MonitorProfileParams, MonitorStartRequest, RpcResult};
pub use mgr::{
    MonitorMgr, MonitorStats, DEFAULT_MONITOR_THRESHOLD, DEFAULT_MONITOR_WINDOW, NO_PROFILE,
};
