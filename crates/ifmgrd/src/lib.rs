//! ifmgrd - interface reconciliation engine for the ifmgr SDN plugin.
//!
//! Reconciles the declared interface configuration model (VLAN interfaces,
//! tunnels, trunk/member relationships) against live switch state reported by
//! the southbound, and programs ingress-dispatch flows and service-binding
//! metadata so traffic is dispatched per logical interface.
//!
//! # Architecture
//!
//! ```text
//! [CONFIG changes] ──┐
//! [port events] ─────┼──> [InterfaceOrch] ──> flows / service bindings
//! [liveness cbs] ────┘          │
//!                               ↓
//!                   [CONFIG / OPERATIONAL store]
//! ```
//!
//! Three independent event sources feed the engine; none of them is ordered
//! against the others. Every transition re-derives its target state from the
//! currently visible configuration, switch state and indexes, so applying an
//! event twice, or two racing events in either order, converges to the same
//! operational state. Failed transitions are not retried in place — the next
//! relevant event re-runs the same derivation.

pub mod flow;
pub mod idpool;
pub mod lifecycle;
pub mod orch;
pub mod southbound;

pub use flow::{FlowEntity, FlowInstruction, FlowMatch, FlowProgrammer, FlowRef};
pub use idpool::{IdAllocator, MemIdAllocator, IF_INDEX_POOL};
pub use lifecycle::InterfaceLifecycle;
pub use orch::{InterfaceOrch, InterfaceOrchStats};
pub use southbound::{derive_oper_status, FlowCapablePort};
