//! Common infrastructure for ifmgr components.
//!
//! This crate provides the shared plumbing every ifmgr crate builds on:
//!
//! - [`error`]: the crate-wide error type and result alias
//! - [`task`]: per-event processing status classification
//! - [`orch`]: the base trait for event-driven listener components
//! - [`event`]: the per-key coalescing event queue fed by listeners
//!
//! # Architecture
//!
//! Components follow the listener pattern: each input source (user CONFIG
//! changes, southbound OPERATIONAL changes, liveness callbacks) delivers
//! events into an [`event::EventQueue`]; the owning [`orch::Orch`] drains its
//! queues in `do_task()` and applies each event idempotently. There is no
//! global serialization lock — correctness comes from every handler
//! re-deriving its target state from currently-visible inputs.

pub mod error;
pub mod event;
pub mod orch;
pub mod task;

pub use error::{IfmError, IfmResult};
pub use event::{EventOp, EventQueue, KeyedEvent};
pub use orch::Orch;
pub use task::{TaskStatus, TaskStatusExt};
