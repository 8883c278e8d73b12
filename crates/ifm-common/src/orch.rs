//! Base trait for event-driven listener components.

use async_trait::async_trait;

/// Base trait for components that reconcile queued events.
///
/// Each component implements this trait to participate in the daemon's
/// event loop. Listeners push events into the component's queues from their
/// own tasks; the loop calls `do_task()` whenever work is pending.
///
/// # Ordering
///
/// No ordering is guaranteed between components or between event sources.
/// Implementations must keep every transition idempotent and re-derivable
/// from currently-visible state.
#[async_trait]
pub trait Orch: Send + Sync {
    /// Returns the name of this component (for logging and debugging).
    fn name(&self) -> &str;

    /// Drains pending events and applies them.
    async fn do_task(&mut self);

    /// Returns true if this component has pending work.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps pending work for debugging.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }
}
