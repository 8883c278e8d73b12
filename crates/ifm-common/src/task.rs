//! Per-event processing status classification.

use crate::IfmError;

/// Result of processing a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Event applied successfully.
    Success,
    /// Event was a no-op (already applied, nothing to do).
    Ignore,
    /// Event failed transiently; the next relevant event re-derives it.
    Deferred,
    /// Event failed permanently (invalid input, structural conflict).
    Failed,
}

impl TaskStatus {
    /// Returns true if the event is considered handled.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Ignore)
    }

    /// Returns true if a later event is expected to heal this one.
    pub fn is_deferred(&self) -> bool {
        matches!(self, TaskStatus::Deferred)
    }
}

/// Extension trait mapping handler results onto a [`TaskStatus`].
pub trait TaskStatusExt {
    /// Classifies this result.
    fn to_status(&self) -> TaskStatus;
}

impl<T> TaskStatusExt for Result<T, IfmError> {
    fn to_status(&self) -> TaskStatus {
        match self {
            Ok(_) => TaskStatus::Success,
            Err(e) if e.is_retryable() => TaskStatus::Deferred,
            Err(_) => TaskStatus::Failed,
        }
    }
}
