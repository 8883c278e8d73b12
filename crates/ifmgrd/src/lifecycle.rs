//! Interface lifecycle view derived from observed operational state.

use ifm_types::{InterfaceState, OperStatus};

/// The lifecycle position of a logical interface.
///
/// Never stored: always derived from the current `InterfaceState`, so the
/// view cannot drift from the data it summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceLifecycle {
    /// No operational state exists.
    NoState,
    /// Lport tag reserved, no switch binding yet.
    LportReserved,
    /// Bound to a datapath port; port or admin is down.
    BoundDown,
    /// Bound, admin-enabled, port live.
    BoundUp,
}

impl InterfaceLifecycle {
    /// Derives the lifecycle position from the current state entry.
    pub fn of(state: Option<&InterfaceState>) -> Self {
        match state {
            None => InterfaceLifecycle::NoState,
            Some(s) if !s.is_bound() => InterfaceLifecycle::LportReserved,
            Some(s) if s.oper_status == OperStatus::Up => InterfaceLifecycle::BoundUp,
            Some(_) => InterfaceLifecycle::BoundDown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifm_types::{AdminStatus, DpnId, LportTag, PortId};

    #[test]
    fn test_lifecycle_derivation() {
        assert_eq!(InterfaceLifecycle::of(None), InterfaceLifecycle::NoState);

        let reserved = InterfaceState::reserved("if1", LportTag::new(1), AdminStatus::Enabled);
        assert_eq!(
            InterfaceLifecycle::of(Some(&reserved)),
            InterfaceLifecycle::LportReserved
        );

        let bound_down = reserved.clone().with_port(PortId::new(DpnId::new(1), 2));
        assert_eq!(
            InterfaceLifecycle::of(Some(&bound_down)),
            InterfaceLifecycle::BoundDown
        );

        let bound_up = bound_down.with_oper_status(OperStatus::Up);
        assert_eq!(
            InterfaceLifecycle::of(Some(&bound_up)),
            InterfaceLifecycle::BoundUp
        );
    }
}
