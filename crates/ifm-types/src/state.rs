//! Derived operational state of a logical interface.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{LportTag, PortId};

/// Error returned when parsing a status string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown status value: {0}")]
pub struct StatusParseError(pub String);

/// Operational status of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperStatus {
    /// Interface is forwarding.
    Up,
    /// Interface is not forwarding.
    Down,
    /// Status cannot be determined (discontinuity).
    Unknown,
}

impl OperStatus {
    /// Returns the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperStatus::Up => "up",
            OperStatus::Down => "down",
            OperStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(OperStatus::Up),
            "down" => Ok(OperStatus::Down),
            "unknown" => Ok(OperStatus::Unknown),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// Administrative status mirrored from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdminStatus {
    /// Admin-enabled.
    Enabled,
    /// Admin-disabled.
    Disabled,
}

impl AdminStatus {
    /// Returns the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminStatus::Enabled => "enabled",
            AdminStatus::Disabled => "disabled",
        }
    }

    /// Maps a config enable flag to the admin status.
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            AdminStatus::Enabled
        } else {
            AdminStatus::Disabled
        }
    }
}

impl fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational state of a logical interface (OPERATIONAL partition).
///
/// Created either eagerly on config-add (to reserve the lport tag) or when
/// the engine first learns a switch-port binding; deleted when the config is
/// removed or the underlying port disappears for an externally-sourced
/// interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceState {
    /// Interface name.
    pub name: String,
    /// Allocated lport tag; stable while this state exists.
    pub lport_tag: LportTag,
    /// Derived operational status.
    pub oper_status: OperStatus,
    /// Mirror of the config admin flag.
    pub admin_status: AdminStatus,
    /// Hardware address, once a port binding is known.
    pub phys_address: Option<String>,
    /// The datapath port this interface is bound to, if any.
    pub lower_layer_if: Option<PortId>,
    /// Last time the counters/status basis was reset.
    pub discontinuity_time: DateTime<Utc>,
}

impl InterfaceState {
    /// Creates a fresh state entry with no port binding and status Down.
    pub fn reserved(name: impl Into<String>, lport_tag: LportTag, admin: AdminStatus) -> Self {
        Self {
            name: name.into(),
            lport_tag,
            oper_status: OperStatus::Down,
            admin_status: admin,
            phys_address: None,
            lower_layer_if: None,
            discontinuity_time: Utc::now(),
        }
    }

    /// Sets the port binding.
    pub fn with_port(mut self, port: PortId) -> Self {
        self.lower_layer_if = Some(port);
        self
    }

    /// Sets the hardware address.
    pub fn with_phys_address(mut self, mac: impl Into<String>) -> Self {
        self.phys_address = Some(mac.into());
        self
    }

    /// Sets the operational status.
    pub fn with_oper_status(mut self, status: OperStatus) -> Self {
        self.oper_status = status;
        self
    }

    /// Returns true once a datapath port binding is recorded.
    pub fn is_bound(&self) -> bool {
        self.lower_layer_if.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DpnId;

    #[test]
    fn test_oper_status_parse() {
        assert_eq!("up".parse::<OperStatus>().unwrap(), OperStatus::Up);
        assert_eq!("down".parse::<OperStatus>().unwrap(), OperStatus::Down);
        assert!("flapping".parse::<OperStatus>().is_err());
    }

    #[test]
    fn test_admin_status_from_enabled() {
        assert_eq!(AdminStatus::from_enabled(true), AdminStatus::Enabled);
        assert_eq!(AdminStatus::from_enabled(false), AdminStatus::Disabled);
    }

    #[test]
    fn test_reserved_state() {
        let state = InterfaceState::reserved("vlan1", LportTag::new(4), AdminStatus::Enabled);
        assert_eq!(state.oper_status, OperStatus::Down);
        assert!(!state.is_bound());
        assert!(state.phys_address.is_none());
    }

    #[test]
    fn test_bound_state() {
        let port = PortId::new(DpnId::new(1), 3);
        let state = InterfaceState::reserved("eth0", LportTag::new(2), AdminStatus::Enabled)
            .with_port(port)
            .with_phys_address("0a:0b:0c:0d:0e:0f")
            .with_oper_status(OperStatus::Up);

        assert!(state.is_bound());
        assert_eq!(state.lower_layer_if, Some(port));
        assert_eq!(state.oper_status, OperStatus::Up);
    }
}
