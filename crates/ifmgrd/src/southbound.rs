//! Southbound port event types and status derivation.

use serde::{Deserialize, Serialize};

use ifm_types::{OperStatus, PortId};

/// A flow-capable datapath port as reported by the southbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCapablePort {
    /// Port name on the switch.
    pub name: String,
    /// Datapath port identifier.
    pub port: PortId,
    /// Hardware address, when reported.
    pub mac: Option<String>,
    /// Link-live flag from the port state.
    pub live: bool,
    /// Blocked flag from the port state.
    pub blocked: bool,
}

impl FlowCapablePort {
    /// Creates a live, unblocked port.
    pub fn up(name: impl Into<String>, port: PortId) -> Self {
        Self {
            name: name.into(),
            port,
            mac: None,
            live: true,
            blocked: false,
        }
    }

    /// Sets the hardware address.
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    /// Marks the port link-down.
    pub fn down(mut self) -> Self {
        self.live = false;
        self
    }
}

/// Derives an interface's effective oper status from its admin flag and the
/// live port flags: Down when admin-disabled, else Up iff live and not
/// blocked.
pub fn derive_oper_status(admin_enabled: bool, port: &FlowCapablePort) -> OperStatus {
    if !admin_enabled {
        return OperStatus::Down;
    }
    if port.live && !port.blocked {
        OperStatus::Up
    } else {
        OperStatus::Down
    }
}
