//! Interface configuration model.
//!
//! An interface's optional facets (VLAN mode, tunnel endpoints, monitoring)
//! are resolved once at ingestion into the [`InterfaceKind`] sum type, so the
//! reconciliation engine never chases nullable augmentations.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::DpnId;

/// VLAN facet of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VlanMode {
    /// An 802.1Q trunk port. At most one trunk may bind under a parent.
    Trunk,
    /// A per-VLAN logical member of a trunk.
    TrunkMember {
        /// The VLAN id carried by this member.
        vlan_id: u16,
    },
}

/// Tunnel encapsulation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunnelKind {
    /// VXLAN encapsulation.
    Vxlan,
    /// Plain GRE encapsulation.
    Gre,
    /// MPLS-over-GRE; ingress traffic dispatches to the LFIB.
    MplsOverGre,
    /// A logical tunnel group with no physical ingress point of its own.
    LogicalGroup,
}

impl TunnelKind {
    /// Returns the kind name as used in logs and the dpn-interface index.
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelKind::Vxlan => "vxlan",
            TunnelKind::Gre => "gre",
            TunnelKind::MplsOverGre => "mpls-over-gre",
            TunnelKind::LogicalGroup => "logical-group",
        }
    }
}

/// Liveness monitoring protocol for tunnel endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitorProtocol {
    /// Link-layer discovery probes.
    Lldp,
    /// Bidirectional forwarding detection.
    Bfd,
}

impl MonitorProtocol {
    /// Returns the protocol name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorProtocol::Lldp => "lldp",
            MonitorProtocol::Bfd => "bfd",
        }
    }
}

/// Tunnel facet of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Encapsulation kind.
    pub kind: TunnelKind,
    /// Local endpoint address.
    pub src_ip: IpAddr,
    /// Remote endpoint address.
    pub dst_ip: IpAddr,
    /// The datapath node the tunnel terminates on.
    pub dpn: DpnId,
    /// True for tunnels between managed datapaths (engine-sourced).
    pub internal: bool,
    /// Whether endpoint liveness monitoring is requested.
    pub monitor_enabled: bool,
    /// Requested monitoring protocol.
    pub monitor_protocol: MonitorProtocol,
    /// Probe interval in milliseconds.
    pub monitor_interval_ms: u32,
}

impl TunnelConfig {
    /// Creates a tunnel config with monitoring disabled.
    pub fn new(kind: TunnelKind, src_ip: IpAddr, dst_ip: IpAddr, dpn: DpnId) -> Self {
        Self {
            kind,
            src_ip,
            dst_ip,
            dpn,
            internal: false,
            monitor_enabled: false,
            monitor_protocol: MonitorProtocol::Lldp,
            monitor_interval_ms: 10_000,
        }
    }

    /// Marks the tunnel as internal (between managed datapaths).
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Enables monitoring with the given protocol.
    pub fn with_monitoring(mut self, protocol: MonitorProtocol) -> Self {
        self.monitor_enabled = true;
        self.monitor_protocol = protocol;
        self
    }

    /// Sets the probe interval.
    pub fn with_interval_ms(mut self, interval_ms: u32) -> Self {
        self.monitor_interval_ms = interval_ms;
        self
    }
}

/// Membership mode of a child interface under its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildMode {
    /// Exclusive trunk consumer of the parent port.
    Trunk,
    /// Non-exclusive member (per-VLAN logical sub-interface or similar).
    TrunkMember,
}

impl ChildMode {
    /// Returns the mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildMode::Trunk => "trunk",
            ChildMode::TrunkMember => "trunk-member",
        }
    }
}

/// Kind-specific facet of an interface, resolved at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceKind {
    /// VLAN interface (trunk or trunk member) riding on a parent port.
    Vlan(VlanMode),
    /// Tunnel interface with endpoint and monitoring attributes.
    Tunnel(Box<TunnelConfig>),
    /// No facet; the "Other" interface type.
    Plain,
}

impl InterfaceKind {
    /// Returns the kind name as used in logs and the dpn-interface index.
    pub fn name(&self) -> &'static str {
        match self {
            InterfaceKind::Vlan(VlanMode::Trunk) => "vlan-trunk",
            InterfaceKind::Vlan(VlanMode::TrunkMember { .. }) => "vlan-trunk-member",
            InterfaceKind::Tunnel(t) => t.kind.as_str(),
            InterfaceKind::Plain => "other",
        }
    }
}

/// Declared configuration of a logical interface (CONFIG partition).
///
/// Created and deleted by user configuration; read-only to the
/// reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface name; the identity of the interface everywhere.
    pub name: String,
    /// Administrative enable flag.
    pub enabled: bool,
    /// Free-form description.
    pub description: Option<String>,
    /// Parent interface (e.g. the physical port a VLAN rides on).
    pub parent: Option<String>,
    /// Kind-specific facet.
    pub kind: InterfaceKind,
}

impl InterfaceConfig {
    /// Creates an admin-enabled config of the given kind.
    pub fn new(name: impl Into<String>, kind: InterfaceKind) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            description: None,
            parent: None,
            kind,
        }
    }

    /// Creates a VLAN trunk config on the given parent port.
    pub fn vlan_trunk(name: impl Into<String>, parent: impl Into<String>) -> Self {
        let mut cfg = Self::new(name, InterfaceKind::Vlan(VlanMode::Trunk));
        cfg.parent = Some(parent.into());
        cfg
    }

    /// Creates a VLAN trunk-member config on the given parent port.
    pub fn vlan_member(name: impl Into<String>, parent: impl Into<String>, vlan_id: u16) -> Self {
        let mut cfg = Self::new(name, InterfaceKind::Vlan(VlanMode::TrunkMember { vlan_id }));
        cfg.parent = Some(parent.into());
        cfg
    }

    /// Creates a tunnel config.
    pub fn tunnel(name: impl Into<String>, tunnel: TunnelConfig) -> Self {
        Self::new(name, InterfaceKind::Tunnel(Box::new(tunnel)))
    }

    /// Sets the admin-enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the tunnel facet, if this is a tunnel interface.
    pub fn tunnel_config(&self) -> Option<&TunnelConfig> {
        match &self.kind {
            InterfaceKind::Tunnel(t) => Some(t),
            _ => None,
        }
    }

    /// Returns true for tunnel interfaces.
    pub fn is_tunnel(&self) -> bool {
        matches!(self.kind, InterfaceKind::Tunnel(_))
    }

    /// Returns the membership mode this interface takes under its parent.
    ///
    /// `None` when the interface has no parent binding.
    pub fn child_mode(&self) -> Option<ChildMode> {
        self.parent.as_ref()?;
        Some(match &self.kind {
            InterfaceKind::Vlan(VlanMode::Trunk) => ChildMode::Trunk,
            _ => ChildMode::TrunkMember,
        })
    }
}
