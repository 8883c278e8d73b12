//! Ingress-classification flow policy and the southbound programmer contract.
//!
//! The engine describes flows declaratively; wire-format encoding belongs to
//! the southbound programmer behind [`FlowProgrammer`]. Flow ids are
//! deterministic (`{dpn}{table}{interface}`) so installs are upserts and
//! withdrawals are remove-if-present.

use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;

use ifm_common::IfmResult;
use ifm_types::{DpnId, InterfaceKind, LportTag, PortId, TunnelKind};

/// Ingress classification table; every per-interface dispatch flow lands here.
pub const INGRESS_TABLE: u8 = 0;

/// Label forwarding table for MPLS-over-GRE traffic.
pub const LFIB_TABLE: u8 = 20;

/// Dispatch table for traffic arriving on internal tunnels.
pub const INTERNAL_TUNNEL_TABLE: u8 = 36;

/// DHCP table for traffic arriving on external tunnels.
pub const DHCP_EXTERNAL_TUNNEL_TABLE: u8 = 18;

/// Dispatch table for VLAN and plain interfaces.
pub const LPORT_DISPATCHER_TABLE: u8 = 17;

/// Priority of the per-interface ingress flows.
pub const INGRESS_FLOW_PRIORITY: u16 = 5;

/// Deterministic flow identifier: dpn + table + interface name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowRef {
    dpn: DpnId,
    table_id: u8,
    interface: String,
}

impl FlowRef {
    /// Creates the flow id for an interface's flow in a table.
    pub fn new(dpn: DpnId, table_id: u8, interface: impl Into<String>) -> Self {
        Self {
            dpn,
            table_id,
            interface: interface.into(),
        }
    }
}

impl fmt::Display for FlowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.dpn, self.table_id, self.interface)
    }
}

/// Declarative match field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowMatch {
    /// Match the physical ingress port.
    InPort(PortId),
    /// Match the tunnel source endpoint.
    TunnelSrc(IpAddr),
    /// Match the tunnel destination endpoint.
    TunnelDst(IpAddr),
}

/// Declarative instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowInstruction {
    /// Write the lport tag into packet metadata.
    WriteLportTag(LportTag),
    /// Continue processing in another table.
    GotoTable(u8),
}

/// A declarative flow entity handed to the southbound programmer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEntity {
    /// Target datapath.
    pub dpn: DpnId,
    /// Table the flow is installed into.
    pub table_id: u8,
    /// Deterministic flow id.
    pub flow_ref: FlowRef,
    /// Flow priority.
    pub priority: u16,
    /// Match fields.
    pub matches: Vec<FlowMatch>,
    /// Instructions.
    pub instructions: Vec<FlowInstruction>,
}

/// Southbound flow programmer and egress service binder.
///
/// Flow ids are deterministic, so `add_flow` replaces any existing flow with
/// the same id and `remove_flow` is remove-if-present.
#[async_trait]
pub trait FlowProgrammer: Send + Sync {
    /// Installs (or replaces) a flow.
    async fn add_flow(&self, flow: &FlowEntity) -> IfmResult<()>;

    /// Removes a flow if present.
    async fn remove_flow(&self, dpn: DpnId, flow_ref: &FlowRef, table_id: u8) -> IfmResult<()>;

    /// Binds the default egress dispatcher service for an interface.
    async fn bind_default_egress(&self, interface: &str, tag: LportTag) -> IfmResult<()>;

    /// Unbinds the default egress dispatcher service if bound.
    async fn unbind_default_egress(&self, interface: &str) -> IfmResult<()>;
}

/// Returns the table ingress traffic jumps to for an interface kind.
fn dispatch_table(kind: &InterfaceKind) -> Option<u8> {
    match kind {
        InterfaceKind::Tunnel(tunnel) => match tunnel.kind {
            // No physical ingress point exists for a logical group
            TunnelKind::LogicalGroup => None,
            TunnelKind::MplsOverGre => Some(LFIB_TABLE),
            _ if tunnel.internal => Some(INTERNAL_TUNNEL_TABLE),
            _ => Some(DHCP_EXTERNAL_TUNNEL_TABLE),
        },
        _ => Some(LPORT_DISPATCHER_TABLE),
    }
}

/// Builds the ingress-classification flow for an interface bound to a port.
///
/// Returns `None` for kinds that take no ingress flow (logical tunnel
/// groups). The flow matches the physical in-port — plus tunnel endpoint
/// addresses for tunnel kinds — writes the lport tag into metadata and jumps
/// to the kind's dispatch table.
pub fn ingress_flow_for(
    kind: &InterfaceKind,
    interface: &str,
    port: PortId,
    tag: LportTag,
) -> Option<FlowEntity> {
    let goto = dispatch_table(kind)?;

    let mut matches = vec![FlowMatch::InPort(port)];
    if let InterfaceKind::Tunnel(tunnel) = kind {
        matches.push(FlowMatch::TunnelSrc(tunnel.src_ip));
        matches.push(FlowMatch::TunnelDst(tunnel.dst_ip));
    }

    Some(FlowEntity {
        dpn: port.dpn,
        table_id: INGRESS_TABLE,
        flow_ref: FlowRef::new(port.dpn, INGRESS_TABLE, interface),
        priority: INGRESS_FLOW_PRIORITY,
        matches,
        instructions: vec![
            FlowInstruction::WriteLportTag(tag),
            FlowInstruction::GotoTable(goto),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use ifm_types::{TunnelConfig, VlanMode};

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn tunnel_kind(kind: TunnelKind, internal: bool) -> InterfaceKind {
        let mut tunnel = TunnelConfig::new(kind, ip(1), ip(2), DpnId::new(1));
        tunnel.internal = internal;
        InterfaceKind::Tunnel(Box::new(tunnel))
    }

    #[test]
    fn test_flow_ref_format() {
        let flow_ref = FlowRef::new(DpnId::new(1), INGRESS_TABLE, "vlan1");
        assert_eq!(flow_ref.to_string(), "10vlan1");
    }

    #[test]
    fn test_vlan_flow_targets_dispatcher() {
        let port = PortId::new(DpnId::new(1), 2);
        let flow = ingress_flow_for(
            &InterfaceKind::Vlan(VlanMode::Trunk),
            "trunk0",
            port,
            LportTag::new(4),
        )
        .unwrap();

        assert_eq!(flow.table_id, INGRESS_TABLE);
        assert_eq!(flow.matches, vec![FlowMatch::InPort(port)]);
        assert!(flow
            .instructions
            .contains(&FlowInstruction::WriteLportTag(LportTag::new(4))));
        assert!(flow
            .instructions
            .contains(&FlowInstruction::GotoTable(LPORT_DISPATCHER_TABLE)));
    }

    #[test]
    fn test_tunnel_flows_pick_table_by_kind() {
        let port = PortId::new(DpnId::new(1), 2);
        let tag = LportTag::new(4);

        let mpls = ingress_flow_for(
            &tunnel_kind(TunnelKind::MplsOverGre, false),
            "tun-mpls",
            port,
            tag,
        )
        .unwrap();
        assert!(mpls
            .instructions
            .contains(&FlowInstruction::GotoTable(LFIB_TABLE)));

        let internal =
            ingress_flow_for(&tunnel_kind(TunnelKind::Vxlan, true), "tun-int", port, tag).unwrap();
        assert!(internal
            .instructions
            .contains(&FlowInstruction::GotoTable(INTERNAL_TUNNEL_TABLE)));

        let external =
            ingress_flow_for(&tunnel_kind(TunnelKind::Vxlan, false), "tun-ext", port, tag).unwrap();
        assert!(external
            .instructions
            .contains(&FlowInstruction::GotoTable(DHCP_EXTERNAL_TUNNEL_TABLE)));
    }

    #[test]
    fn test_tunnel_flow_matches_endpoints() {
        let port = PortId::new(DpnId::new(1), 2);
        let flow = ingress_flow_for(
            &tunnel_kind(TunnelKind::Gre, true),
            "tun0",
            port,
            LportTag::new(4),
        )
        .unwrap();

        assert!(flow.matches.contains(&FlowMatch::TunnelSrc(ip(1))));
        assert!(flow.matches.contains(&FlowMatch::TunnelDst(ip(2))));
    }

    #[test]
    fn test_logical_group_takes_no_flow() {
        let flow = ingress_flow_for(
            &tunnel_kind(TunnelKind::LogicalGroup, true),
            "tun-group",
            PortId::new(DpnId::new(1), 2),
            LportTag::new(4),
        );
        assert!(flow.is_none());
    }
}
