//! Identifier newtypes for datapath nodes, ports and lport tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a datapath node (a physical or virtual switch instance).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct DpnId(pub u64);

impl DpnId {
    /// Creates a datapath id from its raw value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DpnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DpnId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The lport tag: a small stable integer allocated per logical interface,
/// written into packet metadata for table dispatch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct LportTag(pub u32);

impl LportTag {
    /// Creates a tag from its raw value.
    pub const fn new(tag: u32) -> Self {
        Self(tag)
    }

    /// Returns the raw tag value.
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for LportTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LportTag {
    fn from(tag: u32) -> Self {
        Self(tag)
    }
}

/// Identifier of a datapath port (a flow-capable node connector).
///
/// Rendered in the southbound `openflow:<dpn>:<port>` form, which is also
/// what lands in an interface state's lower-layer reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId {
    /// The datapath node the port belongs to.
    pub dpn: DpnId,
    /// The port number on that datapath.
    pub port_no: u32,
}

impl PortId {
    /// Creates a port id.
    pub const fn new(dpn: DpnId, port_no: u32) -> Self {
        Self { dpn, port_no }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "openflow:{}:{}", self.dpn, self.port_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dpn_id_display() {
        assert_eq!(DpnId::new(7).to_string(), "7");
        assert_eq!(DpnId::from(42).value(), 42);
    }

    #[test]
    fn test_port_id_display() {
        let port = PortId::new(DpnId::new(1), 2);
        assert_eq!(port.to_string(), "openflow:1:2");
    }

    #[test]
    fn test_lport_tag_ordering() {
        assert!(LportTag::new(1) < LportTag::new(2));
        assert_eq!(LportTag::new(5).value(), 5);
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&DpnId::new(9)).unwrap();
        assert_eq!(json, "9");
        let tag: LportTag = serde_json::from_str("17").unwrap();
        assert_eq!(tag, LportTag::new(17));
    }
}
