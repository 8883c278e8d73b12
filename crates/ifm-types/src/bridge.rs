//! Bridge bookkeeping entries keyed by datapath node.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DpnId;

/// Instance identifier of a live southbound bridge node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BridgeRef(pub String);

impl BridgeRef {
    /// Creates a bridge reference from its instance-identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BridgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pointer to the live bridge node while the switch is connected
/// (OPERATIONAL partition; removed on disconnect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRefEntry {
    /// The datapath node.
    pub dpn: DpnId,
    /// Reference to the connected bridge node.
    pub bridge: BridgeRef,
}

impl BridgeRefEntry {
    /// Creates a bridge-ref entry.
    pub fn new(dpn: DpnId, bridge: BridgeRef) -> Self {
        Self { dpn, bridge }
    }
}

/// Durable copy of the bridge pointer (CONFIG partition; survives
/// disconnects so bridge-interface entries can be replayed on reconnect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEntry {
    /// The datapath node.
    pub dpn: DpnId,
    /// Last known reference to the bridge node.
    pub bridge: BridgeRef,
}

impl BridgeEntry {
    /// Creates a bridge entry.
    pub fn new(dpn: DpnId, bridge: BridgeRef) -> Self {
        Self { dpn, bridge }
    }
}
