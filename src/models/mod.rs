use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod design;
mod render;
mod topology;
mod validation;

pub use design::*;
pub use render::*;
pub use topology::*;
pub use validation::*;

/// Device role within a generated topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    Spine,
    Leaf,
    BorderLeaf,
    Edge,
    Firewall,
    Loadbalancer,
    Console,
    Oob,
}

impl DeviceRole {
    pub const ALL: &'static [DeviceRole] = &[
        DeviceRole::Spine,
        DeviceRole::Leaf,
        DeviceRole::BorderLeaf,
        DeviceRole::Edge,
        DeviceRole::Firewall,
        DeviceRole::Loadbalancer,
        DeviceRole::Console,
        DeviceRole::Oob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceRole::Spine => "spine",
            DeviceRole::Leaf => "leaf",
            DeviceRole::BorderLeaf => "border_leaf",
            DeviceRole::Edge => "edge",
            DeviceRole::Firewall => "firewall",
            DeviceRole::Loadbalancer => "loadbalancer",
            DeviceRole::Console => "console",
            DeviceRole::Oob => "oob",
        }
    }

    /// Roles that take part in the routed spine/leaf underlay
    pub fn is_fabric(&self) -> bool {
        matches!(self, DeviceRole::Spine | DeviceRole::Leaf | DeviceRole::BorderLeaf)
    }

    /// Leaf-like roles peer with spines in the underlay
    pub fn is_leaf_like(&self) -> bool {
        matches!(self, DeviceRole::Leaf | DeviceRole::BorderLeaf)
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        DeviceRole::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| format!("Unknown device role: {}", s))
    }
}

/// Platform identifier used to pick a vendor template (e.g. "arista_eos")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformId(pub String);

impl PlatformId {
    pub fn new(id: impl Into<String>) -> Self {
        PlatformId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlatformId {
    fn from(s: &str) -> Self {
        PlatformId(s.to_string())
    }
}

/// Canonical interface role values
pub mod interface_role {
    pub const LOOPBACK: &str = "loopback";
    /// Second loopback sourcing the EVPN overlay and the VXLAN tunnel endpoint
    pub const LOOPBACK_VTEP: &str = "loopback-vtep";
    pub const UPLINK: &str = "uplink";
    pub const DOWNLINK: &str = "downlink";
    pub const CUSTOMER: &str = "customer";
    pub const PEERING: &str = "peering";
    pub const MANAGEMENT: &str = "management";
    pub const CONSOLE: &str = "console";
    pub const OTHER: &str = "other";

    /// Canonical spelling of a declared role: trimmed, lower-case
    pub fn canonical(role: &str) -> String {
        role.trim().to_lowercase()
    }

    pub fn is_loopback(role: &str) -> bool {
        matches!(role, LOOPBACK | LOOPBACK_VTEP)
    }

    /// Roles whose interfaces must receive an address from a pool during expansion
    pub fn requires_address(role: &str) -> bool {
        matches!(role, LOOPBACK | LOOPBACK_VTEP | UPLINK | PEERING)
    }

    /// Roles addressed per cable: both ends share one point-to-point block
    pub fn is_link_addressed(role: &str) -> bool {
        matches!(role, UPLINK | PEERING)
    }

    /// Default prefix length handed to the allocator for an addressed role
    pub fn default_prefix_length(role: &str) -> u8 {
        match role {
            LOOPBACK | LOOPBACK_VTEP | MANAGEMENT => 32,
            _ => 31,
        }
    }

    /// Fabric roles are cabled with passive DAC, everything else with cat6
    pub fn is_fabric(role: &str) -> bool {
        matches!(role, UPLINK | DOWNLINK | PEERING)
    }
}

/// Canonical cable type and status values
pub mod cable_type {
    pub const DAC_PASSIVE: &str = "dac-passive";
    pub const CAT6: &str = "cat6";

    pub const CONNECTED: &str = "connected";
}

/// Canonical interface status values
pub mod interface_status {
    pub const ACTIVE: &str = "active";
}
