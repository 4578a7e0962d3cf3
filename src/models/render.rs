use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{DeviceRole, Endpoint, PlatformId};

/// RenderContext is the normalized, classified view of one device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderContext {
    pub hostname: String,
    pub role: Option<DeviceRole>,
    pub platform: Option<PlatformId>,
    pub description: Option<String>,
    pub comments: Option<String>,
    /// Every interface, natural-sorted by name
    pub interfaces: Vec<InterfaceView>,
    pub interface_roles: InterfaceRoles,
    /// Lower-cased interface name -> bare loopback address
    pub loopbacks: BTreeMap<String, String>,
    pub vlans: Vec<Vlan>,
    pub bgp_profiles: Vec<BgpProfile>,
    pub bgp: Option<BgpView>,
    pub ospf: Option<OspfConfig>,
    pub ospf_configs: Vec<OspfConfig>,
    /// OSPF area -> interface names in that area
    pub ospf_areas: BTreeMap<String, Vec<String>>,
    pub services: Vec<ServiceSummary>,
    pub service_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceView {
    pub name: String,
    pub role: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub mtu: Option<u32>,
    pub ip_addresses: Vec<String>,
    /// First address with mask, or empty
    pub ip_address: String,
    pub vlans: Vec<u16>,
    pub ospf_area: Option<String>,
    pub peer: Option<Endpoint>,
}

/// Interfaces grouped by semantic role. Buckets always serialize, empty when unused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRoles {
    pub loopback: Vec<InterfaceView>,
    pub uplink: Vec<InterfaceView>,
    pub downlink: Vec<InterfaceView>,
    pub customer: Vec<InterfaceView>,
    pub peering: Vec<InterfaceView>,
    pub other: Vec<InterfaceView>,
    pub all_physical: Vec<InterfaceView>,
    pub all_downlink: Vec<InterfaceView>,
}

impl InterfaceRoles {
    /// The six disjoint buckets, in fixed order
    pub fn buckets(&self) -> [(&'static str, &[InterfaceView]); 6] {
        [
            ("loopback", &self.loopback),
            ("uplink", &self.uplink),
            ("downlink", &self.downlink),
            ("customer", &self.customer),
            ("peering", &self.peering),
            ("other", &self.other),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vlan {
    pub vlan_id: u16,
    pub name: String,
    pub vni: u32,
    pub rd: String,
    pub segment_type: String,
    pub external_routing: bool,
}

/// BGP sessions sharing a peer group, with their common settings lifted onto the profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpProfile {
    pub profile: String,
    #[serde(flatten)]
    pub settings: BTreeMap<String, Value>,
    pub sessions: Vec<BgpNeighbor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpNeighbor {
    pub name: String,
    pub remote_ip: Option<String>,
    pub remote_as: Option<u32>,
    pub interface: Option<String>,
}

/// Flattened BGP view for templates that want one neighbor list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpView {
    pub local_as: Option<u32>,
    pub router_id: Option<String>,
    pub neighbors: Vec<BgpNeighbor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfConfig {
    pub name: String,
    pub process_id: u32,
    pub router_id: Option<String>,
    pub area: String,
    pub reference_bandwidth: u32,
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub name: String,
    pub typename: String,
}
