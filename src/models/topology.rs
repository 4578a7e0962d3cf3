use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::{cable_type, DeviceRole, PlatformId};
use crate::utils;

/// Device is a concrete node of an expanded topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub role: DeviceRole,
    pub platform: PlatformId,
    pub device_type: String,
    pub topology: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Interface belongs to exactly one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub device: String,
    pub name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    pub status: String,
}

impl Interface {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.device, &self.name)
    }
}

/// One side of a cable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub device: String,
    pub interface: String,
}

impl Endpoint {
    pub fn new(device: &str, interface: &str) -> Self {
        Endpoint {
            device: device.to_string(),
            interface: interface.to_string(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.interface)
    }
}

/// Cable is undirected: the endpoints are stored in sorted order, so A-B and B-A are the same cable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cable {
    pub id: String,
    pub a: Endpoint,
    pub b: Endpoint,
    pub cable_type: String,
    pub status: String,
}

impl Cable {
    pub fn new(x: Endpoint, y: Endpoint, cable_type: &str) -> Self {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Cable {
            id: Self::key(&a, &b),
            a,
            b,
            cable_type: cable_type.to_string(),
            status: cable_type::CONNECTED.to_string(),
        }
    }

    /// Identity of the cable between two endpoints, independent of their order
    pub fn key(x: &Endpoint, y: &Endpoint) -> String {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        format!("{}<->{}", a, b)
    }

    /// The opposite endpoint, if `end` is one of this cable's endpoints
    pub fn peer_of(&self, end: &Endpoint) -> Option<&Endpoint> {
        if &self.a == end {
            Some(&self.b)
        } else if &self.b == end {
            Some(&self.a)
        } else {
            None
        }
    }

    pub fn touches_device(&self, device: &str) -> bool {
        self.a.device == device || self.b.device == device
    }
}

/// Service attached to a device or to interfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typename")]
pub enum ServiceBinding {
    #[serde(rename = "ServiceBGP")]
    Bgp(BgpSession),
    #[serde(rename = "ServiceOSPF")]
    Ospf(OspfInstance),
    #[serde(rename = "ServiceNetworkSegment")]
    Segment(NetworkSegment),
}

impl ServiceBinding {
    pub fn name(&self) -> &str {
        match self {
            ServiceBinding::Bgp(s) => &s.name,
            ServiceBinding::Ospf(s) => &s.name,
            ServiceBinding::Segment(s) => &s.name,
        }
    }

    pub fn typename(&self) -> &'static str {
        match self {
            ServiceBinding::Bgp(_) => "ServiceBGP",
            ServiceBinding::Ospf(_) => "ServiceOSPF",
            ServiceBinding::Segment(_) => "ServiceNetworkSegment",
        }
    }

    /// Device owning a device-level service; segments span devices and have none
    pub fn device(&self) -> Option<&str> {
        match self {
            ServiceBinding::Bgp(s) => Some(&s.device),
            ServiceBinding::Ospf(s) => Some(&s.device),
            ServiceBinding::Segment(_) => None,
        }
    }

    pub fn attaches_to(&self, device: &str) -> bool {
        match self {
            ServiceBinding::Segment(s) => s.interfaces.iter().any(|e| e.device == device),
            other => other.device() == Some(device),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpSession {
    pub name: String,
    pub device: String,
    pub peer_group: String,
    pub local_as: u32,
    pub remote_as: u32,
    /// Peer address without mask; unnumbered sessions carry the local interface instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_id: Option<String>,
    /// Local session address, for sessions sourced from a loopback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub settings: PeerGroupSettings,
}

/// Settings every session of a peer group shares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerGroupSettings {
    #[serde(default)]
    pub bfd: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebgp_multihop: Option<u8>,
    #[serde(default)]
    pub send_community_extended: bool,
    #[serde(default)]
    pub route_reflector_client: bool,
    /// Interface the sessions are sourced from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_family: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfInstance {
    pub name: String,
    pub device: String,
    pub process_id: u32,
    pub area: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_id: Option<String>,
    pub reference_bandwidth: u32,
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSegment {
    pub name: String,
    pub vlan_id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    pub segment_type: String,
    pub external_routing: bool,
    pub interfaces: Vec<Endpoint>,
}

/// Value handed out by a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignedValue {
    Prefix { network: u32, prefix_length: u8 },
    Asn { asn: u32 },
}

/// Assignment records which identifier holds which value of a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub pool: String,
    pub identifier: String,
    pub value: AssignedValue,
}

impl Assignment {
    /// Block in CIDR form, e.g. "10.1.0.0/31"
    pub fn cidr(&self) -> Option<String> {
        match self.value {
            AssignedValue::Prefix {
                network,
                prefix_length,
            } => Some(utils::format_cidr(network, prefix_length)),
            AssignedValue::Asn { .. } => None,
        }
    }

    pub fn asn(&self) -> Option<u32> {
        match self.value {
            AssignedValue::Asn { asn } => Some(asn),
            AssignedValue::Prefix { .. } => None,
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            AssignedValue::Prefix { network, prefix_length } => {
                write!(f, "{}", utils::format_cidr(network, prefix_length))
            }
            AssignedValue::Asn { asn } => write!(f, "AS{}", asn),
        }
    }
}

/// Entities already persisted for a topology, used to skip existing identities on re-expansion
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub devices: BTreeMap<String, Device>,
    pub interfaces: BTreeMap<(String, String), Interface>,
    pub cables: BTreeMap<String, Cable>,
    pub services: BTreeSet<String>,
}

impl Inventory {
    pub fn has_device(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    pub fn interface(&self, device: &str, name: &str) -> Option<&Interface> {
        self.interfaces.get(&(device.to_string(), name.to_string()))
    }

    pub fn has_cable(&self, id: &str) -> bool {
        self.cables.contains_key(id)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains(name)
    }

    /// Fold a committed batch into the inventory
    pub fn absorb(&mut self, batch: &ConcreteTopology) {
        for device in &batch.devices {
            self.devices.insert(device.name.clone(), device.clone());
        }
        for iface in batch.interfaces.iter().chain(&batch.updated_interfaces) {
            self.interfaces
                .insert((iface.device.clone(), iface.name.clone()), iface.clone());
        }
        for cable in &batch.cables {
            self.cables.insert(cable.id.clone(), cable.clone());
        }
        for service in &batch.services {
            self.services.insert(service.name().to_string());
        }
    }
}

/// ConcreteTopology is the set of entities an expansion creates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcreteTopology {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub devices: Vec<Device>,
    pub interfaces: Vec<Interface>,
    /// Existing interfaces that gained an address or description from a new cable
    #[serde(default)]
    pub updated_interfaces: Vec<Interface>,
    pub cables: Vec<Cable>,
    pub services: Vec<ServiceBinding>,
    pub assignments: Vec<Assignment>,
}

impl ConcreteTopology {
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
            && self.interfaces.is_empty()
            && self.updated_interfaces.is_empty()
            && self.cables.is_empty()
            && self.services.is_empty()
            && self.assignments.is_empty()
    }

    pub fn interfaces_of<'a>(
        &'a self,
        device: &'a str,
    ) -> impl Iterator<Item = &'a Interface> + 'a {
        self.interfaces.iter().filter(move |i| i.device == device)
    }
}

/// One committed expansion batch, as recorded by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: i64,
    pub topology: String,
    pub branch: String,
    pub device_count: i64,
    pub interface_count: i64,
    pub cable_count: i64,
    pub service_count: i64,
    pub assignment_count: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cable_is_symmetric() {
        let x = Endpoint::new("dc1-spine-01", "Ethernet1");
        let y = Endpoint::new("dc1-leaf-01", "Ethernet49");
        let forward = Cable::new(x.clone(), y.clone(), cable_type::DAC_PASSIVE);
        let reverse = Cable::new(y.clone(), x.clone(), cable_type::DAC_PASSIVE);
        assert_eq!(forward, reverse);
        assert_eq!(forward.id, Cable::key(&y, &x));
        assert_eq!(forward.peer_of(&x), Some(&y));
        assert_eq!(forward.peer_of(&y), Some(&x));
        assert!(forward.peer_of(&Endpoint::new("dc1-leaf-02", "Ethernet49")).is_none());
    }

    #[test]
    fn test_service_binding_tagging() {
        let svc = ServiceBinding::Ospf(OspfInstance {
            name: "dc1-leaf-01-underlay".to_string(),
            device: "dc1-leaf-01".to_string(),
            process_id: 1,
            area: 0,
            router_id: Some("10.0.0.1".to_string()),
            reference_bandwidth: 10000,
            interfaces: vec!["Loopback0".to_string()],
        });
        let value = serde_json::to_value(&svc).unwrap();
        assert_eq!(value["typename"], "ServiceOSPF");
        assert_eq!(value["area"], 0);
        let back: ServiceBinding = serde_json::from_value(value).unwrap();
        assert_eq!(back, svc);
        assert!(svc.attaches_to("dc1-leaf-01"));
        assert!(!svc.attaches_to("dc1-leaf-02"));
    }

    #[test]
    fn test_assignment_display() {
        let a = Assignment {
            pool: "lo".to_string(),
            identifier: "dc1-leaf-01-Loopback0".to_string(),
            value: AssignedValue::Prefix {
                network: utils::ipv4_to_u32("10.0.0.1").unwrap(),
                prefix_length: 32,
            },
        };
        assert_eq!(a.to_string(), "10.0.0.1/32");
        assert_eq!(a.cidr().as_deref(), Some("10.0.0.1/32"));
        assert_eq!(a.asn(), None);
    }
}
