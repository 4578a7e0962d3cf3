use serde::{Deserialize, Deserializer, Serialize};

use super::{interface_role, DeviceRole, PlatformId};

/// Interface roles are compared exactly everywhere after loading
fn canonical_role<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(interface_role::canonical(&String::deserialize(deserializer)?))
}

/// Routing design for the spine/leaf underlay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderlayScenario {
    #[default]
    #[serde(alias = "ospf-ibgp")]
    Ospf,
    #[serde(alias = "ebgp-ibgp")]
    Ebgp,
}

/// DesignTemplate is the abstract description of a topology to build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub scenario: UnderlayScenario,
    #[serde(default)]
    pub pools: PoolBindings,
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub interface_templates: Vec<InterfaceTemplate>,
    #[serde(default)]
    pub cabling: Vec<CablingIntent>,
    #[serde(default)]
    pub segments: Vec<SegmentSpec>,
}

impl DesignTemplate {
    pub fn interface_template(&self, name: &str) -> Option<&InterfaceTemplate> {
        self.interface_templates.iter().find(|t| t.name == name)
    }

    /// Whether fabric devices carry a VTEP loopback, which turns on the EVPN overlay
    pub fn has_overlay(&self) -> bool {
        self.elements
            .iter()
            .filter(|e| e.count > 0 && e.role.is_fabric())
            .filter_map(|e| self.interface_template(&e.interface_template))
            .flat_map(|t| t.interfaces.iter())
            .any(|i| i.role == interface_role::LOOPBACK_VTEP)
    }

    /// Pool ids referenced by the elements and scenario of this template, sorted and unique
    pub fn required_pools(&self) -> Vec<String> {
        let mut pools = Vec::new();
        for element in &self.elements {
            let Some(template) = self.interface_template(&element.interface_template) else {
                continue;
            };
            for iface in &template.interfaces {
                if let Some(pool) = self.pools.pool_for(&iface.role) {
                    pools.push(pool.to_string());
                }
            }
        }
        if self.scenario == UnderlayScenario::Ebgp || self.has_overlay() {
            if let Some(asn) = &self.pools.asn {
                pools.push(asn.clone());
            }
        }
        pools.sort();
        pools.dedup();
        pools
    }
}

/// Named pools serving each kind of allocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolBindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loopback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uplink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peering: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vtep: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
}

impl PoolBindings {
    /// Pool bound to an addressed interface role
    pub fn pool_for(&self, role: &str) -> Option<&str> {
        match role {
            interface_role::LOOPBACK => self.loopback.as_deref(),
            interface_role::UPLINK => self.uplink.as_deref(),
            interface_role::PEERING => self.peering.as_deref(),
            interface_role::LOOPBACK_VTEP => self.vtep.as_deref(),
            interface_role::MANAGEMENT => self.management.as_deref(),
            _ => None,
        }
    }
}

/// ElementSpec instantiates `count` devices of one role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSpec {
    pub role: DeviceRole,
    #[serde(alias = "quantity")]
    pub count: usize,
    pub device_type: DeviceTypeRef,
    pub interface_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTypeRef {
    pub name: String,
    pub platform: PlatformId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
}

/// Named list of interface entries shared by a device type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceTemplate {
    pub name: String,
    pub interfaces: Vec<InterfaceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceSpec {
    /// May use range notation, e.g. "Ethernet[1-48]"
    pub name: String,
    #[serde(deserialize_with = "canonical_role")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_length: Option<u8>,
}

/// How devices in the template get cabled together
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CablingIntent {
    FullMesh {
        a_role: DeviceRole,
        #[serde(deserialize_with = "canonical_role")]
        a_interface_role: String,
        b_role: DeviceRole,
        #[serde(deserialize_with = "canonical_role")]
        b_interface_role: String,
    },
    Explicit {
        a: EndpointRef,
        b: EndpointRef,
    },
    /// Out-of-band management or console cabling: each device of `source_role` takes
    /// every other device whose index has the same parity, one `interface_role` port per side
    OutOfBand {
        source_role: DeviceRole,
        #[serde(deserialize_with = "canonical_role")]
        interface_role: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRef {
    pub device: String,
    pub interface: String,
}

/// Network segment (VLAN) attached to every interface of a role on devices of a role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub name: String,
    pub vlan_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default = "default_segment_type")]
    pub segment_type: String,
    #[serde(default)]
    pub external_routing: bool,
    pub device_role: DeviceRole,
    #[serde(deserialize_with = "canonical_role")]
    pub interface_role: String,
}

fn default_segment_type() -> String {
    "l2_only".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_design_template_from_json() {
        let json = r#"{
            "name": "DC1",
            "scenario": "ebgp-ibgp",
            "pools": {"loopback": "lo-pool", "uplink": "p2p-pool", "asn": "asn-pool"},
            "elements": [
                {"role": "leaf", "quantity": 2,
                 "device_type": {"name": "7050", "platform": "arista_eos"},
                 "interface_template": "leaf-ifaces"}
            ],
            "interface_templates": [
                {"name": "leaf-ifaces", "interfaces": [
                    {"name": "Loopback0", "role": "loopback"},
                    {"name": "Ethernet[1-2]", "role": "uplink", "mtu": 9214}
                ]}
            ],
            "cabling": [
                {"kind": "explicit",
                 "a": {"device": "dc1-leaf-01", "interface": "Ethernet1"},
                 "b": {"device": "dc1-leaf-02", "interface": "Ethernet1"}}
            ]
        }"#;
        let template: DesignTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.scenario, UnderlayScenario::Ebgp);
        assert_eq!(template.elements[0].count, 2);
        assert_eq!(template.elements[0].device_type.platform.as_str(), "arista_eos");
        assert!(matches!(template.cabling[0], CablingIntent::Explicit { .. }));
        assert_eq!(template.required_pools(), vec!["asn-pool", "lo-pool", "p2p-pool"]);
    }

    #[test]
    fn test_required_pools_skips_unaddressed_roles() {
        let json = r#"{
            "name": "dc2",
            "pools": {"loopback": "lo-pool", "uplink": "p2p-pool", "asn": "asn-pool"},
            "elements": [
                {"role": "spine", "count": 1,
                 "device_type": {"name": "x", "platform": "arista_eos"},
                 "interface_template": "spine"}
            ],
            "interface_templates": [
                {"name": "spine", "interfaces": [
                    {"name": "Loopback0", "role": "loopback"},
                    {"name": "Ethernet1", "role": "downlink"}
                ]}
            ]
        }"#;
        let template: DesignTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.scenario, UnderlayScenario::Ospf);
        assert_eq!(template.required_pools(), vec!["lo-pool"]);
        assert!(!template.has_overlay());
    }

    #[test]
    fn test_roles_are_canonical_after_loading() {
        let json = r#"{
            "name": "dc3",
            "pools": {
                "loopback": "lo-pool",
                "uplink": "p2p-pool",
                "vtep": "vtep-pool",
                "asn": "asn-pool"
            },
            "elements": [
                {"role": "leaf", "count": 1,
                 "device_type": {"name": "x", "platform": "arista_eos"},
                 "interface_template": "leaf"}
            ],
            "interface_templates": [
                {"name": "leaf", "interfaces": [
                    {"name": "Loopback0", "role": "Loopback"},
                    {"name": "Loopback1", "role": "LOOPBACK-VTEP"},
                    {"name": "Ethernet49", "role": " Uplink "}
                ]}
            ],
            "cabling": [
                {"kind": "out_of_band", "source_role": "oob", "interface_role": "Management"}
            ]
        }"#;
        let template: DesignTemplate = serde_json::from_str(json).unwrap();
        let roles: Vec<&str> = template.interface_templates[0]
            .interfaces
            .iter()
            .map(|i| i.role.as_str())
            .collect();
        assert_eq!(roles, vec!["loopback", "loopback-vtep", "uplink"]);
        let uplink = &template.interface_templates[0].interfaces[2];
        assert_eq!(template.pools.pool_for(&uplink.role), Some("p2p-pool"));
        assert!(matches!(
            &template.cabling[0],
            CablingIntent::OutOfBand { interface_role, .. } if interface_role == "management"
        ));
        assert!(template.has_overlay());
        assert_eq!(template.required_pools(), vec!["asn-pool", "lo-pool", "p2p-pool", "vtep-pool"]);
    }
}
