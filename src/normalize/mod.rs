//! Turns a raw device query result into a [`RenderContext`].
//!
//! Raw results use the nested `{"value": ..}` / `{"node": ..}` / `{"edges": [..]}`
//! shape of the store's query layer. [`clean_data`] flattens that shape, then the
//! device is deserialized leniently (missing relationships become empty) and
//! reshaped into the lookups templates consume.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::classify;
use crate::models::*;
use crate::utils;

const DEFAULT_OSPF_PROCESS_ID: u32 = 1;
const DEFAULT_REFERENCE_BANDWIDTH: u32 = 10000;
const VNI_OFFSET: u32 = 10000;

/// Keys lifted off each BGP session rather than shared on its profile
const BGP_SESSION_KEYS: &[&str] = &[
    "name",
    "remote_ip",
    "remote_as",
    "local_ip",
    "peer_group",
    "typename",
    "interface",
    "description",
];

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("query returned no device")]
    EmptyResult,
    #[error("malformed query result: {0}")]
    Malformed(String),
}

/// Flatten the nested query shape:
/// `{"value": v}` becomes `v`, `{"node": {..}}` is unwrapped, `{"edges": [..]}` becomes a list
/// of unwrapped nodes, and keys containing `__` lose their underscores.
pub fn clean_data(data: &Value) -> Value {
    match data {
        Value::Object(map) => {
            let mut result = Map::new();
            for (key, value) in map {
                let cleaned = match value {
                    Value::Object(inner) => clean_object_field(inner),
                    _ => clean_data(value),
                };
                result.insert(key.replace("__", ""), cleaned);
            }
            Value::Object(result)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| clean_data(item.get("node").unwrap_or(item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn clean_object_field(inner: &Map<String, Value>) -> Value {
    if inner.len() == 1 {
        if let Some(value) = inner.get("value") {
            return value.clone();
        }
    }
    if let Some(node) = inner.get("node") {
        return clean_data(node);
    }
    if let Some(edges) = inner.get("edges") {
        return match edges {
            Value::Array(_) => clean_data(edges),
            _ => Value::Array(Vec::new()),
        };
    }
    clean_data(&Value::Object(inner.clone()))
}

/// First element of the first top-level key of a cleaned result
pub fn get_data(cleaned: &Value) -> Result<Value, NormalizeError> {
    let map = cleaned.as_object().ok_or(NormalizeError::EmptyResult)?;
    let (_, first) = map.iter().next().ok_or(NormalizeError::EmptyResult)?;
    match first {
        Value::Array(items) => items.first().cloned().ok_or(NormalizeError::EmptyResult),
        Value::Null => Err(NormalizeError::EmptyResult),
        other => Ok(other.clone()),
    }
}

/// Decode entities in every string of a cleaned tree
fn decode_text(value: &mut Value) {
    match value {
        Value::String(s) => *s = utils::decode_entities(s),
        Value::Object(map) => map.values_mut().for_each(decode_text),
        Value::Array(items) => items.iter_mut().for_each(decode_text),
        _ => {}
    }
}

fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    name: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    comments: Option<String>,
    #[serde(default)]
    platform: Option<RawPlatform>,
    #[serde(default, deserialize_with = "null_default")]
    interfaces: Vec<RawInterface>,
    #[serde(default, deserialize_with = "null_default")]
    device_services: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPlatform {
    Name(String),
    Object {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        netmiko_device_type: Option<String>,
    },
}

impl RawPlatform {
    fn id(&self) -> Option<PlatformId> {
        match self {
            RawPlatform::Name(name) => Some(PlatformId::new(name.as_str())),
            RawPlatform::Object {
                name,
                netmiko_device_type,
            } => netmiko_device_type
                .as_ref()
                .or(name.as_ref())
                .map(|n| PlatformId::new(n.as_str())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawInterface {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    mtu: Option<u32>,
    #[serde(default, deserialize_with = "null_default")]
    ip_addresses: Vec<RawAddress>,
    #[serde(default, deserialize_with = "null_default")]
    interface_services: Vec<Value>,
    #[serde(default)]
    peer: Option<RawPeer>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAddress {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPeer {
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    interface: Option<String>,
}

/// Build the render context for the device in a raw query result
pub fn normalize(raw: &Value) -> Result<RenderContext, NormalizeError> {
    let mut device = get_data(&clean_data(raw))?;
    if device.is_null() {
        return Err(NormalizeError::EmptyResult);
    }
    decode_text(&mut device);

    let raw_device: RawDevice =
        serde_json::from_value(device).map_err(|e| NormalizeError::Malformed(e.to_string()))?;

    let interfaces = get_interfaces(&raw_device.interfaces)?;
    let interface_roles = classify::classify(&interfaces);
    let loopbacks = get_loopbacks(&interface_roles);
    let vlans = get_vlans(&raw_device.interfaces);

    let bgp_profiles = get_bgp_profiles(&raw_device.device_services);
    let bgp = get_bgp_view(&raw_device.device_services, &bgp_profiles);
    let ospf_configs = get_ospf_configs(&raw_device.device_services);
    let ospf_areas = get_ospf_areas(&interfaces, &ospf_configs);
    let services = get_services(&raw_device);

    Ok(RenderContext {
        hostname: raw_device.name.clone(),
        role: raw_device.role.as_deref().and_then(|r| r.parse().ok()),
        platform: raw_device.platform.as_ref().and_then(RawPlatform::id),
        description: raw_device.description.clone(),
        comments: raw_device.comments.clone(),
        interfaces,
        interface_roles,
        loopbacks,
        vlans,
        bgp_profiles,
        bgp,
        ospf: ospf_configs.first().cloned(),
        ospf_configs,
        ospf_areas,
        service_count: services.len(),
        services,
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read `key` off an object, looking through a relationship object for `inner` if present
fn field_text(obj: &Value, key: &str, inner: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Object(map) => map.get(inner).and_then(scalar_text),
        other => scalar_text(other),
    }
}

fn field_u32(obj: &Value, key: &str, inner: &str) -> Option<u32> {
    field_text(obj, key, inner)?.parse().ok()
}

fn typename(service: &Value) -> &str {
    service.get("typename").and_then(Value::as_str).unwrap_or_default()
}

fn get_interfaces(raw: &[RawInterface]) -> Result<Vec<InterfaceView>, NormalizeError> {
    let mut views = Vec::new();

    for iface in raw {
        let Some(name) = iface.name.as_deref() else {
            continue;
        };

        let ip_addresses: Vec<String> = iface
            .ip_addresses
            .iter()
            .filter_map(|a| a.address.clone())
            .collect();

        let mut vlans: Vec<u16> = iface
            .interface_services
            .iter()
            .filter(|s| typename(s) == "ServiceNetworkSegment")
            .filter_map(|s| field_text(s, "vlan_id", "value")?.parse().ok())
            .collect();
        vlans.sort_unstable();
        vlans.dedup();

        let ospf_area = iface
            .interface_services
            .iter()
            .find(|s| typename(s) == "ServiceOSPF")
            .and_then(|s| field_text(s, "area", "area"));

        let peer = iface.peer.as_ref().and_then(|p| match (&p.device, &p.interface) {
            (Some(d), Some(i)) => Some(Endpoint::new(d, i)),
            _ => None,
        });

        let names = utils::expand_interface_range(name).map_err(NormalizeError::Malformed)?;
        for expanded in names {
            views.push(InterfaceView {
                name: expanded,
                role: iface.role.clone().unwrap_or_default(),
                description: iface.description.clone(),
                status: iface.status.clone(),
                mtu: iface.mtu,
                ip_address: ip_addresses.first().cloned().unwrap_or_default(),
                ip_addresses: ip_addresses.clone(),
                vlans: vlans.clone(),
                ospf_area: ospf_area.clone(),
                peer: peer.clone(),
            });
        }
    }

    classify::sort_views(&mut views);
    Ok(views)
}

fn get_loopbacks(roles: &InterfaceRoles) -> BTreeMap<String, String> {
    roles
        .loopback
        .iter()
        .filter(|iface| !iface.ip_address.is_empty())
        .map(|iface| {
            (
                iface.name.to_lowercase(),
                utils::strip_mask(&iface.ip_address).to_string(),
            )
        })
        .collect()
}

fn get_vlans(raw: &[RawInterface]) -> Vec<Vlan> {
    let mut vlans: BTreeMap<u16, Vlan> = BTreeMap::new();

    for service in raw.iter().flat_map(|i| i.interface_services.iter()) {
        if typename(service) != "ServiceNetworkSegment" {
            continue;
        }
        let vlan_id = field_text(service, "vlan_id", "value").and_then(|v| v.parse::<u16>().ok());
        let Some(vlan_id) = vlan_id else {
            continue;
        };
        vlans.entry(vlan_id).or_insert_with(|| {
            let name = field_text(service, "name", "value")
                .or_else(|| field_text(service, "customer_name", "value"))
                .unwrap_or_else(|| format!("VLAN_{}", vlan_id));
            Vlan {
                vlan_id,
                name,
                vni: vlan_id as u32 + VNI_OFFSET,
                rd: vlan_id.to_string(),
                segment_type: field_text(service, "segment_type", "value")
                    .unwrap_or_else(|| "l2_only".to_string()),
                external_routing: service
                    .get("external_routing")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }
        });
    }

    vlans.into_values().collect()
}

fn bgp_neighbor(service: &Value) -> BgpNeighbor {
    BgpNeighbor {
        name: field_text(service, "name", "value").unwrap_or_default(),
        remote_ip: field_text(service, "remote_ip", "address")
            .map(|a| utils::strip_mask(&a).to_string()),
        remote_as: field_u32(service, "remote_as", "asn"),
        interface: field_text(service, "interface", "name"),
    }
}

fn get_bgp_profiles(services: &[Value]) -> Vec<BgpProfile> {
    let mut groups: BTreeMap<String, Vec<&Value>> = BTreeMap::new();
    for service in services.iter().filter(|s| typename(s) == "ServiceBGP") {
        let group =
            field_text(service, "peer_group", "name").unwrap_or_else(|| "default".to_string());
        groups.entry(group).or_default().push(service);
    }

    groups
        .into_iter()
        .map(|(profile, sessions)| {
            let mut settings: BTreeMap<String, Value> = BTreeMap::new();
            if let Some(Value::Object(first)) = sessions.first() {
                for (key, value) in first {
                    if BGP_SESSION_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    if sessions.iter().all(|s| s.get(key) == Some(value)) {
                        settings.insert(key.clone(), value.clone());
                    }
                }
                // peer group attributes apply to the whole profile
                if let Some(Value::Object(group)) = first.get("peer_group") {
                    for (key, value) in group {
                        if key != "name" && !value.is_null() {
                            settings.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            BgpProfile {
                profile,
                settings,
                sessions: sessions.into_iter().map(bgp_neighbor).collect(),
            }
        })
        .collect()
}

/// The device ASN comes from its first external session when it has one, since internal
/// overlay sessions run under a shared ASN
fn get_bgp_view(services: &[Value], profiles: &[BgpProfile]) -> Option<BgpView> {
    let sessions: Vec<&Value> = services
        .iter()
        .filter(|s| typename(s) == "ServiceBGP")
        .collect();
    let first = *sessions.first()?;
    let external = sessions
        .iter()
        .find(|s| field_u32(s, "local_as", "asn") != field_u32(s, "remote_as", "asn"))
        .copied()
        .unwrap_or(first);
    Some(BgpView {
        local_as: field_u32(external, "local_as", "asn"),
        router_id: field_text(first, "router_id", "address")
            .map(|a| utils::strip_mask(&a).to_string()),
        neighbors: profiles.iter().flat_map(|p| p.sessions.iter().cloned()).collect(),
    })
}

fn get_ospf_configs(services: &[Value]) -> Vec<OspfConfig> {
    services
        .iter()
        .filter(|s| typename(s) == "ServiceOSPF")
        .map(|s| {
            let mut interfaces: Vec<String> = match s.get("interfaces") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|i| match i {
                        Value::Object(_) => field_text(i, "name", "value"),
                        other => scalar_text(other),
                    })
                    .collect(),
                _ => Vec::new(),
            };
            utils::sort_interface_names(&mut interfaces);

            OspfConfig {
                name: field_text(s, "name", "value").unwrap_or_default(),
                process_id: field_u32(s, "process_id", "value")
                    .unwrap_or(DEFAULT_OSPF_PROCESS_ID),
                router_id: field_text(s, "router_id", "address")
                    .map(|a| utils::strip_mask(&a).to_string()),
                area: field_text(s, "area", "area").unwrap_or_else(|| "0".to_string()),
                reference_bandwidth: field_u32(s, "reference_bandwidth", "value")
                    .unwrap_or(DEFAULT_REFERENCE_BANDWIDTH),
                interfaces,
            }
        })
        .collect()
}

fn get_ospf_areas(
    interfaces: &[InterfaceView],
    configs: &[OspfConfig],
) -> BTreeMap<String, Vec<String>> {
    let mut areas: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for iface in interfaces {
        if let Some(area) = &iface.ospf_area {
            areas.entry(area.clone()).or_default().insert(iface.name.clone());
        }
    }
    for config in configs {
        let entry = areas.entry(config.area.clone()).or_default();
        entry.extend(config.interfaces.iter().cloned());
    }

    areas
        .into_iter()
        .map(|(area, names)| {
            let mut names: Vec<String> = names.into_iter().collect();
            utils::sort_interface_names(&mut names);
            (area, names)
        })
        .collect()
}

fn get_services(device: &RawDevice) -> Vec<ServiceSummary> {
    let mut seen = BTreeSet::new();
    let mut services = Vec::new();
    let all = device
        .device_services
        .iter()
        .chain(device.interfaces.iter().flat_map(|i| i.interface_services.iter()));

    for service in all {
        let name = field_text(service, "name", "value").unwrap_or_default();
        let typename = typename(service).to_string();
        if seen.insert((typename.clone(), name.clone())) {
            services.push(ServiceSummary { name, typename });
        }
    }
    services
}
