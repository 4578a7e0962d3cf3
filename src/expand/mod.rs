//! Topology expansion: design template in, concrete devices, interfaces, cables,
//! pool assignments and routing services out.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, PoisonError};
use thiserror::Error;

use crate::db::TopologyStore;
use crate::ipam::{Allocator, PoolError, PoolLease};
use crate::models::*;
use crate::utils;

const OSPF_PROCESS_ID: u32 = 1;
const OSPF_BACKBONE_AREA: u32 = 0;
const OSPF_REFERENCE_BANDWIDTH: u32 = 10000;
const OVERLAY_MULTIHOP: u8 = 3;
const OVERLAY_ADDRESS_FAMILY: &str = "evpn";

#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error("cable endpoint {endpoint} does not resolve to an interface")]
    DanglingCableReference { endpoint: String },
    #[error("interface {endpoint} is already cabled")]
    InterfaceAlreadyCabled { endpoint: String },
    #[error("{role} element references unknown interface template {template}")]
    UnknownInterfaceTemplate { role: DeviceRole, template: String },
    #[error("no pool bound for {binding} allocations")]
    MissingPoolBinding { binding: String },
    #[error("invalid design template: {0}")]
    InvalidTemplate(String),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

type IfaceKey = (String, String);

fn key(device: &str, interface: &str) -> IfaceKey {
    (device.to_string(), interface.to_string())
}

fn end_key(end: &Endpoint) -> IfaceKey {
    key(&end.device, &end.interface)
}

/// Working state of one expansion
struct Plan<'a> {
    template: &'a DesignTemplate,
    inventory: &'a Inventory,
    site: String,
    devices: Vec<Device>,
    roles: HashMap<String, DeviceRole>,
    indices: HashMap<String, usize>,
    interfaces: BTreeMap<IfaceKey, Interface>,
    created: Vec<IfaceKey>,
    updated: Vec<IfaceKey>,
    /// Block size requested for link-addressed interfaces created by this plan
    link_prefix: HashMap<IfaceKey, u8>,
    cabled: HashMap<Endpoint, String>,
    cables: Vec<Cable>,
    services: Vec<ServiceBinding>,
}

/// Build every entity the template implies that the inventory does not already hold.
/// Allocations go into the lease; nothing is visible until the caller commits it.
pub fn plan(
    template: &DesignTemplate,
    inventory: &Inventory,
    lease: &mut PoolLease,
) -> Result<ConcreteTopology, ExpansionError> {
    let site = template.name.to_lowercase();
    if !utils::is_valid_hostname(&site) {
        return Err(ExpansionError::InvalidTemplate(format!(
            "invalid topology name: {}",
            template.name
        )));
    }

    let specs = expand_interface_templates(template)?;

    let mut plan = Plan {
        template,
        inventory,
        site,
        devices: Vec::new(),
        roles: HashMap::new(),
        indices: HashMap::new(),
        interfaces: BTreeMap::new(),
        created: Vec::new(),
        updated: Vec::new(),
        link_prefix: HashMap::new(),
        cabled: HashMap::new(),
        cables: Vec::new(),
        services: Vec::new(),
    };

    plan.instantiate(&specs, lease)?;
    plan.cable()?;
    plan.address_links(lease)?;
    match template.scenario {
        UnderlayScenario::Ospf => plan.ospf_underlay(),
        UnderlayScenario::Ebgp => plan.ebgp_underlay(lease)?,
    }
    if template.has_overlay() {
        plan.evpn_overlay(lease)?;
    }
    plan.segments();

    Ok(plan.finish(lease))
}

/// Range-expand each referenced interface template and check its pool bindings
fn expand_interface_templates(
    template: &DesignTemplate,
) -> Result<HashMap<String, Vec<InterfaceSpec>>, ExpansionError> {
    let mut expanded: HashMap<String, Vec<InterfaceSpec>> = HashMap::new();

    for element in &template.elements {
        let iface_template = template
            .interface_template(&element.interface_template)
            .ok_or_else(|| ExpansionError::UnknownInterfaceTemplate {
                role: element.role,
                template: element.interface_template.clone(),
            })?;
        if element.count == 0 || expanded.contains_key(&iface_template.name) {
            continue;
        }

        let mut specs = Vec::new();
        for spec in &iface_template.interfaces {
            if interface_role::requires_address(&spec.role)
                && template.pools.pool_for(&spec.role).is_none()
            {
                return Err(ExpansionError::MissingPoolBinding {
                    binding: spec.role.clone(),
                });
            }
            let names = utils::expand_interface_range(&spec.name)
                .map_err(ExpansionError::InvalidTemplate)?;
            for name in names {
                specs.push(InterfaceSpec {
                    name,
                    ..spec.clone()
                });
            }
        }
        expanded.insert(iface_template.name.clone(), specs);
    }

    let has_fabric = template
        .elements
        .iter()
        .any(|e| e.count > 0 && e.role.is_fabric());
    let needs_asn =
        (template.scenario == UnderlayScenario::Ebgp && has_fabric) || template.has_overlay();
    if needs_asn && template.pools.asn.is_none() {
        return Err(ExpansionError::MissingPoolBinding {
            binding: "asn".to_string(),
        });
    }

    Ok(expanded)
}

impl<'a> Plan<'a> {
    fn instantiate(
        &mut self,
        specs: &HashMap<String, Vec<InterfaceSpec>>,
        lease: &mut PoolLease,
    ) -> Result<(), ExpansionError> {
        let template = self.template;
        let mut counters: HashMap<DeviceRole, usize> = HashMap::new();

        for element in &template.elements {
            let Some(element_specs) = specs.get(&element.interface_template) else {
                continue;
            };
            for _ in 0..element.count {
                let index = counters.entry(element.role).or_insert(0);
                *index += 1;
                let role_label = element.role.as_str().replace('_', "-");
                let name = utils::device_name(&self.site, &role_label, *index);

                self.roles.insert(name.clone(), element.role);
                self.indices.insert(name.clone(), *index);
                self.devices.push(Device {
                    name: name.clone(),
                    role: element.role,
                    platform: element.device_type.platform.clone(),
                    device_type: element.device_type.name.clone(),
                    topology: template.name.clone(),
                    location: template.location.clone(),
                });

                for spec in element_specs {
                    self.instantiate_interface(&name, spec, lease)?;
                }
            }
        }
        Ok(())
    }

    fn instantiate_interface(
        &mut self,
        device: &str,
        spec: &InterfaceSpec,
        lease: &mut PoolLease,
    ) -> Result<(), ExpansionError> {
        let k = key(device, &spec.name);
        if self.interfaces.contains_key(&k) {
            return Ok(());
        }
        if let Some(existing) = self.inventory.interface(device, &spec.name) {
            self.interfaces.insert(k, existing.clone());
            return Ok(());
        }

        let template = self.template;
        let role = spec.role.as_str();
        let identifier = format!("{}-{}", device, spec.name);
        let address = match template.pools.pool_for(role) {
            // Link roles are addressed once their cable is known
            Some(_) if interface_role::is_link_addressed(role) => {
                let prefix_length = spec
                    .prefix_length
                    .unwrap_or_else(|| interface_role::default_prefix_length(role));
                self.link_prefix.insert(k.clone(), prefix_length);
                None
            }
            Some(pool) if role == interface_role::MANAGEMENT => {
                let host = lease.allocate_for(pool, &identifier, 32)?;
                host.cidr().map(|cidr| match lease.prefix_length(pool) {
                    Some(len) => format!("{}/{}", utils::strip_mask(&cidr), len),
                    None => cidr,
                })
            }
            Some(pool) => {
                let prefix_length = spec
                    .prefix_length
                    .unwrap_or_else(|| interface_role::default_prefix_length(role));
                lease.allocate_for(pool, &identifier, prefix_length)?.cidr()
            }
            None => None,
        };

        self.interfaces.insert(
            k.clone(),
            Interface {
                device: device.to_string(),
                name: spec.name.clone(),
                role: spec.role.clone(),
                address,
                description: spec.description.clone(),
                mtu: spec.mtu,
                status: interface_status::ACTIVE.to_string(),
            },
        );
        self.created.push(k);
        Ok(())
    }

    /// Record that an interface loaded from the inventory changed
    fn touch(&mut self, k: &IfaceKey) {
        if !self.created.contains(k) && !self.updated.contains(k) {
            self.updated.push(k.clone());
        }
    }

    fn resolve(&self, end: &Endpoint) -> Result<&Interface, ExpansionError> {
        self.interfaces
            .get(&end_key(end))
            .ok_or_else(|| ExpansionError::DanglingCableReference {
                endpoint: end.to_string(),
            })
    }

    fn cable(&mut self) -> Result<(), ExpansionError> {
        for existing in self.inventory.cables.values() {
            self.cabled.insert(existing.a.clone(), existing.id.clone());
            self.cabled.insert(existing.b.clone(), existing.id.clone());
        }

        let template = self.template;
        for intent in &template.cabling {
            let pairs = match intent {
                CablingIntent::FullMesh {
                    a_role,
                    a_interface_role,
                    b_role,
                    b_interface_role,
                } => self.full_mesh_pairs(*a_role, a_interface_role, *b_role, b_interface_role)?,
                CablingIntent::Explicit { a, b } => vec![(
                    Endpoint::new(&a.device, &a.interface),
                    Endpoint::new(&b.device, &b.interface),
                )],
                CablingIntent::OutOfBand {
                    source_role,
                    interface_role,
                } => self.out_of_band_pairs(*source_role, interface_role),
            };

            for (x, y) in pairs {
                let x_role = self.resolve(&x)?.role.clone();
                let y_role = self.resolve(&y)?.role.clone();
                if x == y {
                    return Err(ExpansionError::InterfaceAlreadyCabled {
                        endpoint: x.to_string(),
                    });
                }

                let kind = if [&x_role, &y_role].iter().all(|r| interface_role::is_fabric(r)) {
                    cable_type::DAC_PASSIVE
                } else {
                    cable_type::CAT6
                };
                let cable = Cable::new(x, y, kind);
                let known = self.cables.iter().any(|c| c.id == cable.id);
                if known || self.inventory.has_cable(&cable.id) {
                    continue;
                }
                for end in [&cable.a, &cable.b] {
                    if self.cabled.contains_key(end) {
                        return Err(ExpansionError::InterfaceAlreadyCabled {
                            endpoint: end.to_string(),
                        });
                    }
                }

                self.cabled.insert(cable.a.clone(), cable.id.clone());
                self.cabled.insert(cable.b.clone(), cable.id.clone());
                self.describe_peer(&cable.a, &cable.b);
                self.describe_peer(&cable.b, &cable.a);
                self.cables.push(cable);
            }
        }
        Ok(())
    }

    /// Interface names of a role on a device, in natural order
    fn ports(&self, device: &str, role: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .interfaces
            .values()
            .filter(|i| i.device == device && i.role == role)
            .map(|i| i.name.clone())
            .collect();
        utils::sort_interface_names(&mut names);
        names
    }

    /// Every device of role A paired with every device of role B, each side taking its next
    /// free interface of the given role in natural order
    fn full_mesh_pairs(
        &self,
        a_role: DeviceRole,
        a_interface_role: &str,
        b_role: DeviceRole,
        b_interface_role: &str,
    ) -> Result<Vec<(Endpoint, Endpoint)>, ExpansionError> {
        let a_devices: Vec<&Device> = self.devices.iter().filter(|d| d.role == a_role).collect();
        let b_devices: Vec<&Device> = self.devices.iter().filter(|d| d.role == b_role).collect();
        for (role, devices) in [(a_role, &a_devices), (b_role, &b_devices)] {
            if devices.is_empty() {
                return Err(ExpansionError::DanglingCableReference {
                    endpoint: format!("{}:*", role),
                });
            }
        }

        let mut free: HashMap<IfaceKey, VecDeque<String>> = HashMap::new();
        let mut next_free = |device: &str, role: &str| -> Result<Endpoint, ExpansionError> {
            let queue = free
                .entry(key(device, role))
                .or_insert_with(|| self.ports(device, role).into());
            let name = queue
                .pop_front()
                .ok_or_else(|| ExpansionError::DanglingCableReference {
                    endpoint: format!("{}:<next {} interface>", device, role),
                })?;
            Ok(Endpoint::new(device, &name))
        };

        let mut pairs = Vec::new();
        for (i, a) in a_devices.iter().enumerate() {
            for (j, b) in b_devices.iter().enumerate() {
                // same-role meshes connect each pair once
                if a_role == b_role && j <= i {
                    continue;
                }
                let a_end = next_free(&a.name, a_interface_role)?;
                let b_end = next_free(&b.name, b_interface_role)?;
                pairs.push((a_end, b_end));
            }
        }
        Ok(pairs)
    }

    /// Pair each source device with every other device of the same index parity over their
    /// free ports of one role. Pairs already cabled are left alone; pairs with no free port
    /// on either side are skipped.
    fn out_of_band_pairs(&self, source_role: DeviceRole, role: &str) -> Vec<(Endpoint, Endpoint)> {
        let parity = |device: &Device| self.indices.get(&device.name).map(|i| i % 2);
        let mut free: HashMap<String, VecDeque<String>> = HashMap::new();

        let mut pairs = Vec::new();
        for source in self.devices.iter().filter(|d| d.role == source_role) {
            for target in self.devices.iter().filter(|d| d.role != source_role) {
                if parity(source) != parity(target)
                    || self.linked(&source.name, &target.name, role)
                {
                    continue;
                }
                for device in [&source.name, &target.name] {
                    if !free.contains_key(device) {
                        free.insert(device.clone(), self.uncabled_ports(device, role));
                    }
                }
                let has_port = |device: &str| free.get(device).is_some_and(|q| !q.is_empty());
                if !has_port(&source.name) || !has_port(&target.name) {
                    continue;
                }
                let mut take = |device: &str| free.get_mut(device).and_then(VecDeque::pop_front);
                if let (Some(source_port), Some(target_port)) =
                    (take(&source.name), take(&target.name))
                {
                    pairs.push((
                        Endpoint::new(&source.name, &source_port),
                        Endpoint::new(&target.name, &target_port),
                    ));
                }
            }
        }
        pairs
    }

    fn uncabled_ports(&self, device: &str, role: &str) -> VecDeque<String> {
        self.ports(device, role)
            .into_iter()
            .filter(|name| !self.cabled.contains_key(&Endpoint::new(device, name)))
            .collect()
    }

    /// Whether two devices are already cabled over ports of a role
    fn linked(&self, x: &str, y: &str, role: &str) -> bool {
        let role_of = |end: &Endpoint| self.interfaces.get(&end_key(end)).map(|i| i.role.as_str());
        self.inventory
            .cables
            .values()
            .chain(self.cables.iter())
            .filter(|c| {
                (c.a.device == x && c.b.device == y) || (c.a.device == y && c.b.device == x)
            })
            .any(|c| role_of(&c.a) == Some(role) && role_of(&c.b) == Some(role))
    }

    fn describe_peer(&mut self, local: &Endpoint, peer: &Endpoint) {
        let k = end_key(local);
        let Some(iface) = self.interfaces.get_mut(&k) else {
            return;
        };
        if iface.description.is_none() {
            iface.description = Some(format!(
                "Peering connection to {} -> {}",
                peer.device, peer.interface
            ));
            self.touch(&k);
        }
    }

    /// Give both ends of every new cable addresses from one point-to-point block, keyed by
    /// the cable id. An end that already holds an address fixes the block.
    fn address_links(&mut self, lease: &mut PoolLease) -> Result<(), ExpansionError> {
        let template = self.template;
        for cable in self.cables.clone() {
            let ends = [end_key(&cable.a), end_key(&cable.b)];
            let linked: Vec<&Interface> = ends
                .iter()
                .filter_map(|k| self.interfaces.get(k))
                .filter(|i| interface_role::is_link_addressed(&i.role))
                .collect();
            let Some((role, pool)) = linked.iter().find_map(|i| {
                let pool = template.pools.pool_for(&i.role)?;
                Some((i.role.clone(), pool.to_string()))
            }) else {
                continue;
            };

            let held: Vec<(u32, u32, u8)> = linked
                .iter()
                .filter_map(|i| i.address.as_deref())
                .filter_map(|a| Some((utils::ipv4_to_u32(utils::strip_mask(a))?, a)))
                .filter_map(|(ip, a)| utils::parse_cidr(a).ok().map(|(net, _, len)| (ip, net, len)))
                .collect();
            if held.len() == linked.len() {
                continue;
            }

            let (network, prefix_length) = match held.first() {
                Some(&(_, network, len)) => (network, len),
                None => {
                    let len = ends
                        .iter()
                        .find_map(|k| self.link_prefix.get(k).copied())
                        .unwrap_or_else(|| interface_role::default_prefix_length(&role));
                    let block = lease.allocate_for(&pool, &cable.id, len)?;
                    let AssignedValue::Prefix {
                        network,
                        prefix_length,
                    } = block.value
                    else {
                        return Err(PoolError::InvalidPool {
                            pool,
                            message: "not a prefix pool".to_string(),
                        }
                        .into());
                    };
                    (network, prefix_length)
                }
            };

            let (low, high) = utils::link_hosts(network, prefix_length);
            let mut hosts = [low, high]
                .into_iter()
                .filter(|h| !held.iter().any(|(ip, _, _)| ip == h));
            for k in &ends {
                let Some(iface) = self.interfaces.get_mut(k) else {
                    continue;
                };
                if iface.address.is_some() || !interface_role::is_link_addressed(&iface.role) {
                    continue;
                }
                let Some(host) = hosts.next() else {
                    break;
                };
                iface.address = Some(utils::format_cidr(host, prefix_length));
                self.touch(k);
            }
        }
        Ok(())
    }

    /// Cables of this topology, existing and new, in id order
    fn topology_cables(&self) -> Vec<Cable> {
        let mut cables: Vec<Cable> = self
            .inventory
            .cables
            .values()
            .filter(|c| {
                self.roles.contains_key(&c.a.device) && self.roles.contains_key(&c.b.device)
            })
            .cloned()
            .chain(self.cables.iter().cloned())
            .collect();
        cables.sort_by(|a, b| a.id.cmp(&b.id));
        cables.dedup_by(|a, b| a.id == b.id);
        cables
    }

    /// First addressed interface of a role on a device: its name and bare address
    fn first_addressed(&self, device: &str, role: &str) -> Option<(String, String)> {
        let mut candidates: Vec<&Interface> = self
            .interfaces
            .values()
            .filter(|i| i.device == device && i.role == role && i.address.is_some())
            .collect();
        candidates.sort_by(|a, b| utils::natural_cmp(&a.name, &b.name));
        let iface = candidates.first()?;
        let address = utils::strip_mask(iface.address.as_deref()?).to_string();
        Some((iface.name.clone(), address))
    }

    fn router_id(&self, device: &str) -> Option<String> {
        self.first_addressed(device, interface_role::LOOPBACK)
            .map(|(_, address)| address)
    }

    fn ospf_underlay(&mut self) {
        let cables = self.topology_cables();
        let mut services = Vec::new();

        for device in self.devices.iter().filter(|d| d.role.is_fabric()) {
            let name = format!("{}-underlay", device.name);
            if self.inventory.has_service(&name) {
                continue;
            }

            let mut interfaces: Vec<String> = self
                .interfaces
                .values()
                .filter(|i| i.device == device.name && interface_role::is_loopback(&i.role))
                .map(|i| i.name.clone())
                .collect();
            for cable in cables.iter().filter(|c| c.touches_device(&device.name)) {
                for end in [&cable.a, &cable.b] {
                    let routed = self
                        .interfaces
                        .get(&end_key(end))
                        .is_some_and(|i| interface_role::is_fabric(&i.role));
                    if end.device == device.name && routed {
                        interfaces.push(end.interface.clone());
                    }
                }
            }
            utils::sort_interface_names(&mut interfaces);
            interfaces.dedup();

            services.push(ServiceBinding::Ospf(OspfInstance {
                name,
                device: device.name.clone(),
                process_id: OSPF_PROCESS_ID,
                area: OSPF_BACKBONE_AREA,
                router_id: self.router_id(&device.name),
                reference_bandwidth: OSPF_REFERENCE_BANDWIDTH,
                interfaces,
            }));
        }

        self.services.extend(services);
    }

    fn ebgp_underlay(&mut self, lease: &mut PoolLease) -> Result<(), ExpansionError> {
        let Some(asn_pool) = self.template.pools.asn.clone() else {
            return Ok(());
        };

        let mut asns: HashMap<String, u32> = HashMap::new();
        for device in self.devices.iter().filter(|d| d.role.is_fabric()) {
            let identifier = if device.role == DeviceRole::Spine {
                format!("{}-spine-asn", self.site)
            } else {
                format!("{}-asn", device.name)
            };
            asns.insert(device.name.clone(), allocate_asn(lease, &asn_pool, &identifier)?);
        }

        let site = self.site.to_uppercase();
        let mut services = Vec::new();
        for cable in self.topology_cables() {
            let (Some(a_role), Some(b_role)) =
                (self.roles.get(&cable.a.device), self.roles.get(&cable.b.device))
            else {
                continue;
            };
            let spine_to_leaf = (*a_role == DeviceRole::Spine && b_role.is_leaf_like())
                || (*b_role == DeviceRole::Spine && a_role.is_leaf_like());
            if !spine_to_leaf {
                continue;
            }

            for (local, remote) in [(&cable.a, &cable.b), (&cable.b, &cable.a)] {
                let name = format!("{}-{}-bgp", local.device, local.interface).to_lowercase();
                if self.inventory.has_service(&name) {
                    continue;
                }
                let (Some(local_as), Some(remote_as)) =
                    (asns.get(&local.device), asns.get(&remote.device))
                else {
                    continue;
                };
                let peer_group = if self.roles.get(&local.device) == Some(&DeviceRole::Spine) {
                    format!("{}-SPINE-TO-LEAF-UNDERLAY", site)
                } else {
                    format!("{}-LEAF-TO-SPINE-UNDERLAY", site)
                };
                let remote_ip = self
                    .interfaces
                    .get(&end_key(remote))
                    .and_then(|i| i.address.as_deref())
                    .map(|a| utils::strip_mask(a).to_string());

                services.push(ServiceBinding::Bgp(BgpSession {
                    name,
                    device: local.device.clone(),
                    peer_group,
                    local_as: *local_as,
                    remote_as: *remote_as,
                    remote_ip,
                    interface: Some(local.interface.clone()),
                    router_id: self.router_id(&local.device),
                    local_ip: None,
                    description: Some(format!("Underlay session to {}", remote)),
                    settings: PeerGroupSettings {
                        bfd: true,
                        ..Default::default()
                    },
                }));
            }
        }

        self.services.extend(services);
        Ok(())
    }

    /// iBGP EVPN sessions between every spine and every leaf over their VTEP loopbacks,
    /// spines reflecting routes to leaf clients. All fabric devices share one overlay ASN.
    fn evpn_overlay(&mut self, lease: &mut PoolLease) -> Result<(), ExpansionError> {
        let Some(asn_pool) = self.template.pools.asn.clone() else {
            return Ok(());
        };
        let overlay_as = allocate_asn(lease, &asn_pool, &format!("{}-overlay-asn", self.site))?;

        let site = self.site.to_uppercase();
        let spines: Vec<&Device> = self
            .devices
            .iter()
            .filter(|d| d.role == DeviceRole::Spine)
            .collect();
        let leaves: Vec<&Device> = self
            .devices
            .iter()
            .filter(|d| d.role.is_leaf_like())
            .collect();

        let mut services = Vec::new();
        for spine in &spines {
            for leaf in &leaves {
                let directions = [
                    (spine, leaf, format!("{}-RR-SERVERS-OVERLAY", site), true),
                    (leaf, spine, format!("{}-RR-CLIENTS-OVERLAY", site), false),
                ];
                for (local, remote, peer_group, reflects) in directions {
                    let name = format!("{}-{}-evpn", local.name, remote.name);
                    if self.inventory.has_service(&name) {
                        continue;
                    }
                    let vtep = interface_role::LOOPBACK_VTEP;
                    let (Some((source, local_ip)), Some((_, remote_ip))) = (
                        self.first_addressed(&local.name, vtep),
                        self.first_addressed(&remote.name, vtep),
                    ) else {
                        continue;
                    };

                    services.push(ServiceBinding::Bgp(BgpSession {
                        name,
                        device: local.name.clone(),
                        peer_group,
                        local_as: overlay_as,
                        remote_as: overlay_as,
                        remote_ip: Some(remote_ip),
                        interface: None,
                        router_id: self.router_id(&local.name),
                        local_ip: Some(local_ip),
                        description: Some(format!("EVPN overlay session to {}", remote.name)),
                        settings: PeerGroupSettings {
                            bfd: true,
                            ebgp_multihop: Some(OVERLAY_MULTIHOP),
                            send_community_extended: true,
                            route_reflector_client: reflects,
                            update_source: Some(source),
                            address_family: Some(OVERLAY_ADDRESS_FAMILY.to_string()),
                        },
                    }));
                }
            }
        }

        self.services.extend(services);
        Ok(())
    }

    fn segments(&mut self) {
        let template = self.template;
        for segment in &template.segments {
            if self.inventory.has_service(&segment.name) {
                continue;
            }
            let mut endpoints: Vec<Endpoint> = self
                .interfaces
                .values()
                .filter(|i| {
                    self.roles.get(&i.device) == Some(&segment.device_role)
                        && i.role == segment.interface_role
                })
                .map(Interface::endpoint)
                .collect();
            endpoints.sort_by(|a, b| {
                utils::natural_cmp(&a.device, &b.device)
                    .then_with(|| utils::natural_cmp(&a.interface, &b.interface))
            });

            self.services.push(ServiceBinding::Segment(NetworkSegment {
                name: segment.name.clone(),
                vlan_id: segment.vlan_id,
                customer_name: segment.customer_name.clone(),
                segment_type: segment.segment_type.clone(),
                external_routing: segment.external_routing,
                interfaces: endpoints,
            }));
        }
    }

    fn finish(self, lease: &PoolLease) -> ConcreteTopology {
        let Plan {
            template,
            inventory,
            devices,
            mut interfaces,
            created,
            updated,
            cables,
            services,
            ..
        } = self;

        ConcreteTopology {
            name: template.name.clone(),
            location: template.location.clone(),
            devices: devices
                .into_iter()
                .filter(|d| !inventory.has_device(&d.name))
                .collect(),
            interfaces: created.iter().filter_map(|k| interfaces.remove(k)).collect(),
            updated_interfaces: updated.iter().filter_map(|k| interfaces.remove(k)).collect(),
            cables,
            services,
            assignments: lease.issued().to_vec(),
        }
    }
}

fn allocate_asn(lease: &mut PoolLease, pool: &str, identifier: &str) -> Result<u32, PoolError> {
    lease
        .allocate_for(pool, identifier, 0)?
        .asn()
        .ok_or_else(|| PoolError::InvalidPool {
            pool: pool.to_string(),
            message: "not an ASN pool".to_string(),
        })
}

/// Expand a template against an empty inventory, committing its pool allocations
pub async fn expand(
    template: &DesignTemplate,
    allocator: &Allocator,
) -> Result<ConcreteTopology, ExpansionError> {
    let mut lease = allocator.lease(&template.required_pools()).await?;
    let topology = plan(template, &Inventory::default(), &mut lease)?;
    lease.commit();
    Ok(topology)
}

type TemplateLock = Arc<tokio::sync::Mutex<()>>;

/// Serializes expansions per template name and runs them against a store.
/// A template's lock lives only while some expansion of it holds or waits on it.
#[derive(Debug, Default)]
pub struct Expander {
    locks: std::sync::Mutex<HashMap<String, TemplateLock>>,
}

impl Expander {
    pub fn new() -> Self {
        Self::default()
    }

    fn template_lock(&self, name: &str) -> TemplateLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    fn release_lock(&self, name: &str, lock: TemplateLock) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(name).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(name);
        }
    }

    /// Expand a template and persist only what is missing, as one batch.
    /// Pool allocations become visible only after the store commit succeeds.
    pub async fn expand_and_commit<S>(
        &self,
        template: &DesignTemplate,
        allocator: &Allocator,
        store: &S,
        branch: &str,
    ) -> Result<ConcreteTopology, ExpansionError>
    where
        S: TopologyStore + ?Sized,
    {
        let lock = self.template_lock(&template.name);
        let result = {
            let _guard = lock.lock().await;
            self.expand_locked(template, allocator, store, branch).await
        };
        self.release_lock(&template.name, lock);
        result
    }

    async fn expand_locked<S>(
        &self,
        template: &DesignTemplate,
        allocator: &Allocator,
        store: &S,
        branch: &str,
    ) -> Result<ConcreteTopology, ExpansionError>
    where
        S: TopologyStore + ?Sized,
    {
        let inventory = store
            .load_inventory(&template.name, branch)
            .await
            .map_err(ExpansionError::Store)?;

        let mut lease = allocator.lease(&template.required_pools()).await?;
        let topology = plan(template, &inventory, &mut lease)?;

        if topology.is_empty() {
            tracing::info!("Topology {} on branch {} is up to date", template.name, branch);
            return Ok(topology);
        }

        store
            .commit_batch(&topology, branch)
            .await
            .map_err(ExpansionError::Store)?;
        lease.commit();

        tracing::info!(
            "Expanded {} on branch {}: {} devices, {} interfaces ({} updated), {} cables, \
             {} services",
            template.name,
            branch,
            topology.devices.len(),
            topology.interfaces.len(),
            topology.updated_interfaces.len(),
            topology.cables.len(),
            topology.services.len()
        );
        Ok(topology)
    }
}
