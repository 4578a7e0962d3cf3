use crate::models::{interface_role, InterfaceRoles, InterfaceView};
use crate::utils;

/// Bucket an interface belongs to. Total: every interface maps to exactly one.
pub fn bucket_for(name: &str, role: &str) -> &'static str {
    let role = role.trim().to_lowercase();
    let name = name.to_lowercase();

    if interface_role::is_loopback(&role) || name.contains("loopback") || name.starts_with("lo") {
        return interface_role::LOOPBACK;
    }
    match role.as_str() {
        "uplink" | "spine" => interface_role::UPLINK,
        "downlink" | "leaf" => interface_role::DOWNLINK,
        "customer" | "access" => interface_role::CUSTOMER,
        "peering" | "peer" => interface_role::PEERING,
        _ => interface_role::OTHER,
    }
}

/// Group interfaces into role buckets plus the `all_physical` and `all_downlink` aggregates.
/// Every bucket is natural-sorted by interface name.
pub fn classify(interfaces: &[InterfaceView]) -> InterfaceRoles {
    let mut roles = InterfaceRoles::default();

    for iface in interfaces {
        let mut entry = iface.clone();
        if entry.ip_address.is_empty() {
            entry.ip_address = entry.ip_addresses.first().cloned().unwrap_or_default();
        }
        match bucket_for(&iface.name, &iface.role) {
            interface_role::LOOPBACK => roles.loopback.push(entry),
            interface_role::UPLINK => roles.uplink.push(entry),
            interface_role::DOWNLINK => roles.downlink.push(entry),
            interface_role::CUSTOMER => roles.customer.push(entry),
            interface_role::PEERING => roles.peering.push(entry),
            _ => roles.other.push(entry),
        }
    }

    for bucket in [
        &mut roles.loopback,
        &mut roles.uplink,
        &mut roles.downlink,
        &mut roles.customer,
        &mut roles.peering,
        &mut roles.other,
    ] {
        sort_views(bucket);
    }

    roles.all_downlink = roles.downlink.iter().chain(&roles.customer).cloned().collect();
    sort_views(&mut roles.all_downlink);

    roles.all_physical = roles
        .uplink
        .iter()
        .chain(&roles.downlink)
        .chain(&roles.customer)
        .chain(&roles.peering)
        .chain(&roles.other)
        .cloned()
        .collect();
    sort_views(&mut roles.all_physical);

    roles
}

pub fn sort_views(views: &mut [InterfaceView]) {
    views.sort_by(|a, b| utils::natural_cmp(&a.name, &b.name));
}
