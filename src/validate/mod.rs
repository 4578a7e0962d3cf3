use crate::models::{interface_role, DeviceRole, Finding, RenderContext};

/// A rule inspects a context and appends findings; it never fails
type Rule = fn(&RenderContext, &mut Vec<Finding>);

/// Ordered rule list for a role
pub fn rules_for(role: DeviceRole) -> Vec<(&'static str, Rule)> {
    let mut rules: Vec<(&'static str, Rule)> = vec![("interfaces-present", interfaces_present)];
    match role {
        DeviceRole::Leaf | DeviceRole::BorderLeaf => {
            rules.push(("loopback-present", loopback_present));
            rules.push(("loopback-addressed", loopback_addressed));
            rules.push(("uplink-present", uplink_present));
            rules.push(("services-present", services_present));
            rules.push(("bgp-redundancy", bgp_redundancy));
            rules.push(("description-present", description_present));
        }
        DeviceRole::Spine => {
            rules.push(("loopback-present", loopback_present));
            rules.push(("loopback-addressed", loopback_addressed));
            rules.push(("downlink-present", downlink_present));
            rules.push(("description-present", description_present));
        }
        DeviceRole::Edge => {
            rules.push(("loopback-present", loopback_present));
            rules.push(("loopback-addressed", loopback_addressed));
            rules.push(("peering-addressed", peering_addressed));
        }
        DeviceRole::Firewall | DeviceRole::Loadbalancer => {
            rules.push(("management-present", management_present));
        }
        DeviceRole::Console | DeviceRole::Oob => {}
    }
    rules
}

/// Run every rule for the role. Findings come back in rule order.
pub fn validate(context: &RenderContext, role: DeviceRole) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (_, rule) in rules_for(role) {
        rule(context, &mut findings);
    }
    findings
}

fn interfaces_present(ctx: &RenderContext, out: &mut Vec<Finding>) {
    if ctx.interfaces.is_empty() {
        out.push(Finding::error(
            "interfaces-present",
            &ctx.hostname,
            "Device has no interfaces configured",
        ));
    }
}

fn loopback_present(ctx: &RenderContext, out: &mut Vec<Finding>) {
    if ctx.interface_roles.loopback.is_empty() {
        out.push(Finding::error(
            "loopback-present",
            &ctx.hostname,
            "Device has no loopback interface",
        ));
    }
}

fn loopback_addressed(ctx: &RenderContext, out: &mut Vec<Finding>) {
    for iface in ctx.interface_roles.loopback.iter().filter(|i| i.ip_address.is_empty()) {
        out.push(Finding::error(
            "loopback-addressed",
            &ctx.hostname,
            format!("Loopback interface {} is missing IP address", iface.name),
        ));
    }
}

fn uplink_present(ctx: &RenderContext, out: &mut Vec<Finding>) {
    if ctx.interface_roles.uplink.is_empty() {
        out.push(Finding::error(
            "uplink-present",
            &ctx.hostname,
            "Device has no uplink interfaces",
        ));
    }
}

fn downlink_present(ctx: &RenderContext, out: &mut Vec<Finding>) {
    if ctx.interface_roles.all_downlink.is_empty() {
        out.push(Finding::error(
            "downlink-present",
            &ctx.hostname,
            "Device has no downlink interfaces",
        ));
    }
}

fn services_present(ctx: &RenderContext, out: &mut Vec<Finding>) {
    if ctx.service_count == 0 {
        out.push(Finding::warning(
            "services-present",
            &ctx.hostname,
            "No services configured on this device",
        ));
    }
}

fn bgp_redundancy(ctx: &RenderContext, out: &mut Vec<Finding>) {
    let sessions: usize = ctx.bgp_profiles.iter().map(|p| p.sessions.len()).sum();
    if sessions == 1 {
        out.push(Finding::warning(
            "bgp-redundancy",
            &ctx.hostname,
            "BGP redundancy not configured - only 1 BGP session found",
        ));
    }
}

fn description_present(ctx: &RenderContext, out: &mut Vec<Finding>) {
    let fabric = ctx
        .interface_roles
        .uplink
        .iter()
        .chain(&ctx.interface_roles.downlink)
        .chain(&ctx.interface_roles.peering);
    for iface in fabric {
        if iface.description.as_deref().map_or(true, str::is_empty) {
            out.push(Finding::warning(
                "description-present",
                &ctx.hostname,
                format!("Interface {} has no description", iface.name),
            ));
        }
    }
}

fn peering_addressed(ctx: &RenderContext, out: &mut Vec<Finding>) {
    for iface in ctx.interface_roles.peering.iter().filter(|i| i.ip_address.is_empty()) {
        out.push(Finding::error(
            "peering-addressed",
            &ctx.hostname,
            format!("Peering interface {} is missing IP address", iface.name),
        ));
    }
}

fn management_present(ctx: &RenderContext, out: &mut Vec<Finding>) {
    let has_management = ctx.interfaces.iter().any(|i| {
        let name = i.name.to_lowercase();
        i.role.eq_ignore_ascii_case(interface_role::MANAGEMENT)
            || name.starts_with("mgmt")
            || name.starts_with("management")
    });
    if !has_management {
        out.push(Finding::warning(
            "management-present",
            &ctx.hostname,
            "Device has no management interface",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;
    use crate::models::*;

    fn iface(name: &str, role: &str, address: &str, description: Option<&str>) -> InterfaceView {
        InterfaceView {
            name: name.to_string(),
            role: role.to_string(),
            ip_address: address.to_string(),
            description: description.map(str::to_string),
            ..Default::default()
        }
    }

    fn context(interfaces: Vec<InterfaceView>) -> RenderContext {
        let interface_roles = classify::classify(&interfaces);
        RenderContext {
            hostname: "dc1-leaf-01".to_string(),
            interfaces,
            interface_roles,
            ..Default::default()
        }
    }

    fn rule_ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.rule_id.as_str()).collect()
    }

    fn neighbor(name: &str) -> BgpNeighbor {
        BgpNeighbor {
            name: name.to_string(),
            remote_ip: None,
            remote_as: Some(65000),
            interface: None,
        }
    }

    #[test]
    fn test_healthy_leaf_has_no_findings() {
        let mut ctx = context(vec![
            iface("Loopback0", "loopback", "10.255.0.3/32", None),
            iface("Ethernet49", "uplink", "10.1.0.1/31", Some("to spine-01")),
            iface("Ethernet50", "uplink", "10.1.0.3/31", Some("to spine-02")),
        ]);
        ctx.service_count = 3;
        ctx.bgp_profiles = vec![BgpProfile {
            profile: "DC1-LEAF-TO-SPINE-UNDERLAY".to_string(),
            settings: Default::default(),
            sessions: vec![neighbor("a"), neighbor("b")],
        }];
        assert!(validate(&ctx, DeviceRole::Leaf).is_empty());
    }

    #[test]
    fn test_loopback_missing_address() {
        let ctx = context(vec![
            iface("Loopback0", "loopback", "", None),
            iface("Ethernet49", "uplink", "", Some("x")),
        ]);
        let findings = validate(&ctx, DeviceRole::Spine);
        let loopback = findings.iter().find(|f| f.rule_id == "loopback-addressed").unwrap();
        assert!(loopback.is_error());
        assert_eq!(loopback.message, "Loopback interface Loopback0 is missing IP address");
        assert_eq!(loopback.device, "dc1-leaf-01");
    }

    #[test]
    fn test_empty_device_findings_in_rule_order() {
        let ctx = context(vec![]);
        let findings = validate(&ctx, DeviceRole::Leaf);
        assert_eq!(
            rule_ids(&findings),
            vec!["interfaces-present", "loopback-present", "uplink-present", "services-present"]
        );
        assert_eq!(findings[0].message, "Device has no interfaces configured");
        assert_eq!(findings[3].severity, Severity::Warning);
    }

    #[test]
    fn test_single_bgp_session_warns() {
        let mut ctx = context(vec![
            iface("Loopback0", "loopback", "10.255.0.3/32", None),
            iface("Ethernet49", "uplink", "10.1.0.1/31", Some("to spine")),
        ]);
        ctx.service_count = 1;
        ctx.bgp_profiles = vec![BgpProfile {
            profile: "p".to_string(),
            settings: Default::default(),
            sessions: vec![neighbor("only")],
        }];
        let findings = validate(&ctx, DeviceRole::BorderLeaf);
        assert_eq!(rule_ids(&findings), vec!["bgp-redundancy"]);
        assert_eq!(findings[0].message, "BGP redundancy not configured - only 1 BGP session found");
    }

    #[test]
    fn test_spine_needs_downlinks_and_descriptions() {
        let ctx = context(vec![
            iface("Loopback0", "loopback", "10.255.0.1/32", None),
            iface("Ethernet1", "uplink", "", None),
        ]);
        let findings = validate(&ctx, DeviceRole::Spine);
        assert_eq!(rule_ids(&findings), vec!["downlink-present", "description-present"]);
    }

    #[test]
    fn test_edge_peering_addressed() {
        let ctx = context(vec![
            iface("Loopback0", "loopback", "10.255.0.9/32", None),
            iface("Ethernet1", "peering", "", Some("transit")),
        ]);
        let findings = validate(&ctx, DeviceRole::Edge);
        assert_eq!(rule_ids(&findings), vec!["peering-addressed"]);
    }

    #[test]
    fn test_firewall_management_warning() {
        let ctx = context(vec![iface("ge-0/0/0", "peering", "198.51.100.1/31", None)]);
        let findings = validate(&ctx, DeviceRole::Firewall);
        assert_eq!(rule_ids(&findings), vec!["management-present"]);
        assert!(!findings[0].is_error());

        let ctx = context(vec![iface("fxp0", "management", "", None)]);
        assert!(validate(&ctx, DeviceRole::Loadbalancer).is_empty());
    }

    #[test]
    fn test_console_only_checks_interfaces() {
        let ctx = context(vec![iface("port1", "console", "", None)]);
        assert!(validate(&ctx, DeviceRole::Console).is_empty());
        let empty = validate(&context(vec![]), DeviceRole::Oob);
        assert_eq!(rule_ids(&empty), vec!["interfaces-present"]);
    }
}
