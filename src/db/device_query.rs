//! Builds the nested device query result: scalar attributes as `{"value": ..}`,
//! to-one relationships as `{"node": {..}}` and to-many as `{"edges": [{"node": ..}]}`.

use serde_json::{json, Map, Value};

use crate::models::*;

fn attr(value: impl Into<Value>) -> Value {
    json!({ "value": value.into() })
}

fn node(fields: Value) -> Value {
    json!({ "node": fields })
}

fn edges(nodes: Vec<Value>) -> Value {
    json!({ "edges": nodes.into_iter().map(node).collect::<Vec<_>>() })
}

pub fn device_result(
    device: &Device,
    interfaces: &[Interface],
    cables: &[Cable],
    services: &[ServiceBinding],
) -> Value {
    let interface_nodes = interfaces
        .iter()
        .map(|iface| interface_node(iface, cables, services))
        .collect();

    let device_services = services
        .iter()
        .filter(|s| s.device() == Some(device.name.as_str()))
        .map(device_service_node)
        .collect();

    let mut fields = Map::new();
    fields.insert("name".into(), attr(device.name.as_str()));
    fields.insert("role".into(), attr(device.role.as_str()));
    fields.insert(
        "platform".into(),
        node(json!({
            "name": attr(device.platform.as_str()),
            "netmiko_device_type": attr(device.platform.as_str()),
        })),
    );
    fields.insert(
        "device_type".into(),
        node(json!({ "name": attr(device.device_type.as_str()) })),
    );
    if let Some(location) = &device.location {
        fields.insert(
            "location".into(),
            node(json!({ "name": attr(location.as_str()) })),
        );
    }
    fields.insert("interfaces".into(), edges(interface_nodes));
    fields.insert("device_services".into(), edges(device_services));

    json!({ "DcimDevice": { "edges": [node(Value::Object(fields))] } })
}

fn interface_node(iface: &Interface, cables: &[Cable], services: &[ServiceBinding]) -> Value {
    let endpoint = iface.endpoint();

    let addresses = iface
        .address
        .iter()
        .map(|address| json!({ "address": attr(address.as_str()) }))
        .collect();

    let interface_services = services
        .iter()
        .filter_map(|service| match service {
            ServiceBinding::Segment(segment) if segment.interfaces.contains(&endpoint) => {
                Some(segment_node(segment))
            }
            ServiceBinding::Ospf(ospf)
                if ospf.device == iface.device && ospf.interfaces.contains(&iface.name) =>
            {
                Some(json!({
                    "__typename": "ServiceOSPF",
                    "name": attr(ospf.name.as_str()),
                    "area": node(json!({ "area": attr(ospf.area) })),
                }))
            }
            _ => None,
        })
        .collect();

    let mut fields = Map::new();
    fields.insert("name".into(), attr(iface.name.as_str()));
    fields.insert("role".into(), attr(iface.role.as_str()));
    fields.insert("description".into(), attr(iface.description.clone()));
    fields.insert("status".into(), attr(iface.status.as_str()));
    fields.insert("mtu".into(), attr(iface.mtu));
    fields.insert("ip_addresses".into(), edges(addresses));
    fields.insert("interface_services".into(), edges(interface_services));

    if let Some(peer) = cables.iter().find_map(|c| c.peer_of(&endpoint)) {
        fields.insert(
            "peer".into(),
            node(json!({
                "device": attr(peer.device.as_str()),
                "interface": attr(peer.interface.as_str()),
            })),
        );
    }

    Value::Object(fields)
}

fn segment_node(segment: &NetworkSegment) -> Value {
    json!({
        "__typename": "ServiceNetworkSegment",
        "name": attr(segment.name.as_str()),
        "vlan_id": attr(segment.vlan_id),
        "customer_name": attr(segment.customer_name.clone()),
        "segment_type": attr(segment.segment_type.as_str()),
        "external_routing": attr(segment.external_routing),
    })
}

fn device_service_node(service: &ServiceBinding) -> Value {
    match service {
        ServiceBinding::Bgp(bgp) => bgp_node(bgp),
        ServiceBinding::Ospf(ospf) => {
            let interfaces = ospf
                .interfaces
                .iter()
                .map(|name| json!({ "name": attr(name.as_str()) }))
                .collect();
            let mut fields = Map::new();
            fields.insert("__typename".into(), json!("ServiceOSPF"));
            fields.insert("name".into(), attr(ospf.name.as_str()));
            fields.insert("process_id".into(), attr(ospf.process_id));
            fields.insert("reference_bandwidth".into(), attr(ospf.reference_bandwidth));
            fields.insert("area".into(), node(json!({ "area": attr(ospf.area) })));
            if let Some(router_id) = &ospf.router_id {
                fields.insert("router_id".into(), address_node(router_id));
            }
            fields.insert("interfaces".into(), edges(interfaces));
            Value::Object(fields)
        }
        ServiceBinding::Segment(segment) => segment_node(segment),
    }
}

fn address_node(address: &str) -> Value {
    node(json!({ "address": attr(address) }))
}

fn bgp_node(bgp: &BgpSession) -> Value {
    let settings = &bgp.settings;
    let mut fields = Map::new();
    fields.insert("__typename".into(), json!("ServiceBGP"));
    fields.insert("name".into(), attr(bgp.name.as_str()));
    fields.insert("description".into(), attr(bgp.description.clone()));
    fields.insert(
        "peer_group".into(),
        node(json!({
            "name": attr(bgp.peer_group.as_str()),
            "bfd": attr(settings.bfd),
            "ebgp_multihop": attr(settings.ebgp_multihop),
            "send_community_extended": attr(settings.send_community_extended),
            "route_reflector_client": attr(settings.route_reflector_client),
            "update_source": attr(settings.update_source.clone()),
            "address_family": attr(settings.address_family.clone()),
        })),
    );
    fields.insert("local_as".into(), node(json!({ "asn": attr(bgp.local_as) })));
    fields.insert("remote_as".into(), node(json!({ "asn": attr(bgp.remote_as) })));
    if let Some(local_ip) = &bgp.local_ip {
        fields.insert("local_ip".into(), address_node(local_ip));
    }
    if let Some(remote_ip) = &bgp.remote_ip {
        fields.insert("remote_ip".into(), address_node(remote_ip));
    }
    if let Some(router_id) = &bgp.router_id {
        fields.insert("router_id".into(), address_node(router_id));
    }
    if let Some(interface) = &bgp.interface {
        fields.insert("interface".into(), node(json!({ "name": attr(interface.as_str()) })));
    }
    Value::Object(fields)
}
