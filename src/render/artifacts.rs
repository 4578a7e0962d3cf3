//! Topology-wide artifacts: containerlab topology and cabling matrix.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{templates, RenderError, Renderer};
use crate::models::{Cable, Device};

pub const CABLING_HEADER: &str =
    "Source Device,Source Interface,Remote Device,Remote Interface,Cable Type,Cable Status";

#[derive(Debug, Clone, Serialize)]
pub struct LabNode {
    pub name: String,
    pub kind: String,
    pub image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabLink {
    pub a_device: String,
    pub a_interface: String,
    pub b_device: String,
    pub b_interface: String,
}

/// Containerlab kind and default image for a platform
pub fn lab_kind(platform: &str) -> (&'static str, &'static str) {
    match platform {
        "arista_eos" => ("ceos", "ceos:latest"),
        "cisco_nxos" => ("cisco_n9kv", "vrnetlab/cisco_n9kv:latest"),
        "juniper_junos" => ("juniper_vjunosswitch", "vrnetlab/juniper_vjunos-switch:latest"),
        _ => ("linux", "alpine:latest"),
    }
}

/// Interface name as the lab runtime expects it ("Ethernet1" on cEOS is "eth1")
pub fn lab_interface_name(kind: &str, name: &str) -> String {
    if kind == "ceos" {
        if let Some(rest) = name.strip_prefix("Ethernet") {
            return format!("eth{}", rest.replace('/', "_"));
        }
    }
    name.to_string()
}

/// Render the containerlab topology for a set of devices and cables
pub fn render_lab_topology(
    renderer: &Renderer,
    name: &str,
    devices: &[Device],
    cables: &[Cable],
) -> Result<String, RenderError> {
    let kinds: BTreeMap<&str, &str> = devices
        .iter()
        .map(|d| (d.name.as_str(), lab_kind(d.platform.as_str()).0))
        .collect();

    let nodes: Vec<LabNode> = devices
        .iter()
        .map(|d| {
            let (kind, image) = lab_kind(d.platform.as_str());
            LabNode {
                name: d.name.clone(),
                kind: kind.to_string(),
                image: image.to_string(),
            }
        })
        .collect();

    let links: Vec<LabLink> = unique_cables(cables)
        .into_iter()
        .map(|c| {
            let kind_of = |device: &str| kinds.get(device).copied().unwrap_or_default();
            LabLink {
                a_device: c.a.device.clone(),
                a_interface: lab_interface_name(kind_of(&c.a.device), &c.a.interface),
                b_device: c.b.device.clone(),
                b_interface: lab_interface_name(kind_of(&c.b.device), &c.b.interface),
            }
        })
        .collect();

    let value = serde_json::json!({
        "name": name,
        "nodes": nodes,
        "links": links,
    });
    renderer.render_value(templates::LAB_TOPOLOGY, value)
}

/// Cables sorted by their endpoint key, each listed once
fn unique_cables(cables: &[Cable]) -> Vec<&Cable> {
    let mut by_key: BTreeMap<&str, &Cable> = BTreeMap::new();
    for cable in cables {
        by_key.entry(cable.id.as_str()).or_insert(cable);
    }
    by_key.into_values().collect()
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Cabling matrix as CSV, one row per cable
pub fn cabling_matrix(cables: &[Cable]) -> String {
    let mut out = String::from(CABLING_HEADER);
    out.push('\n');
    for cable in unique_cables(cables) {
        let row = [
            cable.a.device.as_str(),
            cable.a.interface.as_str(),
            cable.b.device.as_str(),
            cable.b.interface.as_str(),
            cable.cable_type.as_str(),
            cable.status.as_str(),
        ]
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",");
        out.push_str(&row);
        out.push('\n');
    }
    out
}
