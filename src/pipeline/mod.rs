//! Per-device generation: query, normalize, render and validate every device of a
//! topology concurrently, then the topology-wide artifacts. One device failing
//! never stops the others.

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use crate::db::TopologyStore;
use crate::models::{Cable, Device, Finding};
use crate::normalize::{self, NormalizeError};
use crate::render::{artifacts, RenderError, Renderer};
use crate::validate;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("query failed: {0:#}")]
    Store(anyhow::Error),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Outcome for one device. Findings are kept even when rendering fails.
#[derive(Debug)]
pub struct DeviceReport {
    pub device: String,
    pub config: Result<String, DeviceError>,
    pub findings: Vec<Finding>,
}

impl DeviceReport {
    pub fn is_ok(&self) -> bool {
        self.config.is_ok()
    }
}

/// Everything generated for a topology
#[derive(Debug)]
pub struct TopologyReport {
    pub topology: String,
    pub devices: Vec<DeviceReport>,
    pub lab_topology: String,
    pub cabling: String,
}

impl TopologyReport {
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.devices.iter().flat_map(|d| d.findings.iter())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DeviceReport> {
        self.devices.iter().filter(|d| !d.is_ok())
    }
}

#[derive(Serialize)]
struct FindingsFile<'a> {
    topology: &'a str,
    findings: Vec<&'a Finding>,
    failures: Vec<FailureEntry<'a>>,
}

#[derive(Serialize)]
struct FailureEntry<'a> {
    device: &'a str,
    error: String,
}

/// Query, normalize, render and validate one device
pub async fn render_device<S>(
    store: &S,
    renderer: &Renderer,
    device: &Device,
    branch: &str,
) -> DeviceReport
where
    S: TopologyStore + ?Sized,
{
    let raw = match store.query_device(&device.name, branch).await {
        Ok(raw) => raw,
        Err(e) => return failed(device, DeviceError::Store(e)),
    };

    let context = match normalize::normalize(&raw) {
        Ok(context) => context,
        Err(e) => return failed(device, e.into()),
    };

    let findings = validate::validate(&context, device.role);
    let config = renderer
        .render(&context, &device.platform)
        .map_err(DeviceError::from);

    DeviceReport {
        device: device.name.clone(),
        config,
        findings,
    }
}

fn failed(device: &Device, error: DeviceError) -> DeviceReport {
    DeviceReport {
        device: device.name.clone(),
        config: Err(error),
        findings: Vec::new(),
    }
}

/// Render every device of a topology plus the lab topology and cabling matrix
pub async fn render_topology<S>(
    store: &S,
    renderer: &Renderer,
    topology: &str,
    branch: &str,
) -> Result<TopologyReport>
where
    S: TopologyStore + ?Sized,
{
    let devices = store
        .list_devices(topology, branch)
        .await
        .with_context(|| format!("Failed to list devices of {}", topology))?;
    let cables: Vec<Cable> = store
        .list_cables(topology, branch)
        .await
        .with_context(|| format!("Failed to list cables of {}", topology))?;

    let reports = join_all(
        devices
            .iter()
            .map(|device| render_device(store, renderer, device, branch)),
    )
    .await;

    for report in &reports {
        if let Err(e) = &report.config {
            tracing::warn!("Failed to generate config for {}: {}", report.device, e);
        }
    }

    let lab_topology =
        artifacts::render_lab_topology(renderer, &topology.to_lowercase(), &devices, &cables)
            .context("Failed to render lab topology")?;
    let cabling = artifacts::cabling_matrix(&cables);

    Ok(TopologyReport {
        topology: topology.to_string(),
        devices: reports,
        lab_topology,
        cabling,
    })
}

/// Write configs, lab topology, cabling matrix and findings under `output_dir`
pub async fn write_artifacts(report: &TopologyReport, output_dir: &str) -> Result<usize> {
    let root = Path::new(output_dir);
    let configs_dir = root.join("configs");
    tokio::fs::create_dir_all(&configs_dir)
        .await
        .with_context(|| format!("Failed to create {}", configs_dir.display()))?;

    let mut written = 0;
    for device in &report.devices {
        if let Ok(config) = &device.config {
            let safe_name = device.device.replace('/', "_");
            tokio::fs::write(configs_dir.join(format!("{}.cfg", safe_name)), config).await?;
            written += 1;
        }
    }

    let site = report.topology.to_lowercase();
    tokio::fs::write(root.join(format!("{}.clab.yml", site)), &report.lab_topology).await?;
    tokio::fs::write(root.join(format!("{}-cabling.csv", site)), &report.cabling).await?;

    let findings = FindingsFile {
        topology: &report.topology,
        findings: report.findings().collect(),
        failures: report
            .failed()
            .filter_map(|d| {
                d.config.as_ref().err().map(|e| FailureEntry {
                    device: &d.device,
                    error: e.to_string(),
                })
            })
            .collect(),
    };
    tokio::fs::write(
        root.join(format!("{}-findings.json", site)),
        serde_json::to_string_pretty(&findings)?,
    )
    .await?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipam::{Allocator, PoolDefinition, PoolRange, PoolResource};
    use crate::models::{DesignTemplate, DeviceRole, Severity};
    use crate::db::Store;
    use crate::expand::Expander;

    fn template() -> DesignTemplate {
        serde_json::from_value(serde_json::json!({
            "name": "LAB",
            "scenario": "ospf",
            "pools": {"loopback": "lo-pool", "uplink": "p2p-pool"},
            "elements": [
                {"role": "spine", "count": 1,
                 "device_type": {"name": "cEOS", "platform": "arista_eos"},
                 "interface_template": "spine"},
                {"role": "leaf", "count": 1,
                 "device_type": {"name": "cEOS", "platform": "arista_eos"},
                 "interface_template": "leaf"},
                {"role": "console", "count": 1,
                 "device_type": {"name": "OpenGear", "platform": "opengear"},
                 "interface_template": "console"}
            ],
            "interface_templates": [
                {"name": "spine", "interfaces": [
                    {"name": "Loopback0", "role": "loopback"},
                    {"name": "Ethernet1", "role": "downlink"}
                ]},
                {"name": "leaf", "interfaces": [
                    {"name": "Loopback0", "role": "loopback"},
                    {"name": "Ethernet49", "role": "uplink"}
                ]},
                {"name": "console", "interfaces": [
                    {"name": "port1", "role": "console"}
                ]}
            ],
            "cabling": [
                {"kind": "full_mesh",
                 "a_role": "spine", "a_interface_role": "downlink",
                 "b_role": "leaf", "b_interface_role": "uplink"}
            ]
        }))
        .unwrap()
    }

    async fn expanded_store() -> Store {
        let store = Store::in_memory().await.unwrap();
        let defs = vec![
            PoolDefinition {
                id: "lo-pool".to_string(),
                range: PoolRange::Prefix { prefix: "10.255.0.0/24".to_string() },
                description: None,
            },
            PoolDefinition {
                id: "p2p-pool".to_string(),
                range: PoolRange::Prefix { prefix: "10.1.0.0/24".to_string() },
                description: None,
            },
        ];
        store.seed_pools(&defs).await.unwrap();
        let pools = defs.into_iter().map(|d| PoolResource::new(d).unwrap()).collect();
        let allocator = Allocator::from_pools(pools);
        Expander::new()
            .expand_and_commit(&template(), &allocator, &store, "main")
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_render_topology_isolates_failures() {
        let store = expanded_store().await;
        let renderer = Renderer::new().unwrap();

        let report = render_topology(&store, &renderer, "LAB", "main").await.unwrap();
        assert_eq!(report.devices.len(), 3);

        let console = report.devices.iter().find(|d| d.device == "lab-console-01").unwrap();
        assert!(matches!(
            console.config,
            Err(DeviceError::Render(RenderError::UnknownPlatform { .. }))
        ));

        let leaf = report.devices.iter().find(|d| d.device == "lab-leaf-01").unwrap();
        let config = leaf.config.as_ref().unwrap();
        assert!(config.contains("hostname lab-leaf-01"));
        assert!(config.contains("interface Ethernet49"));

        assert_eq!(report.failed().count(), 1);
        assert!(report.cabling.contains("lab-leaf-01,Ethernet49,lab-spine-01,Ethernet1"));
        assert!(report.lab_topology.contains("lab-console-01:"));
        assert!(report
            .findings()
            .all(|f| f.severity == Severity::Warning || f.device == "lab-console-01"));
    }

    #[tokio::test]
    async fn test_unknown_device_is_isolated() {
        let store = expanded_store().await;
        let renderer = Renderer::new().unwrap();
        let ghost = Device {
            name: "lab-leaf-09".to_string(),
            role: DeviceRole::Leaf,
            platform: "arista_eos".into(),
            device_type: "cEOS".to_string(),
            topology: "LAB".to_string(),
            location: None,
        };
        let report = render_device(&store, &renderer, &ghost, "main").await;
        assert!(matches!(report.config, Err(DeviceError::Store(_))));
        assert!(report.findings.is_empty());
    }

    #[tokio::test]
    async fn test_write_artifacts() {
        let store = expanded_store().await;
        let renderer = Renderer::new().unwrap();
        let report = render_topology(&store, &renderer, "LAB", "main").await.unwrap();

        let dir = std::env::temp_dir().join(format!("fabric-forge-{}", uuid::Uuid::new_v4()));
        let written = write_artifacts(&report, dir.to_str().unwrap()).await.unwrap();
        assert_eq!(written, 2);
        assert!(dir.join("configs/lab-spine-01.cfg").exists());
        assert!(!dir.join("configs/lab-console-01.cfg").exists());
        assert!(dir.join("lab.clab.yml").exists());

        let raw = std::fs::read_to_string(dir.join("lab-findings.json")).unwrap();
        let findings: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(findings["failures"][0]["device"], "lab-console-01");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
