use std::collections::HashSet;

use fabric_forge::db::{Store, TopologyStore};
use fabric_forge::expand::{self, Expander};
use fabric_forge::ipam::{Allocator, PoolDefinition, PoolRange, PoolResource};
use fabric_forge::models::{interface_role, Cable, ConcreteTopology, DesignTemplate, DeviceRole};
use fabric_forge::pipeline;
use fabric_forge::render::Renderer;
use fabric_forge::utils;

fn fabric(leaf_count: usize) -> DesignTemplate {
    serde_json::from_value(serde_json::json!({
        "name": "DC1",
        "location": "fra1",
        "scenario": "ospf",
        "pools": {"loopback": "lo-pool", "uplink": "p2p-pool", "asn": "asn-pool"},
        "elements": [
            {"role": "spine", "count": 2,
             "device_type": {"name": "DCS-7280", "platform": "arista_eos"},
             "interface_template": "spine"},
            {"role": "leaf", "quantity": leaf_count,
             "device_type": {"name": "DCS-7050", "platform": "arista_eos"},
             "interface_template": "leaf"}
        ],
        "interface_templates": [
            {"name": "spine", "interfaces": [
                {"name": "Loopback0", "role": "loopback"},
                {"name": "Ethernet[1-4]", "role": "downlink", "mtu": 9214}
            ]},
            {"name": "leaf", "interfaces": [
                {"name": "Loopback0", "role": "loopback"},
                {"name": "Ethernet[49-50]", "role": "uplink", "mtu": 9214},
                {"name": "Ethernet1", "role": "customer"}
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

fn pool_definitions() -> Vec<PoolDefinition> {
    vec![
        PoolDefinition {
            id: "lo-pool".to_string(),
            range: PoolRange::Prefix { prefix: "10.255.0.0/24".to_string() },
            description: Some("Loopbacks".to_string()),
        },
        PoolDefinition {
            id: "p2p-pool".to_string(),
            range: PoolRange::Prefix { prefix: "10.1.0.0/24".to_string() },
            description: None,
        },
        PoolDefinition {
            id: "asn-pool".to_string(),
            range: PoolRange::Asn { start: 65000, end: 65099 },
            description: None,
        },
    ]
}

async fn setup() -> (Store, Allocator) {
    let store = Store::in_memory().await.unwrap();
    store.seed_pools(&pool_definitions()).await.unwrap();
    let allocator = Allocator::from_pools(store.load_pools().await.unwrap());
    (store, allocator)
}

fn loopbacks(topology: &ConcreteTopology) -> Vec<String> {
    topology
        .interfaces
        .iter()
        .filter(|i| i.role == interface_role::LOOPBACK)
        .filter_map(|i| i.address.clone())
        .collect()
}

#[tokio::test]
async fn two_by_two_fabric_expands_and_persists() {
    let (store, allocator) = setup().await;
    let topology = Expander::new()
        .expand_and_commit(&fabric(2), &allocator, &store, "main")
        .await
        .unwrap();

    assert_eq!(topology.devices.len(), 4);
    assert_eq!(topology.cables.len(), 4);

    for cable in &topology.cables {
        assert_eq!(Cable::new(cable.b.clone(), cable.a.clone(), &cable.cable_type), *cable);
        let roles: HashSet<_> = [&cable.a.device, &cable.b.device]
            .into_iter()
            .map(|d| topology.devices.iter().find(|x| &x.name == d).unwrap().role)
            .collect();
        assert_eq!(roles, HashSet::from([DeviceRole::Spine, DeviceRole::Leaf]));
    }

    let loopbacks = loopbacks(&topology);
    assert_eq!(loopbacks.len(), 4);
    assert_eq!(loopbacks.iter().collect::<HashSet<_>>().len(), 4);
    let (net, bcast, _) = utils::parse_cidr("10.255.0.0/24").unwrap();
    for address in &loopbacks {
        assert!(address.ends_with("/32"));
        let ip = utils::ipv4_to_u32(utils::strip_mask(address)).unwrap();
        assert!(ip > net && ip < bcast);
    }

    let address_of = |device: &str, interface: &str| {
        topology
            .interfaces
            .iter()
            .find(|i| i.device == device && i.name == interface)
            .and_then(|i| i.address.clone())
            .unwrap()
    };
    for cable in &topology.cables {
        let a = address_of(&cable.a.device, &cable.a.interface);
        let b = address_of(&cable.b.device, &cable.b.interface);
        assert!(a.ends_with("/31") && b.ends_with("/31"));
        assert_ne!(a, b);
        assert!(utils::cidr_contains(&a, &b));
    }

    assert_eq!(store.list_devices("DC1", "main").await.unwrap().len(), 4);
    assert_eq!(store.list_cables("DC1", "main").await.unwrap().len(), 4);
    assert!(store.list_devices("DC1", "staging").await.unwrap().is_empty());
}

#[tokio::test]
async fn rerun_creates_nothing() {
    let (store, allocator) = setup().await;
    let expander = Expander::new();
    expander
        .expand_and_commit(&fabric(2), &allocator, &store, "main")
        .await
        .unwrap();
    let issued = allocator.snapshot("lo-pool").await.unwrap().issued_count();

    let second = expander
        .expand_and_commit(&fabric(2), &allocator, &store, "main")
        .await
        .unwrap();
    assert!(second.is_empty());
    assert_eq!(allocator.snapshot("lo-pool").await.unwrap().issued_count(), issued);
    assert_eq!(store.list_batches("DC1", "main").await.unwrap().len(), 1);
}

#[tokio::test]
async fn restart_resumes_from_persisted_pools() {
    let (store, allocator) = setup().await;
    let first = Expander::new()
        .expand_and_commit(&fabric(2), &allocator, &store, "main")
        .await
        .unwrap();
    drop(allocator);

    let restored = Allocator::from_pools(store.load_pools().await.unwrap());
    let grown = Expander::new()
        .expand_and_commit(&fabric(3), &restored, &store, "main")
        .await
        .unwrap();

    let names: Vec<&str> = grown.devices.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["dc1-leaf-03"]);
    assert_eq!(grown.cables.len(), 2);

    let new_loopback = loopbacks(&grown);
    assert_eq!(new_loopback.len(), 1);
    assert!(!loopbacks(&first).contains(&new_loopback[0]));
}

#[tokio::test]
async fn concurrent_expansions_of_one_template_commit_once() {
    let (store, allocator) = setup().await;
    let expander = Expander::new();
    let template = fabric(2);

    let (a, b) = tokio::join!(
        expander.expand_and_commit(&template, &allocator, &store, "main"),
        expander.expand_and_commit(&template, &allocator, &store, "main"),
    );
    let created = a.unwrap().devices.len() + b.unwrap().devices.len();
    assert_eq!(created, 4);
    assert_eq!(store.list_devices("DC1", "main").await.unwrap().len(), 4);
}

#[tokio::test]
async fn rendered_fabric_has_no_validation_errors() {
    let (store, allocator) = setup().await;
    Expander::new()
        .expand_and_commit(&fabric(2), &allocator, &store, "main")
        .await
        .unwrap();

    let renderer = Renderer::new().unwrap();
    let report = pipeline::render_topology(&store, &renderer, "DC1", "main").await.unwrap();

    assert_eq!(report.devices.len(), 4);
    assert_eq!(report.failed().count(), 0);
    let findings: Vec<_> = report.findings().collect();
    assert!(findings.iter().all(|f| !f.is_error()), "{:?}", findings);

    let leaf = report.devices.iter().find(|d| d.device == "dc1-leaf-01").unwrap();
    let config = leaf.config.as_ref().unwrap();
    assert!(config.contains("hostname dc1-leaf-01"));
    assert!(config.contains("router ospf 1"));
    assert!(config.contains("Peering connection to dc1-spine-01 -> Ethernet1"));

    assert_eq!(report.cabling.lines().count(), 5);
    assert!(report.lab_topology.contains("dc1-spine-02:"));
}

#[test]
fn expansion_without_store() {
    let pools = pool_definitions()
        .into_iter()
        .map(|d| PoolResource::new(d).unwrap())
        .collect();
    let allocator = Allocator::from_pools(pools);

    let topology = tokio_test::block_on(expand::expand(&fabric(2), &allocator)).unwrap();
    assert_eq!(topology.devices.len(), 4);
    assert_eq!(topology.assignments.len(), 4 + 4);
}
