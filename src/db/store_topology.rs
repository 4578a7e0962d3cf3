use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::ipam::{PoolDefinition, PoolResource};
use crate::models::*;

use super::batches::BatchRepo;
use super::cables::CableRepo;
use super::devices::DeviceRepo;
use super::interfaces::InterfaceRepo;
use super::pools::PoolRepo;
use super::services::ServiceRepo;
use super::{device_query, NotFoundError, Store, TopologyStore};

impl Store {
    // ========== Batch Operations ==========

    pub async fn list_batches(&self, topology: &str, branch: &str) -> Result<Vec<BatchRecord>> {
        BatchRepo::list(&self.pool, topology, branch).await
    }
}

#[async_trait]
impl TopologyStore for Store {
    async fn load_inventory(&self, topology: &str, branch: &str) -> Result<Inventory> {
        let mut inventory = Inventory::default();
        for device in DeviceRepo::list(&self.pool, topology, branch).await? {
            inventory.devices.insert(device.name.clone(), device);
        }
        for iface in InterfaceRepo::list_for_topology(&self.pool, topology, branch).await? {
            inventory
                .interfaces
                .insert((iface.device.clone(), iface.name.clone()), iface);
        }
        for cable in CableRepo::list(&self.pool, topology, branch).await? {
            inventory.cables.insert(cable.id.clone(), cable);
        }
        for service in ServiceRepo::list(&self.pool, topology, branch).await? {
            inventory.services.insert(service.name().to_string());
        }
        Ok(inventory)
    }

    async fn commit_batch(&self, batch: &ConcreteTopology, branch: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start batch transaction")?;

        for device in &batch.devices {
            DeviceRepo::insert(&mut *tx, device, branch)
                .await
                .with_context(|| format!("Failed to create device {}", device.name))?;
        }
        for iface in &batch.interfaces {
            InterfaceRepo::insert(&mut *tx, iface, branch)
                .await
                .with_context(|| format!("Failed to create interface {}", iface.endpoint()))?;
        }
        for iface in &batch.updated_interfaces {
            InterfaceRepo::update(&mut *tx, iface, branch)
                .await
                .with_context(|| format!("Failed to update interface {}", iface.endpoint()))?;
        }
        for cable in &batch.cables {
            CableRepo::insert(&mut *tx, cable, &batch.name, branch)
                .await
                .with_context(|| format!("Failed to create cable {}", cable.id))?;
        }
        for service in &batch.services {
            ServiceRepo::insert(&mut *tx, service, &batch.name, branch)
                .await
                .with_context(|| format!("Failed to create service {}", service.name()))?;
        }
        for assignment in &batch.assignments {
            PoolRepo::insert_assignment(&mut *tx, assignment)
                .await
                .with_context(|| {
                    format!("Failed to record {} from pool {}", assignment, assignment.pool)
                })?;
        }
        let batch_id = BatchRepo::record(&mut *tx, batch, branch).await?;

        tx.commit().await.context("Failed to commit batch")?;
        tracing::debug!(
            "Committed batch {} for {} on branch {}",
            batch_id,
            batch.name,
            branch
        );
        Ok(())
    }

    async fn load_pools(&self) -> Result<Vec<PoolResource>> {
        let mut pools = Vec::new();
        for definition in PoolRepo::list(&self.pool).await? {
            let assignments = PoolRepo::assignments(&self.pool, &definition.id).await?;
            let id = definition.id.clone();
            let pool = PoolResource::with_assignments(definition, assignments)
                .with_context(|| format!("Failed to restore pool {}", id))?;
            pools.push(pool);
        }
        Ok(pools)
    }

    async fn save_pool(&self, pool: &PoolDefinition) -> Result<()> {
        PoolResource::new(pool.clone())
            .with_context(|| format!("Refusing to save pool {}", pool.id))?;
        PoolRepo::save(&self.pool, pool).await
    }

    async fn list_devices(&self, topology: &str, branch: &str) -> Result<Vec<Device>> {
        DeviceRepo::list(&self.pool, topology, branch).await
    }

    async fn list_cables(&self, topology: &str, branch: &str) -> Result<Vec<Cable>> {
        CableRepo::list(&self.pool, topology, branch).await
    }

    async fn query_device(&self, name: &str, branch: &str) -> Result<Value> {
        let device = DeviceRepo::get(&self.pool, name, branch)
            .await?
            .ok_or_else(|| NotFoundError::new("Device", name))?;

        let interfaces = InterfaceRepo::list_for_device(&self.pool, name, branch).await?;
        let cables = CableRepo::list_for_device(&self.pool, name, branch).await?;
        let services = ServiceRepo::list_for_device(&self.pool, name, branch).await?;

        Ok(device_query::device_result(&device, &interfaces, &cables, &services))
    }
}
