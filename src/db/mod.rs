mod batches;
mod cables;
mod device_query;
mod devices;
mod interfaces;
mod pools;
pub(crate) mod row_helpers;
mod services;
mod store_topology;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::ipam::{PoolDefinition, PoolResource};
use crate::models::*;

/// Typed error for "resource not found", so callers can downcast
/// instead of matching on message text.
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// The graph store as the expansion engine and the render pipeline see it.
/// Topology entities are scoped to a branch label; pools are shared by all branches.
#[async_trait]
pub trait TopologyStore: Send + Sync {
    /// Everything already persisted for a topology on a branch
    async fn load_inventory(&self, topology: &str, branch: &str) -> Result<Inventory>;

    /// Persist an expansion batch and its pool assignments atomically
    async fn commit_batch(&self, batch: &ConcreteTopology, branch: &str) -> Result<()>;

    /// Every pool with its persisted assignments
    async fn load_pools(&self) -> Result<Vec<PoolResource>>;

    async fn save_pool(&self, pool: &PoolDefinition) -> Result<()>;

    async fn list_devices(&self, topology: &str, branch: &str) -> Result<Vec<Device>>;

    async fn list_cables(&self, topology: &str, branch: &str) -> Result<Vec<Cable>>;

    /// One device with its interfaces, addresses, peers and services, in the
    /// nested `{"DcimDevice": {"edges": [{"node": ..}]}}` query shape
    async fn query_device(&self, name: &str, branch: &str) -> Result<Value>;
}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Open (creating if needed) the database at `db_path`
    pub async fn new(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. A single connection keeps every query on the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Save pool definitions that are not stored yet. Existing pools keep their definition.
    pub async fn seed_pools(&self, definitions: &[PoolDefinition]) -> Result<usize> {
        let mut seeded = 0;
        for definition in definitions {
            if pools::PoolRepo::get(&self.pool, &definition.id).await?.is_none() {
                pools::PoolRepo::save(&self.pool, definition).await?;
                seeded += 1;
            }
        }
        if seeded > 0 {
            tracing::info!("Seeded {} address pools", seeded);
        }
        Ok(seeded)
    }
}
