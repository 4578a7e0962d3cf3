use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::models::*;

use super::row_helpers::map_service_row;

/// Service database operations. Bindings are stored whole as JSON.
pub struct ServiceRepo;

impl ServiceRepo {
    pub async fn list(
        pool: &Pool<Sqlite>,
        topology: &str,
        branch: &str,
    ) -> Result<Vec<ServiceBinding>> {
        let rows = sqlx::query(
            "SELECT name, data FROM services WHERE branch = ? AND topology = ? ORDER BY name",
        )
        .bind(branch)
        .bind(topology)
        .fetch_all(pool)
        .await?;

        rows.iter().map(map_service_row).collect()
    }

    /// Services bound to the device directly, plus segments spanning one of its interfaces
    pub async fn list_for_device(
        pool: &Pool<Sqlite>,
        device: &str,
        branch: &str,
    ) -> Result<Vec<ServiceBinding>> {
        let rows = sqlx::query(
            r#"
            SELECT name, data FROM services
            WHERE branch = ?
              AND (device = ? OR (device IS NULL AND typename = 'ServiceNetworkSegment'))
            ORDER BY name
            "#,
        )
        .bind(branch)
        .bind(device)
        .fetch_all(pool)
        .await?;

        let mut services = Vec::new();
        for row in &rows {
            let service = map_service_row(row)?;
            if service.attaches_to(device) {
                services.push(service);
            }
        }
        Ok(services)
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        service: &ServiceBinding,
        topology: &str,
        branch: &str,
    ) -> Result<()> {
        let data = serde_json::to_string(service)?;
        sqlx::query(
            r#"
            INSERT INTO services (branch, name, topology, typename, device, data, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(branch)
        .bind(service.name())
        .bind(topology)
        .bind(service.typename())
        .bind(service.device())
        .bind(&data)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
