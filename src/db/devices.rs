use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::models::*;

use super::row_helpers::map_device_row;

const SELECT_DEVICE: &str = r#"
    SELECT name, topology, role, platform, device_type, location
    FROM devices
"#;

/// Device database operations
pub struct DeviceRepo;

impl DeviceRepo {
    pub async fn list(pool: &Pool<Sqlite>, topology: &str, branch: &str) -> Result<Vec<Device>> {
        let rows = sqlx::query(&format!(
            "{} WHERE branch = ? AND topology = ? ORDER BY name",
            SELECT_DEVICE
        ))
        .bind(branch)
        .bind(topology)
        .fetch_all(pool)
        .await?;

        rows.iter().map(map_device_row).collect()
    }

    pub async fn get(pool: &Pool<Sqlite>, name: &str, branch: &str) -> Result<Option<Device>> {
        let row = sqlx::query(&format!("{} WHERE branch = ? AND name = ?", SELECT_DEVICE))
            .bind(branch)
            .bind(name)
            .fetch_optional(pool)
            .await?;

        row.as_ref().map(map_device_row).transpose()
    }

    pub async fn insert(conn: &mut SqliteConnection, device: &Device, branch: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO devices
                (branch, name, topology, role, platform, device_type, location,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(branch)
        .bind(&device.name)
        .bind(&device.topology)
        .bind(device.role.as_str())
        .bind(device.platform.as_str())
        .bind(&device.device_type)
        .bind(&device.location)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
