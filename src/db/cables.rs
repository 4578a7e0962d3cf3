use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::models::*;

use super::row_helpers::map_cable_row;

const SELECT_CABLE: &str = r#"
    SELECT id, a_device, a_interface, b_device, b_interface, cable_type, status
    FROM cables
"#;

/// Cable database operations
pub struct CableRepo;

impl CableRepo {
    pub async fn list(pool: &Pool<Sqlite>, topology: &str, branch: &str) -> Result<Vec<Cable>> {
        let rows = sqlx::query(&format!(
            "{} WHERE branch = ? AND topology = ? ORDER BY id",
            SELECT_CABLE
        ))
        .bind(branch)
        .bind(topology)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_cable_row).collect())
    }

    /// Cables with either end on the device
    pub async fn list_for_device(
        pool: &Pool<Sqlite>,
        device: &str,
        branch: &str,
    ) -> Result<Vec<Cable>> {
        let rows = sqlx::query(&format!(
            "{} WHERE branch = ? AND (a_device = ? OR b_device = ?) ORDER BY id",
            SELECT_CABLE
        ))
        .bind(branch)
        .bind(device)
        .bind(device)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_cable_row).collect())
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        cable: &Cable,
        topology: &str,
        branch: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cables (branch, id, topology, a_device, a_interface, b_device, b_interface,
                                cable_type, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(branch)
        .bind(&cable.id)
        .bind(topology)
        .bind(&cable.a.device)
        .bind(&cable.a.interface)
        .bind(&cable.b.device)
        .bind(&cable.b.interface)
        .bind(&cable.cable_type)
        .bind(&cable.status)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
