use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::models::*;

use super::row_helpers::map_batch_row;

/// Expansion batch log
pub struct BatchRepo;

impl BatchRepo {
    pub async fn list(
        pool: &Pool<Sqlite>,
        topology: &str,
        branch: &str,
    ) -> Result<Vec<BatchRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, topology, branch, device_count, interface_count, cable_count,
                   service_count, assignment_count, created_at
            FROM batches WHERE topology = ? AND branch = ? ORDER BY id
            "#,
        )
        .bind(topology)
        .bind(branch)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_batch_row).collect())
    }

    pub async fn record(
        conn: &mut SqliteConnection,
        batch: &ConcreteTopology,
        branch: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO batches (topology, branch, device_count, interface_count, cable_count,
                                 service_count, assignment_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&batch.name)
        .bind(branch)
        .bind(batch.devices.len() as i64)
        .bind((batch.interfaces.len() + batch.updated_interfaces.len()) as i64)
        .bind(batch.cables.len() as i64)
        .bind(batch.services.len() as i64)
        .bind(batch.assignments.len() as i64)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }
}
