use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};

use crate::ipam::PoolDefinition;
use crate::models::*;

use super::row_helpers::map_assignment_row;

/// Pool and pool assignment database operations
pub struct PoolRepo;

impl PoolRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<PoolDefinition>> {
        let rows = sqlx::query("SELECT id, data FROM pools ORDER BY id")
            .fetch_all(pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let data: String = row.get("data");
                serde_json::from_str(&data)
                    .with_context(|| format!("Corrupt pool definition {}", id))
            })
            .collect()
    }

    pub async fn get(pool: &Pool<Sqlite>, id: &str) -> Result<Option<PoolDefinition>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM pools WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        row.map(|(data,)| {
            serde_json::from_str(&data).with_context(|| format!("Corrupt pool definition {}", id))
        })
        .transpose()
    }

    /// Insert or replace a pool definition. Assignments are kept.
    pub async fn save(pool: &Pool<Sqlite>, definition: &PoolDefinition) -> Result<()> {
        let now = Utc::now();
        let data = serde_json::to_string(definition)?;
        sqlx::query(
            r#"
            INSERT INTO pools (id, data, created_at, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(&definition.id)
        .bind(&data)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn assignments(pool: &Pool<Sqlite>, pool_id: &str) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(
            r#"
            SELECT pool, identifier, value FROM pool_assignments
            WHERE pool = ? ORDER BY created_at, identifier
            "#,
        )
        .bind(pool_id)
        .fetch_all(pool)
        .await?;

        rows.iter().map(map_assignment_row).collect()
    }

    pub async fn insert_assignment(
        conn: &mut SqliteConnection,
        assignment: &Assignment,
    ) -> Result<()> {
        let value = serde_json::to_string(&assignment.value)?;
        sqlx::query(
            r#"
            INSERT INTO pool_assignments (pool, identifier, value, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&assignment.pool)
        .bind(&assignment.identifier)
        .bind(&value)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
