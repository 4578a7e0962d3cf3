use anyhow::{bail, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::models::*;
use crate::utils;

use super::row_helpers::map_interface_row;

/// Interface database operations
pub struct InterfaceRepo;

impl InterfaceRepo {
    /// Interfaces of every device in a topology
    pub async fn list_for_topology(
        pool: &Pool<Sqlite>,
        topology: &str,
        branch: &str,
    ) -> Result<Vec<Interface>> {
        let rows = sqlx::query(
            r#"
            SELECT i.device, i.name, i.role, i.address, i.description, i.mtu, i.status
            FROM interfaces i
            JOIN devices d ON d.branch = i.branch AND d.name = i.device
            WHERE i.branch = ? AND d.topology = ?
            ORDER BY i.device, i.name
            "#,
        )
        .bind(branch)
        .bind(topology)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_interface_row).collect())
    }

    /// Interfaces of one device in natural name order
    pub async fn list_for_device(
        pool: &Pool<Sqlite>,
        device: &str,
        branch: &str,
    ) -> Result<Vec<Interface>> {
        let rows = sqlx::query(
            r#"
            SELECT device, name, role, address, description, mtu, status
            FROM interfaces
            WHERE branch = ? AND device = ?
            "#,
        )
        .bind(branch)
        .bind(device)
        .fetch_all(pool)
        .await?;

        let mut interfaces: Vec<Interface> = rows.iter().map(map_interface_row).collect();
        interfaces.sort_by(|a, b| utils::natural_cmp(&a.name, &b.name));
        Ok(interfaces)
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        iface: &Interface,
        branch: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interfaces
                (branch, device, name, role, address, description, mtu, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(branch)
        .bind(&iface.device)
        .bind(&iface.name)
        .bind(&iface.role)
        .bind(&iface.address)
        .bind(&iface.description)
        .bind(iface.mtu.map(i64::from))
        .bind(&iface.status)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Write the address and description of an interface that already exists
    pub async fn update(
        conn: &mut SqliteConnection,
        iface: &Interface,
        branch: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE interfaces SET address = ?, description = ?
            WHERE branch = ? AND device = ? AND name = ?
            "#,
        )
        .bind(&iface.address)
        .bind(&iface.description)
        .bind(branch)
        .bind(&iface.device)
        .bind(&iface.name)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            bail!("Interface {} does not exist on branch {}", iface.endpoint(), branch);
        }
        Ok(())
    }
}
