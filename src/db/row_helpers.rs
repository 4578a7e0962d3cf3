use anyhow::{anyhow, Context, Result};
use sqlx::{sqlite::SqliteRow, Row};

use crate::models::*;

/// Filter empty strings to None, for columns that store '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Map a SQLite row to a Device
pub fn map_device_row(row: &SqliteRow) -> Result<Device> {
    let role: String = row.get("role");
    Ok(Device {
        name: row.get("name"),
        role: role.parse().map_err(|e: String| anyhow!(e))?,
        platform: PlatformId::new(row.get::<String, _>("platform")),
        device_type: row.get("device_type"),
        topology: row.get("topology"),
        location: none_if_empty(row.get("location")),
    })
}

/// Map a SQLite row to an Interface
pub fn map_interface_row(row: &SqliteRow) -> Interface {
    Interface {
        device: row.get("device"),
        name: row.get("name"),
        role: row.get("role"),
        address: none_if_empty(row.get("address")),
        description: none_if_empty(row.get("description")),
        mtu: row
            .get::<Option<i64>, _>("mtu")
            .and_then(|v| u32::try_from(v).ok()),
        status: row.get("status"),
    }
}

/// Map a SQLite row to a Cable
pub fn map_cable_row(row: &SqliteRow) -> Cable {
    Cable {
        id: row.get("id"),
        a: Endpoint::new(&row.get::<String, _>("a_device"), &row.get::<String, _>("a_interface")),
        b: Endpoint::new(&row.get::<String, _>("b_device"), &row.get::<String, _>("b_interface")),
        cable_type: row.get("cable_type"),
        status: row.get("status"),
    }
}

/// Services are stored as their serialized binding
pub fn map_service_row(row: &SqliteRow) -> Result<ServiceBinding> {
    let name: String = row.get("name");
    let data: String = row.get("data");
    serde_json::from_str(&data).with_context(|| format!("Corrupt service record {}", name))
}

pub fn map_assignment_row(row: &SqliteRow) -> Result<Assignment> {
    let value: String = row.get("value");
    Ok(Assignment {
        pool: row.get("pool"),
        identifier: row.get("identifier"),
        value: serde_json::from_str(&value).context("Corrupt pool assignment")?,
    })
}

pub fn map_batch_row(row: &SqliteRow) -> BatchRecord {
    BatchRecord {
        id: row.get("id"),
        topology: row.get("topology"),
        branch: row.get("branch"),
        device_count: row.get("device_count"),
        interface_count: row.get("interface_count"),
        cable_count: row.get("cable_count"),
        service_count: row.get("service_count"),
        assignment_count: row.get("assignment_count"),
        created_at: row.get("created_at"),
    }
}
