//! Buffer registry

use curvebuy_core::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::{query_err, Database, Result};

/// One buffer account per (owner, curve)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BufferRow {
    pub buffer_address: String,
    /// Owner address
    pub address: String,
    pub curve_aa: String,
    /// JSON of the buffer's contract definition
    pub definition: String,
    pub in_work: bool,
    pub creation_date: i64,
    pub last_update_date: i64,
}

impl BufferRow {
    pub fn buffer(&self) -> Address {
        Address::new(self.buffer_address.clone())
    }

    pub fn owner(&self) -> Address {
        Address::new(self.address.clone())
    }

    pub fn curve(&self) -> Address {
        Address::new(self.curve_aa.clone())
    }

    pub fn definition_json(&self) -> Value {
        serde_json::from_str(&self.definition).unwrap_or(Value::Null)
    }
}

impl Database {
    pub async fn find_buffer(&self, owner: &Address, curve: &Address) -> Result<Option<BufferRow>> {
        sqlx::query_as::<_, BufferRow>(
            "SELECT * FROM buffer_addresses WHERE address = ? AND curve_aa = ?",
        )
        .bind(owner.as_str())
        .bind(curve.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(query_err)
    }

    pub async fn get_buffer(&self, buffer: &Address) -> Result<Option<BufferRow>> {
        sqlx::query_as::<_, BufferRow>("SELECT * FROM buffer_addresses WHERE buffer_address = ?")
            .bind(buffer.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(query_err)
    }

    /// Register a new buffer in work. Re-registering an existing one is a no-op.
    pub async fn insert_buffer(
        &self,
        buffer: &Address,
        owner: &Address,
        curve: &Address,
        definition: &Value,
        now: Timestamp,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO buffer_addresses
                (buffer_address, address, curve_aa, definition, in_work, creation_date, last_update_date)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(buffer.as_str())
        .bind(owner.as_str())
        .bind(curve.as_str())
        .bind(definition.to_string())
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(query_err)?;
        Ok(())
    }

    /// Put a buffer back in work after its owner asked for it again
    pub async fn reactivate_buffer(&self, buffer: &Address, now: Timestamp) -> Result<()> {
        sqlx::query(
            "UPDATE buffer_addresses SET in_work = 1, last_update_date = ? WHERE buffer_address = ?",
        )
        .bind(now)
        .bind(buffer.as_str())
        .execute(self.pool())
        .await
        .map_err(query_err)?;
        Ok(())
    }

    pub async fn set_in_work(&self, buffer: &Address, in_work: bool) -> Result<()> {
        sqlx::query("UPDATE buffer_addresses SET in_work = ? WHERE buffer_address = ?")
            .bind(in_work)
            .bind(buffer.as_str())
            .execute(self.pool())
            .await
            .map_err(query_err)?;
        Ok(())
    }

    /// Buffers in work, optionally only those on one curve
    pub async fn buffers_in_work(&self, curve: Option<&Address>) -> Result<Vec<BufferRow>> {
        let rows = match curve {
            Some(curve) => {
                sqlx::query_as::<_, BufferRow>(
                    "SELECT * FROM buffer_addresses WHERE in_work = 1 AND curve_aa = ? ORDER BY creation_date",
                )
                .bind(curve.as_str())
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query_as::<_, BufferRow>(
                    "SELECT * FROM buffer_addresses WHERE in_work = 1 ORDER BY creation_date",
                )
                .fetch_all(self.pool())
                .await
            }
        };
        rows.map_err(query_err)
    }

    pub async fn idle_buffers(&self) -> Result<Vec<BufferRow>> {
        sqlx::query_as::<_, BufferRow>(
            "SELECT * FROM buffer_addresses WHERE in_work = 0 ORDER BY creation_date",
        )
        .fetch_all(self.pool())
        .await
        .map_err(query_err)
    }

    #[cfg(test)]
    pub(crate) async fn set_creation_date(&self, buffer: &Address, ts: Timestamp) -> Result<()> {
        sqlx::query("UPDATE buffer_addresses SET creation_date = ? WHERE buffer_address = ?")
            .bind(ts)
            .bind(buffer.as_str())
            .execute(self.pool())
            .await
            .map_err(query_err)?;
        Ok(())
    }
}
