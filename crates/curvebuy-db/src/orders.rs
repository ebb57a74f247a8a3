//! Exchange order ledger

use curvebuy_core::{Address, Timestamp, UnitId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{query_err, Database, Result};

/// Stored exchange order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderRow {
    pub order_id: i64,
    pub provider: String,
    pub provider_id: String,
    pub buffer_address: String,
    pub amount_in: f64,
    pub currency_in: String,
    pub expected_amount_out: f64,
    /// Estimate at creation, null if the order was not eligible
    pub expected_compensation: Option<f64>,
    pub expected_fee: Option<f64>,
    pub is_eligible: bool,
    pub amount_out: Option<f64>,
    pub fee: Option<f64>,
    pub compensation: Option<f64>,
    pub is_done: bool,
    pub is_compensated: bool,
    pub compensation_unit: Option<String>,
    pub compensation_date: Option<i64>,
    pub creation_date: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub provider: String,
    pub provider_id: String,
    pub buffer_address: Address,
    pub amount_in: f64,
    pub currency_in: String,
    pub expected_amount_out: f64,
    pub expected_compensation: Option<f64>,
    pub expected_fee: f64,
    pub is_eligible: bool,
    pub creation_date: Timestamp,
}

/// Final figures of an order the provider completed
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub amount_out: f64,
    pub fee: f64,
    pub compensation: Option<f64>,
    pub is_compensated: bool,
}

/// Done, eligible order whose compensation has not been paid yet
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UnpaidCompensation {
    pub order_id: i64,
    pub buffer_address: String,
    pub compensation: f64,
    /// Buffer owner, if the buffer is known
    pub owner_address: Option<String>,
    pub buffer_in_work: Option<bool>,
}

impl Database {
    /// Record an order. Returns false if (provider, provider_id) is already known.
    pub async fn insert_order(&self, order: &NewOrder) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT OR IGNORE INTO orders
                (provider, provider_id, buffer_address, amount_in, currency_in,
                 expected_amount_out, expected_compensation, expected_fee, is_eligible, creation_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.provider)
        .bind(&order.provider_id)
        .bind(order.buffer_address.as_str())
        .bind(order.amount_in)
        .bind(&order.currency_in)
        .bind(order.expected_amount_out)
        .bind(order.expected_compensation)
        .bind(order.expected_fee)
        .bind(order.is_eligible)
        .bind(order.creation_date)
        .execute(self.pool())
        .await
        .map_err(query_err)?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn get_order(&self, provider: &str, provider_id: &str) -> Result<Option<OrderRow>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE provider = ? AND provider_id = ?")
            .bind(provider)
            .bind(provider_id)
            .fetch_optional(self.pool())
            .await
            .map_err(query_err)
    }

    /// Orders the provider has not completed yet, optionally for one buffer
    pub async fn open_orders(&self, buffer: Option<&Address>) -> Result<Vec<OrderRow>> {
        let rows = match buffer {
            Some(buffer) => {
                sqlx::query_as::<_, OrderRow>(
                    "SELECT * FROM orders WHERE is_done = 0 AND buffer_address = ? ORDER BY order_id",
                )
                .bind(buffer.as_str())
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE is_done = 0 ORDER BY order_id")
                    .fetch_all(self.pool())
                    .await
            }
        };
        rows.map_err(query_err)
    }

    pub async fn update_amount_in(&self, order_id: i64, amount_in: f64) -> Result<()> {
        sqlx::query("UPDATE orders SET amount_in = ? WHERE order_id = ? AND is_done = 0")
            .bind(amount_in)
            .bind(order_id)
            .execute(self.pool())
            .await
            .map_err(query_err)?;
        Ok(())
    }

    /// Mark an open order done with its final figures. Returns false if it was already done.
    pub async fn finish_order(&self, order_id: i64, update: &OrderUpdate) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE orders
            SET is_done = 1, amount_out = ?, fee = ?, compensation = ?, is_compensated = ?
            WHERE order_id = ? AND is_done = 0
            "#,
        )
        .bind(update.amount_out)
        .bind(update.fee)
        .bind(update.compensation)
        .bind(update.is_compensated)
        .bind(order_id)
        .execute(self.pool())
        .await
        .map_err(query_err)?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn unpaid_compensations(&self) -> Result<Vec<UnpaidCompensation>> {
        sqlx::query_as::<_, UnpaidCompensation>(
            r#"
            SELECT orders.order_id,
                   orders.buffer_address,
                   COALESCE(orders.compensation, 0.0) AS compensation,
                   buffer_addresses.address AS owner_address,
                   buffer_addresses.in_work AS buffer_in_work
            FROM orders
            LEFT JOIN buffer_addresses USING (buffer_address)
            WHERE orders.is_done = 1 AND orders.is_eligible = 1 AND orders.is_compensated = 0
            ORDER BY orders.order_id
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(query_err)
    }

    /// Record a successful payout. Returns false if the order was already compensated.
    pub async fn mark_compensated(
        &self,
        order_id: i64,
        unit: &UnitId,
        now: Timestamp,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE orders
            SET is_compensated = 1, compensation_unit = ?, compensation_date = ?
            WHERE order_id = ? AND is_done = 1 AND is_eligible = 1 AND is_compensated = 0
            "#,
        )
        .bind(unit.as_str())
        .bind(now)
        .bind(order_id)
        .execute(self.pool())
        .await
        .map_err(query_err)?;
        Ok(res.rows_affected() > 0)
    }

    /// Total expected compensation of orders created at or after `since`
    pub async fn expected_compensation_since(&self, since: Timestamp) -> Result<f64> {
        let (total,): (f64,) =
            sqlx::query_as("SELECT TOTAL(expected_compensation) FROM orders WHERE creation_date >= ?")
                .bind(since)
                .fetch_one(self.pool())
                .await
                .map_err(query_err)?;
        Ok(total)
    }
}
