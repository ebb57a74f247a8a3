//! Ledger event cursor
//!
//! Saved as the poller advances so a restart resumes from the last page
//! fetched instead of replaying the gateway's history.

use crate::{query_err, Database, Result};

const EVENT_CURSOR_KEY: &str = "event_cursor";

impl Database {
    pub async fn event_cursor(&self) -> Result<Option<u64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM sync_state WHERE key = ?")
            .bind(EVENT_CURSOR_KEY)
            .fetch_optional(self.pool())
            .await
            .map_err(query_err)?;
        Ok(row.map(|(value,)| value.max(0) as u64))
    }

    pub async fn set_event_cursor(&self, cursor: u64) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_state (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(EVENT_CURSOR_KEY)
        .bind(i64::try_from(cursor).unwrap_or(i64::MAX))
        .execute(self.pool())
        .await
        .map_err(query_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    #[tokio::test]
    async fn test_event_cursor_roundtrip() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(db.event_cursor().await.unwrap(), None);

        db.set_event_cursor(42).await.unwrap();
        db.set_event_cursor(57).await.unwrap();
        assert_eq!(db.event_cursor().await.unwrap(), Some(57));
    }
}
