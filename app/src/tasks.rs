//! Periodic order jobs and event cursor persistence

use std::sync::Arc;
use std::time::Duration;

use curvebuy_db::Database;
use orders::OrderReconciler;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Finalize completed orders every `every`
pub fn spawn_finish_orders(orders: Arc<OrderReconciler>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            match orders.finish_orders(None).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(finished = n, "finished orders"),
                Err(e) => tracing::warn!("finish_orders failed: {}", e),
            }
        }
    })
}

/// Retry unpaid compensations every `every`
pub fn spawn_pay_compensations(orders: Arc<OrderReconciler>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            match orders.pay_compensations().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(paid = n, "paid compensations"),
                Err(e) => tracing::warn!("pay_compensations failed: {}", e),
            }
        }
    })
}

/// Save every cursor the event poller reports
pub fn spawn_save_event_cursor(db: Database, mut progress: watch::Receiver<u64>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let cursor = *progress.borrow_and_update();
            if let Err(e) = db.set_event_cursor(cursor).await {
                tracing::warn!(cursor, "saving event cursor failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_cursor_is_saved() {
        let db = Database::open_in_memory().await.unwrap();
        let (tx, rx) = watch::channel(0u64);
        let task = spawn_save_event_cursor(db.clone(), rx);

        tx.send_replace(12);
        tx.send_replace(30);
        drop(tx);
        task.await.unwrap();

        assert_eq!(db.event_cursor().await.unwrap(), Some(30));
    }
}
