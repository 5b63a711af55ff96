use std::sync::Arc;
use std::time::Duration;

use hookrelay_core::engine::{DeliveryWorker, RelayEngine};
use tokio::task::JoinHandle;

/// Spawns `pool_size` delivery workers, each looping `DeliveryWorker::process_one`
/// against the shared queue. A worker backs off briefly when the queue is empty
/// so an idle fleet doesn't spin.
pub fn spawn_worker_pool(
    engine: Arc<RelayEngine>,
    pool_size: u32,
    visibility_timeout_ms: u64,
) -> Vec<JoinHandle<()>> {
    (0..pool_size.max(1))
        .map(|id| {
            let worker = DeliveryWorker::new(Arc::clone(&engine));
            tokio::spawn(async move { run_worker_loop(id, worker, visibility_timeout_ms).await })
        })
        .collect()
}

async fn run_worker_loop(id: u32, worker: DeliveryWorker, visibility_timeout_ms: u64) {
    loop {
        match worker.process_one(visibility_timeout_ms).await {
            Ok(true) => continue,
            Ok(false) => tokio::time::sleep(Duration::from_millis(250)).await,
            Err(err) => {
                tracing::error!(worker_id = id, error = %err, "delivery worker error");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

/// Spawns a background task that runs the retention sweep on a fixed
/// interval, archiving expired deliveries and purging expired dead letters.
pub fn spawn_cleanup_sweep(engine: Arc<RelayEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match engine.run_cleanup_sweep().await {
                Ok(report) => {
                    if report.deliveries_archived > 0 || report.dlq_items_purged > 0 {
                        tracing::info!(
                            archived = report.deliveries_archived,
                            purged = report.dlq_items_purged,
                            "retention sweep completed"
                        );
                    }
                }
                Err(err) => tracing::error!(error = %err, "retention sweep failed"),
            }
        }
    })
}
