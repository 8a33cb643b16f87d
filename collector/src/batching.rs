use crate::db::insert_batch;
use crate::metrics::{BATCH_SIZE, INSERT_LATENCY_SECONDS};
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use wire::TelemetryRecord;

/// What a batcher run did with the records it received.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HistoryStats {
    pub written: u64,
    pub dropped: u64,
}

/// Pending history rows plus the bookkeeping of where they ended up.
struct HistoryBatch {
    pool: SqlitePool,
    max_batch: usize,
    pending: Vec<TelemetryRecord>,
    stats: HistoryStats,
}

impl HistoryBatch {
    fn new(pool: SqlitePool, max_batch: usize) -> Self {
        Self {
            pool,
            max_batch,
            pending: Vec::with_capacity(max_batch),
            stats: HistoryStats::default(),
        }
    }

    fn room(&self) -> usize {
        self.max_batch - self.pending.len()
    }

    /// Writes everything pending. A batch the database refuses is dropped,
    /// never requeued, so a dead database cannot stall ingestion.
    async fn flush(&mut self) {
        let batch_len = self.pending.len();
        if batch_len == 0 {
            return;
        }

        debug!("Flushing {} history records", batch_len);
        BATCH_SIZE.set(batch_len as f64);

        let start = Instant::now();
        match insert_batch(&self.pool, &self.pending).await {
            Ok(()) => {
                let elapsed = start.elapsed().as_secs_f64();
                INSERT_LATENCY_SECONDS.observe(elapsed);
                self.stats.written += batch_len as u64;
                debug!("History batch written in {:.3}s", elapsed);
            }
            Err(e) => {
                self.stats.dropped += batch_len as u64;
                error!(
                    "{} history records dropped after persistent database failure: {}",
                    batch_len, e
                );
            }
        }

        self.pending.clear();
        BATCH_SIZE.set(0.0);
    }
}

/// Drains `rx` into the history table. A batch is written once it holds
/// `max_batch` records or `max_wait_ms` has passed, whichever comes first.
///
/// Returns once every sender is dropped and the remainder has been written.
pub async fn run_batcher(
    mut rx: mpsc::Receiver<TelemetryRecord>,
    pool: SqlitePool,
    max_batch: usize,
    max_wait_ms: u64,
) -> HistoryStats {
    info!(
        "History batcher started (max_batch={}, max_wait_ms={})",
        max_batch, max_wait_ms
    );

    let mut batch = HistoryBatch::new(pool, max_batch.max(1));
    let mut ticker = interval(Duration::from_millis(max_wait_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // `room()` is at least 1 here: a full batch is flushed right away
        let limit = batch.room();
        tokio::select! {
            received = rx.recv_many(&mut batch.pending, limit) => {
                if received == 0 {
                    batch.flush().await;
                    break;
                }
                if batch.room() == 0 {
                    batch.flush().await;
                }
            }
            _ = ticker.tick() => batch.flush().await,
        }
    }

    info!(
        "History batcher stopped: {} written, {} dropped",
        batch.stats.written, batch.stats.dropped
    );
    batch.stats
}
