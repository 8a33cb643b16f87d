use crate::errors::Result;
use crate::metrics::DB_FAILURES_TOTAL;
use crate::model::{HistoryEntry, ReadingRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};
use wire::{SensorKind, TelemetryRecord};

const MAX_ATTEMPTS: u32 = 5;

pub async fn make_pool(database_url: &str) -> Result<SqlitePool> {
    info!("Opening database {}", database_url);
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(10));
    if database_url.contains(":memory:") {
        // Every connection to :memory: is a separate database
        pool_options = pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        pool_options = pool_options.max_connections(5);
    }
    let pool = pool_options.connect_with(options).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Inserts `batch`, retrying transient failures with exponential backoff.
pub async fn insert_batch(pool: &SqlitePool, batch: &[TelemetryRecord]) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let payloads = batch
        .iter()
        .map(serde_json::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut attempts = 0;

    loop {
        attempts += 1;
        match insert_batch_inner(pool, batch, &payloads).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                DB_FAILURES_TOTAL.inc();
                if attempts >= MAX_ATTEMPTS || !is_transient_error(&e) {
                    error!(
                        "History insert failed permanently after {} attempts: {}",
                        attempts, e
                    );
                    return Err(e.into());
                }

                let wait_ms = 100 * 2_u64.pow(attempts - 1).min(32);
                warn!(
                    "History insert failed (attempt {}/{}), retrying in {}ms: {}",
                    attempts, MAX_ATTEMPTS, wait_ms, e
                );
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            }
        }
    }
}

async fn insert_batch_inner(
    pool: &SqlitePool,
    batch: &[TelemetryRecord],
    payloads: &[String],
) -> std::result::Result<(), sqlx::Error> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO readings (kind, received_at, payload) ");
    builder.push_values(batch.iter().zip(payloads), |mut row, (record, payload)| {
        row.push_bind(record.kind.as_str())
            .push_bind(record.received_at)
            .push_bind(payload.as_str());
    });

    builder.build().execute(pool).await?;
    Ok(())
}

pub async fn fetch_history(
    pool: &SqlitePool,
    kind: Option<SensorKind>,
    limit: usize,
) -> Result<Vec<HistoryEntry>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let rows: Vec<ReadingRow> = match kind {
        Some(kind) => {
            sqlx::query_as(
                "SELECT id, kind, received_at, payload FROM readings
                 WHERE kind = ? ORDER BY id DESC LIMIT ?",
            )
            .bind(kind.as_str())
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT id, kind, received_at, payload FROM readings
                 ORDER BY id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(HistoryEntry::from).collect())
}

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // Extended result codes keep the primary code in the low byte
            db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| {
                    let primary = code & 0xff;
                    primary == 5 || // SQLITE_BUSY
                    primary == 6 // SQLITE_LOCKED
                })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire::decode_str;

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let pool = make_pool("sqlite::memory:").await.unwrap();
        let batch = vec![
            decode_str(SensorKind::Thermal, "20,50,20,OK").unwrap(),
            decode_str(SensorKind::AirQuality, "400,120,2,NORMAL").unwrap(),
            decode_str(SensorKind::Thermal, "21,51,20.5,OK").unwrap(),
        ];

        insert_batch(&pool, &batch).await.unwrap();

        let all = fetch_history(&pool, None, 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let thermal = fetch_history(&pool, Some(SensorKind::Thermal), 10)
            .await
            .unwrap();
        assert_eq!(thermal.len(), 2);
        // Newest first
        assert_eq!(thermal[0].fields["temperature"], "21");
        assert_eq!(thermal[1].fields["temperature"], "20");
    }

    #[tokio::test]
    async fn test_fetch_respects_limit() {
        let pool = make_pool("sqlite::memory:").await.unwrap();
        let batch: Vec<_> = (0..5)
            .map(|i| decode_str(SensorKind::Thermal, &format!("{},50,20,OK", i)).unwrap())
            .collect();
        insert_batch(&pool, &batch).await.unwrap();

        let rows = fetch_history(&pool, Some(SensorKind::Thermal), 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields["temperature"], "4");
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let pool = make_pool("sqlite::memory:").await.unwrap();
        insert_batch(&pool, &[]).await.unwrap();
        assert!(fetch_history(&pool, None, 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient_error(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient_error(&sqlx::Error::RowNotFound));
    }
}
