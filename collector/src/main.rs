mod batching;
mod config;
mod db;
mod errors;
mod metrics;
mod model;
mod pipeline;
mod rest;
mod store;
mod validate;

use axum::{routing::get, Router};
use config::Config;
use pipeline::Pipeline;
use std::sync::Arc;
use store::LatestStore;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting telemetry collector");
    info!("HTTP server: {}", config.http_addr);

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
        std::process::exit(1);
    }

    let mut pipeline = Pipeline::new(Arc::new(LatestStore::new()));
    let mut pool = None;
    let mut batcher_handle = None;

    if let Some(database_url) = &config.database_url {
        let db_pool = match db::make_pool(database_url).await {
            Ok(pool) => pool,
            Err(e) => {
                error!("Failed to open database: {}", e);
                std::process::exit(1);
            }
        };

        info!("History channel capacity: {}", config.channel_capacity);
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        pipeline = pipeline.with_history(tx);

        batcher_handle = Some(tokio::spawn(batching::run_batcher(
            rx,
            db_pool.clone(),
            config.batch_size,
            config.batch_timeout_ms,
        )));
        pool = Some(db_pool);
    } else {
        info!("DATABASE_URL not set, history disabled");
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(pipeline, pool));

    let listener = match tokio::net::TcpListener::bind(&config.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        }
    };

    info!("HTTP server listening on {}", config.http_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("HTTP server error: {}", e);
    }

    // The router held the last history sender; the batcher drains and exits
    if let Some(handle) = batcher_handle {
        match handle.await {
            Ok(stats) if stats.dropped > 0 => {
                error!("{} history records were never written", stats.dropped);
            }
            Ok(_) => {}
            Err(e) => error!("History batcher terminated abnormally: {}", e),
        }
    }

    info!("Shutting down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
