mod sensors;
mod uplink;

use clap::Parser;
use reqwest::header::HeaderMap;
use sensors::{Dht22, Ens160, Sensor};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uplink::{default_headers, endpoint_for, DeliveryOutcome, RetryPolicy, UplinkClient};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(about = "Reads the DHT22 and ENS160 sensors and uplinks readings to the collector")]
struct Args {
    /// Collector base URL
    #[arg(long, env = "SERVER_URL", default_value = "http://localhost:8080")]
    server_url: String,

    /// Sent as `Authorization: Bearer <key>`
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: String,

    /// Defaults to `device-<random uuid>`
    #[arg(long, env = "DEVICE_ID")]
    device_id: Option<String>,

    /// Time between readings of each sensor
    #[arg(long, env = "INTERVAL_MS", default_value_t = 5000)]
    interval_ms: u64,

    /// Total tries per reading, including the first
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, env = "BASE_BACKOFF_MS", default_value_t = 1000)]
    base_backoff_ms: u64,

    #[arg(long, env = "BACKOFF_MULTIPLIER", default_value_t = 2.0)]
    backoff_multiplier: f64,

    #[arg(long, env = "MAX_BACKOFF_MS", default_value_t = 30_000)]
    max_backoff_ms: u64,

    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 5000)]
    request_timeout_ms: u64,

    /// Seed for the simulated sensors, for reproducible runs
    #[arg(long, env = "SENSOR_SEED")]
    seed: Option<u64>,

    /// Send a single reading per sensor, then exit
    #[arg(long)]
    once: bool,
}

/// Everything a sensor task needs to deliver its readings.
struct Uplink {
    client: UplinkClient,
    headers: HeaderMap,
    policy: RetryPolicy,
    server_url: String,
    interval: Duration,
    once: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let policy = match RetryPolicy::new(
        args.max_attempts,
        Duration::from_millis(args.base_backoff_ms),
        args.backoff_multiplier,
        Duration::from_millis(args.max_backoff_ms),
        Duration::from_millis(args.request_timeout_ms),
    ) {
        Ok(policy) => policy,
        Err(e) => {
            error!("Invalid retry settings: {}", e);
            std::process::exit(2);
        }
    };

    let device_id = args
        .device_id
        .unwrap_or_else(|| format!("device-{}", Uuid::new_v4()));

    let headers = match default_headers(&args.api_key, &device_id) {
        Ok(headers) => headers,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let client = match UplinkClient::new() {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Starting device {}", device_id);
    info!("Collector: {}, interval: {}ms", args.server_url, args.interval_ms);
    info!("Retry policy: {:?}", policy);

    let uplink = Arc::new(Uplink {
        client,
        headers,
        policy,
        server_url: args.server_url,
        interval: Duration::from_millis(args.interval_ms.max(1)),
        once: args.once,
    });

    // One task per sensor so a slow delivery of one kind never delays the other
    let mut tasks = JoinSet::new();
    let (dht22, ens160) = match args.seed {
        Some(seed) => (Dht22::with_seed(seed), Ens160::with_seed(seed.wrapping_add(1))),
        None => (Dht22::default(), Ens160::default()),
    };
    tasks.spawn(run_sensor(dht22, Arc::clone(&uplink)));
    tasks.spawn(run_sensor(ens160, Arc::clone(&uplink)));

    let mut all_delivered = true;
    tokio::select! {
        _ = async {
            while let Some(result) = tasks.join_next().await {
                match result {
                    Ok(delivered) => all_delivered &= delivered,
                    Err(e) => {
                        error!("Sensor task failed: {}", e);
                        all_delivered = false;
                    }
                }
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    if uplink.once && !all_delivered {
        std::process::exit(1);
    }
}

/// Reads, encodes and delivers until shutdown. Returns whether every reading
/// was delivered.
async fn run_sensor<S: Sensor>(mut sensor: S, uplink: Arc<Uplink>) -> bool {
    let kind = sensor.kind();
    let endpoint = endpoint_for(&uplink.server_url, kind);
    let mut ticker = interval(uplink.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut delivered = 0u64;
    let mut dropped = 0u64;

    loop {
        ticker.tick().await;

        let values = sensor.read();
        let payload = match wire::encode(kind, &values) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode {} reading {:?}: {}", kind, values, e);
                dropped += 1;
                if uplink.once {
                    break;
                }
                continue;
            }
        };

        match uplink
            .client
            .send(&endpoint, &uplink.headers, &payload, &uplink.policy)
            .await
        {
            DeliveryOutcome::Delivered { body, attempts } => {
                delivered += 1;
                info!("{} reading {} delivered in {} attempt(s): {}", kind, payload, attempts, body);
            }
            DeliveryOutcome::Failed {
                reason,
                attempts_made,
            } => {
                // No offline queue: the reading is gone
                dropped += 1;
                warn!(
                    "{} reading {} dropped after {} attempt(s): {}",
                    kind, payload, attempts_made, reason
                );
            }
        }

        if (delivered + dropped) % 100 == 0 {
            info!("{}: {} delivered, {} dropped", kind, delivered, dropped);
        }

        if uplink.once {
            break;
        }
    }

    dropped == 0
}
