use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref PAYLOADS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "collector_payloads_total",
            "Total payloads received over HTTP"
        ),
        &["kind"]
    )
    .unwrap();
    pub static ref INGESTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "collector_ingested_total",
            "Total payloads decoded and stored"
        ),
        &["kind"]
    )
    .unwrap();
    pub static ref MALFORMED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "collector_malformed_total",
            "Total payloads rejected with a field count mismatch"
        ),
        &["kind"]
    )
    .unwrap();
    pub static ref RANGE_WARNINGS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "collector_range_warnings_total",
            "Measurements accepted outside their physical range or not numeric"
        ),
        &["kind", "field"]
    )
    .unwrap();
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_db_failures_total",
        "Total history insert failures"
    ))
    .unwrap();
    pub static ref INSERT_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "collector_insert_latency_seconds",
            "Time taken to write a history batch"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
    pub static ref BATCH_SIZE: Gauge = Gauge::with_opts(Opts::new(
        "collector_batch_size",
        "Current history batch size being processed"
    ))
    .unwrap();
    pub static ref CHANNEL_FULL_TOTAL: Counter = Counter::with_opts(Opts::new(
        "collector_channel_full_total",
        "Records not persisted because the history channel was full"
    ))
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(PAYLOADS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INGESTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MALFORMED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RANGE_WARNINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DB_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INSERT_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(BATCH_SIZE.clone()))?;
    REGISTRY.register(Box::new(CHANNEL_FULL_TOTAL.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
