use crate::errors::IngestError;
use crate::metrics::{
    CHANNEL_FULL_TOTAL, INGESTED_TOTAL, MALFORMED_TOTAL, PAYLOADS_TOTAL, RANGE_WARNINGS_TOTAL,
};
use crate::store::LatestStore;
use crate::validate::{validate, Finding};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};
use wire::{decode_str, SensorKind, TelemetryRecord};

/// Decode, validate and store step for incoming payloads.
///
/// Cheap to clone; every clone shares the same store and history channel.
#[derive(Debug, Clone)]
pub struct Pipeline {
    store: Arc<LatestStore>,
    history: Option<mpsc::Sender<TelemetryRecord>>,
}

impl Pipeline {
    pub fn new(store: Arc<LatestStore>) -> Self {
        Self {
            store,
            history: None,
        }
    }

    /// Also hand every stored record to the history batcher.
    pub fn with_history(mut self, tx: mpsc::Sender<TelemetryRecord>) -> Self {
        self.history = Some(tx);
        self
    }

    pub fn ingest(&self, kind: SensorKind, raw: &str) -> Result<TelemetryRecord, IngestError> {
        PAYLOADS_TOTAL.with_label_values(&[kind.as_str()]).inc();

        let record = match decode_str(kind, raw) {
            Ok(record) => record,
            Err(e) => {
                MALFORMED_TOTAL.with_label_values(&[kind.as_str()]).inc();
                warn!("Rejected {} payload {:?}: {}", kind, raw, e);
                return Err(IngestError::Malformed(e));
            }
        };

        // Suspicious measurements are kept; they are only reported
        for finding in validate(&record) {
            RANGE_WARNINGS_TOTAL
                .with_label_values(&[kind.as_str(), finding.field()])
                .inc();
            match finding {
                Finding::OutOfRange {
                    field,
                    value,
                    min,
                    max,
                } => warn!(
                    "{} {} = {} outside [{}, {}], accepting anyway",
                    kind, field, value, min, max
                ),
                Finding::NotNumeric { field, value } => {
                    warn!("{} {} = {:?} is not numeric, accepting anyway", kind, field, value)
                }
            }
        }

        let stored = self.store.set_latest(record.clone());
        INGESTED_TOTAL.with_label_values(&[kind.as_str()]).inc();
        debug!("Stored latest {} record received at {}", kind, stored.received_at);

        if let Some(tx) = &self.history {
            match tx.try_send(record.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    CHANNEL_FULL_TOTAL.inc();
                    warn!("History channel full, {} record not persisted", kind);
                }
                Err(TrySendError::Closed(_)) => {
                    error!("History channel closed, {} record not persisted", kind);
                }
            }
        }

        Ok(record)
    }

    pub fn latest(&self, kind: SensorKind) -> Option<Arc<TelemetryRecord>> {
        self.store.get_latest(kind)
    }
}
