use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use wire::{SensorKind, TelemetryRecord};

/// Latest decoded record per sensor kind.
///
/// Records are swapped in whole under the write lock, so a reader sees either
/// the previous record or the new one.
#[derive(Debug, Default)]
pub struct LatestStore {
    records: RwLock<HashMap<SensorKind, Arc<TelemetryRecord>>>,
}

impl LatestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_latest(&self, kind: SensorKind) -> Option<Arc<TelemetryRecord>> {
        // A poisoned lock still guards complete records
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(&kind).cloned()
    }

    /// Stores `record` under its own kind, replacing any previous one.
    pub fn set_latest(&self, record: TelemetryRecord) -> Arc<TelemetryRecord> {
        let record = Arc::new(record);
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.kind, Arc::clone(&record));
        record
    }
}
