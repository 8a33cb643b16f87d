use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row of the `readings` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReadingRow {
    pub id: i64,
    pub kind: String,
    pub received_at: DateTime<Utc>,
    pub payload: String,
}

/// Persisted reading as returned by the history endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub kind: String,
    pub received_at: DateTime<Utc>,
    pub fields: serde_json::Value,
}

impl From<ReadingRow> for HistoryEntry {
    fn from(row: ReadingRow) -> Self {
        let fields = serde_json::from_str(&row.payload)
            .unwrap_or(serde_json::Value::String(row.payload));
        Self {
            id: row.id,
            kind: row.kind,
            received_at: row.received_at,
            fields,
        }
    }
}

/// Query string of the history endpoint. `kind` takes either the kind name
/// (`thermal`) or the sensor name (`dht22`).
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub kind: Option<String>,
    pub limit: Option<usize>,
}

/// REST API response wrapper
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub data: Vec<HistoryEntry>,
    pub total: usize,
    pub limit: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
