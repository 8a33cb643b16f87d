//! Wire format shared by the device and the collector.
//!
//! A reading travels as a single line of comma-delimited text whose field
//! order is fixed by its [`SensorKind`]. There is no escaping: a value that
//! contains the delimiter cannot be encoded.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DELIMITER: char = ',';

const THERMAL_SCHEMA: [FieldSpec; 4] = [
    FieldSpec::measurement("temperature"),
    FieldSpec::measurement("humidity"),
    FieldSpec::measurement("average"),
    FieldSpec::status("status"),
];

const AIR_QUALITY_SCHEMA: [FieldSpec; 4] = [
    FieldSpec::measurement("eCO2_level"),
    FieldSpec::measurement("total_TVOC"),
    FieldSpec::measurement("air_quality"),
    FieldSpec::status("status"),
];

/// Category of a reading. Decides the schema, the route and the validation ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// DHT22 temperature and humidity.
    Thermal,
    /// ENS160 eCO2, TVOC and air quality index.
    AirQuality,
}

impl SensorKind {
    pub const ALL: [SensorKind; 2] = [SensorKind::Thermal, SensorKind::AirQuality];

    pub fn schema(self) -> &'static [FieldSpec] {
        match self {
            SensorKind::Thermal => &THERMAL_SCHEMA,
            SensorKind::AirQuality => &AIR_QUALITY_SCHEMA,
        }
    }

    pub fn arity(self) -> usize {
        self.schema().len()
    }

    /// HTTP path the collector accepts this kind on.
    pub fn route(self) -> &'static str {
        match self {
            SensorKind::Thermal => "/dht22",
            SensorKind::AirQuality => "/ens160",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Thermal => "thermal",
            SensorKind::AirQuality => "air_quality",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown sensor kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for SensorKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thermal" | "dht22" => Ok(SensorKind::Thermal),
            "air_quality" | "ens160" => Ok(SensorKind::AirQuality),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    /// Numeric text, range-checked by the collector.
    Measurement,
    /// Free-form token such as `OK` or `WARMUP`.
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub class: FieldClass,
}

impl FieldSpec {
    const fn measurement(name: &'static str) -> Self {
        Self {
            name,
            class: FieldClass::Measurement,
        }
    }

    const fn status(name: &'static str) -> Self {
        Self {
            name,
            class: FieldClass::Status,
        }
    }
}

/// Encoded reading as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload(String);

impl RawPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RawPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decoded reading. Fields always match the schema of `kind`, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub kind: SensorKind,
    pub fields: Vec<(&'static str, String)>,
    pub received_at: DateTime<Utc>,
}

impl TelemetryRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, value)| value.as_str())
    }
}

// Serialised as `{name: value, ...}` in schema order, which is what the
// collector returns to the device.
impl Serialize for TelemetryRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{kind} expects {expected} values, got {actual}")]
    Arity {
        kind: SensorKind,
        expected: usize,
        actual: usize,
    },

    #[error("value for {field} contains the delimiter")]
    EmbeddedDelimiter { field: &'static str },

    /// Decoding trims every field, so such a value would not survive the trip.
    #[error("value for {field} has leading or trailing whitespace")]
    SurroundingWhitespace { field: &'static str },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed {kind} payload: expected {expected} fields, got {actual}")]
    Malformed {
        kind: SensorKind,
        expected: usize,
        actual: usize,
    },
}

/// Joins `values` in schema order.
pub fn encode<S: AsRef<str>>(kind: SensorKind, values: &[S]) -> Result<RawPayload, EncodeError> {
    let schema = kind.schema();
    if values.len() != schema.len() {
        return Err(EncodeError::Arity {
            kind,
            expected: schema.len(),
            actual: values.len(),
        });
    }

    let mut out = String::new();
    for (i, (spec, value)) in schema.iter().zip(values).enumerate() {
        let value = value.as_ref();
        if value.contains(DELIMITER) {
            return Err(EncodeError::EmbeddedDelimiter { field: spec.name });
        }
        if value.trim() != value {
            return Err(EncodeError::SurroundingWhitespace { field: spec.name });
        }
        if i > 0 {
            out.push(DELIMITER);
        }
        out.push_str(value);
    }

    Ok(RawPayload(out))
}

/// Splits `raw` and pairs the pieces with the schema names. No numeric
/// parsing happens here.
pub fn decode(kind: SensorKind, raw: &RawPayload) -> Result<TelemetryRecord, DecodeError> {
    decode_str(kind, raw.as_str())
}

pub fn decode_str(kind: SensorKind, raw: &str) -> Result<TelemetryRecord, DecodeError> {
    let schema = kind.schema();
    let values: Vec<&str> = raw.trim().split(DELIMITER).map(str::trim).collect();

    if values.len() != schema.len() {
        return Err(DecodeError::Malformed {
            kind,
            expected: schema.len(),
            actual: values.len(),
        });
    }

    let fields = schema
        .iter()
        .zip(values)
        .map(|(spec, value)| (spec.name, value.to_string()))
        .collect();

    Ok(TelemetryRecord {
        kind,
        fields,
        received_at: Utc::now(),
    })
}
