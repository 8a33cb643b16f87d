use wire::{FieldClass, SensorKind, TelemetryRecord};

const TEMP_MIN: f64 = -40.0;
const TEMP_MAX: f64 = 80.0;
const HUMIDITY_MIN: f64 = 0.0;
const HUMIDITY_MAX: f64 = 100.0;
// ENS160 registers are 16 bit; the datasheet ranges are 400..65000 ppm and 0..65000 ppb
const ECO2_MIN: f64 = 0.0;
const ECO2_MAX: f64 = 65_000.0;
const TVOC_MIN: f64 = 0.0;
const TVOC_MAX: f64 = 65_000.0;
const AQI_MIN: f64 = 1.0;
const AQI_MAX: f64 = 5.0;

/// A measurement that was accepted but looks wrong.
#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    NotNumeric {
        field: &'static str,
        value: String,
    },
}

impl Finding {
    pub fn field(&self) -> &'static str {
        match self {
            Finding::OutOfRange { field, .. } | Finding::NotNumeric { field, .. } => field,
        }
    }
}

fn range_for(kind: SensorKind, field: &str) -> Option<(f64, f64)> {
    match (kind, field) {
        (SensorKind::Thermal, "temperature") => Some((TEMP_MIN, TEMP_MAX)),
        (SensorKind::Thermal, "humidity") => Some((HUMIDITY_MIN, HUMIDITY_MAX)),
        (SensorKind::AirQuality, "eCO2_level") => Some((ECO2_MIN, ECO2_MAX)),
        (SensorKind::AirQuality, "total_TVOC") => Some((TVOC_MIN, TVOC_MAX)),
        (SensorKind::AirQuality, "air_quality") => Some((AQI_MIN, AQI_MAX)),
        _ => None,
    }
}

/// Checks every measurement field of `record` against its physical range.
///
/// Status fields are not inspected. An empty result means the record is clean.
pub fn validate(record: &TelemetryRecord) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (spec, (_, value)) in record.kind.schema().iter().zip(&record.fields) {
        if spec.class != FieldClass::Measurement {
            continue;
        }
        let name = spec.name;

        let parsed = match value.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                findings.push(Finding::NotNumeric {
                    field: name,
                    value: value.clone(),
                });
                continue;
            }
        };

        if let Some((min, max)) = range_for(record.kind, name) {
            if parsed < min || parsed > max {
                findings.push(Finding::OutOfRange {
                    field: name,
                    value: parsed,
                    min,
                    max,
                });
            }
        }
    }

    findings
}
