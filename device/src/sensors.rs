use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use wire::SensorKind;

/// Number of temperature samples in the DHT22 running average
const AVERAGE_WINDOW: usize = 10;

/// Reads the ENS160 reports as WARMUP before settling
const ENS160_WARMUP_READS: u32 = 3;

/// A sensor that yields one reading per call, as wire values in schema order.
pub trait Sensor: Send + 'static {
    fn kind(&self) -> SensorKind;

    fn read(&mut self) -> Vec<String>;
}

/// Simulated DHT22 temperature/humidity sensor.
///
/// Temperature is in °C (-40..80, 0.1 resolution), humidity in %RH (0..100).
pub struct Dht22 {
    rng: StdRng,
    history: VecDeque<f64>,
}

impl Dht22 {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            history: VecDeque::with_capacity(AVERAGE_WINDOW),
        }
    }

    fn running_average(&mut self, temperature: f64) -> f64 {
        if self.history.len() == AVERAGE_WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(temperature);
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }
}

impl Default for Dht22 {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for Dht22 {
    fn kind(&self) -> SensorKind {
        SensorKind::Thermal
    }

    fn read(&mut self) -> Vec<String> {
        let temperature = if self.rng.gen_bool(0.05) {
            self.rng.gen_range(-40.0..80.0) // 5% outliers
        } else {
            self.rng.gen_range(15.0..35.0) // Indoor range
        };

        let humidity = if self.rng.gen_bool(0.05) {
            self.rng.gen_range(0.0..100.0)
        } else {
            self.rng.gen_range(30.0..80.0)
        };

        // The real sensor occasionally fails its checksum
        let status = if self.rng.gen_bool(0.02) { "ERROR" } else { "OK" };

        let average = self.running_average(temperature);

        vec![
            format!("{:.1}", temperature),
            format!("{:.1}", humidity),
            format!("{:.2}", average),
            status.to_string(),
        ]
    }
}

/// Simulated ENS160 air quality sensor.
///
/// eCO2 in ppm (400 is fresh air), TVOC in ppb, AQI on the 1..5 UBA scale.
pub struct Ens160 {
    rng: StdRng,
    reads: u32,
}

impl Ens160 {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self { rng, reads: 0 }
    }
}

impl Default for Ens160 {
    fn default() -> Self {
        Self::new()
    }
}

/// AQI band for an eCO2 level.
fn air_quality_index(eco2_ppm: u32) -> u8 {
    match eco2_ppm {
        0..=600 => 1,
        601..=800 => 2,
        801..=1000 => 3,
        1001..=1500 => 4,
        _ => 5,
    }
}

impl Sensor for Ens160 {
    fn kind(&self) -> SensorKind {
        SensorKind::AirQuality
    }

    fn read(&mut self) -> Vec<String> {
        self.reads += 1;

        let eco2: u32 = if self.rng.gen_bool(0.05) {
            self.rng.gen_range(1500..5000) // Stale air
        } else {
            self.rng.gen_range(400..1000)
        };
        let tvoc: u32 = self.rng.gen_range(0..500);
        let status = if self.reads <= ENS160_WARMUP_READS {
            "WARMUP"
        } else {
            "NORMAL"
        };

        vec![
            eco2.to_string(),
            tvoc.to_string(),
            air_quality_index(eco2).to_string(),
            status.to_string(),
        ]
    }
}
