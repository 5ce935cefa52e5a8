//! Synthetic temperature and humidity readings

use std::ops::RangeInclusive;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::message::Message;

/// Degrees reported by the demo sensor
pub const TEMPERATURE_RANGE: RangeInclusive<i32> = 20..=29;
/// Relative humidity percentage reported by the demo sensor
pub const HUMIDITY_RANGE: RangeInclusive<i32> = 40..=59;

const CONTENT_TYPE: &str = "application/json";
const CONTENT_ENCODING: &str = "utf-8";

/// One temperature and humidity sample
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryReading {
    /// Temperature in degrees
    pub temperature: i32,
    /// Relative humidity percentage
    pub humidity: i32,
}

impl TelemetryReading {
    /// Compact JSON payload, e.g. `{"temperature":24,"humidity":47}`
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Build the device to cloud message carrying `payload`
pub fn telemetry_message(payload: &str, sequence: usize) -> Message {
    Message::builder()
        .set_body(payload.as_bytes().to_vec())
        .set_message_id(sequence.to_string())
        .set_content_type(CONTENT_TYPE.to_owned())
        .set_content_encoding(CONTENT_ENCODING.to_owned())
        .build()
}

/// Produces uniformly distributed readings in the demo ranges
#[derive(Debug, Clone)]
pub struct TelemetrySensor {
    rng: StdRng,
}

impl Default for TelemetrySensor {
    /// Seeded from the wall clock, so runs are not reproducible
    fn default() -> Self {
        let now = Utc::now();
        Self::from_seed(((now.timestamp() as u64) << 32) ^ u64::from(now.timestamp_subsec_nanos()))
    }
}

impl TelemetrySensor {
    /// Deterministic sensor for a given seed
    pub fn from_seed(seed: u64) -> Self {
        TelemetrySensor {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Take the next reading
    pub fn get_reading(&mut self) -> TelemetryReading {
        TelemetryReading {
            temperature: self.rng.gen_range(TEMPERATURE_RANGE),
            humidity: self.rng.gen_range(HUMIDITY_RANGE),
        }
    }
}
