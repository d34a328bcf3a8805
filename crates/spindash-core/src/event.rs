//! Wire-level event model for the sensor webhook.
//!
//! The bike pushes JSON records carrying an `event` discriminator. Known kinds
//! are `powered_on`, `start_session`, `end_session`, and `new_data`; anything
//! else decodes to [`SensorEvent::Unknown`] so the coordinator can answer
//! "not understood" without mutating state. Missing or mistyped required
//! fields are a [`MalformedPayload`](crate::error::IngestError::MalformedPayload)
//! rejection instead.

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// One telemetry sample as reported by the bike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Sample time, unix seconds.
    pub timestamp: i64,
    /// Road-equivalent speed in miles per hour.
    pub speed_mph: f64,
    /// Magnetic resistance level. Absent on device variants that do not
    /// report it; absence is preserved, never coerced to zero.
    pub resistance: Option<i64>,
    /// Heart rate in beats per minute.
    pub heart_bpm: f64,
}

/// A decoded webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// The bike controller booted. Informational; no effect on any session.
    PoweredOn { t: i64 },
    /// Pedaling started: begin a fresh session, discarding the previous one.
    SessionStart {
        t: i64,
        /// Public address of the bike, captured for resistance-control
        /// authorization while the session runs.
        origin: Option<String>,
    },
    /// Pedaling stopped: close the current session.
    SessionEnd { t: i64 },
    /// A telemetry sample for the running session.
    NewData(TelemetryPoint),
    /// An `event` value this version does not recognize.
    Unknown { kind: String },
}

/// Raw wire shape. Every payload field is optional here so that field
/// validation happens per event kind, with the kind named in the error.
#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    t: Option<i64>,
    bike_mph: Option<f64>,
    resistance: Option<i64>,
    heart_bpm: Option<f64>,
    ip: Option<String>,
}

impl SensorEvent {
    /// Decode a webhook payload from a parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, IngestError> {
        let raw: RawEvent = serde_json::from_value(value)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Decode a webhook payload from its JSON text.
    pub fn from_json(body: &str) -> Result<Self, IngestError> {
        let raw: RawEvent = serde_json::from_str(body)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEvent) -> Result<Self, IngestError> {
        match raw.event.as_str() {
            "powered_on" => Ok(Self::PoweredOn {
                t: require(raw.t, "t", &raw.event)?,
            }),
            "start_session" => Ok(Self::SessionStart {
                t: require(raw.t, "t", &raw.event)?,
                origin: raw.ip,
            }),
            "end_session" => Ok(Self::SessionEnd {
                t: require(raw.t, "t", &raw.event)?,
            }),
            "new_data" => Ok(Self::NewData(TelemetryPoint {
                timestamp: require(raw.t, "t", &raw.event)?,
                speed_mph: require(raw.bike_mph, "bike_mph", &raw.event)?,
                resistance: raw.resistance,
                heart_bpm: require(raw.heart_bpm, "heart_bpm", &raw.event)?,
            })),
            _ => Ok(Self::Unknown { kind: raw.event }),
        }
    }

    /// Event kind label used in log lines.
    pub fn kind(&self) -> &str {
        match self {
            Self::PoweredOn { .. } => "powered_on",
            Self::SessionStart { .. } => "start_session",
            Self::SessionEnd { .. } => "end_session",
            Self::NewData(_) => "new_data",
            Self::Unknown { kind } => kind,
        }
    }
}

fn require<T>(field: Option<T>, name: &str, event: &str) -> Result<T, IngestError> {
    field.ok_or_else(|| {
        IngestError::MalformedPayload(format!("event '{event}' missing field `{name}`"))
    })
}
