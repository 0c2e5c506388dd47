pub mod actors;
pub mod alerts;
pub mod api;
pub mod config;
pub mod discovery;
pub mod graph;
pub mod interpreter;
pub mod storage;
pub mod transport;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A message as handed over by the transport layer
///
/// The payload is guaranteed to be a JSON object by the transport; the core
/// imposes no further schema on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Canonical description of a single telemetry reading
///
/// Produced by the [`interpreter::MessageInterpreter`] for every message.
/// `confidence` is always within `[0.1, 1.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReading {
    pub equipment_id: String,
    pub sensor_type: String,
    pub value: Value,
    pub unit: String,
    pub status: String,
    pub timestamp: String,
    pub topic: String,
    pub confidence: f64,
    pub metadata: Map<String, Value>,
    pub raw_payload: Value,
    pub display_name: String,
}

impl NormalizedReading {
    /// The reading value as a number, if it is one
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.as_f64()
    }
}
