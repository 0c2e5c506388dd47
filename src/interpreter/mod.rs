//! Message Interpreter
//!
//! Turns an arbitrary JSON payload plus the topic it arrived on into a
//! [`NormalizedReading`]. Interpretation never fails: payloads that cannot
//! be analysed produce a low-confidence reading derived from the topic alone.
//!
//! ## Pipeline
//!
//! 1. Split the topic into segments ([`topic::TopicInfo`])
//! 2. Bucket payload fields and rank candidates ([`payload::PayloadAnalysis`])
//! 3. Resolve equipment, sensor, value, status, metadata, timestamp and
//!    confidence ([`resolve`])
//!
//! The interpreter holds no mutable state; the same input always yields the
//! same reading.

pub mod heuristics;
pub mod payload;
pub mod resolve;
pub mod topic;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{trace, warn};

use crate::NormalizedReading;

use self::payload::PayloadAnalysis;
use self::topic::TopicInfo;

/// Reasons a payload cannot be analysed
#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("payload is not a JSON object (got {0})")]
    NotAnObject(&'static str),
}

/// Topics of exactly `depth` segments use their leaf as the sensor type
///
/// This is the `{equipment_kind}/{instance}/{measurement}` layout, e.g.
/// `cell/1/temperature`. `roots` restricts the convention to topics starting
/// with one of the listed segments; empty means any root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConvention {
    pub enabled: bool,
    pub depth: usize,
    pub roots: Vec<String>,
}

impl Default for MeasurementConvention {
    fn default() -> Self {
        Self {
            enabled: true,
            depth: 3,
            roots: Vec::new(),
        }
    }
}

impl MeasurementConvention {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    fn applies_to(&self, topic: &TopicInfo<'_>) -> bool {
        self.enabled
            && topic.depth() == self.depth
            && (self.roots.is_empty() || self.roots.iter().any(|root| root == topic.root))
    }
}

/// Interpreter settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub measurement_convention: MeasurementConvention,
}

/// Hook notified with every interpretation
///
/// Lets pattern learning be attached without touching the interpreter.
pub trait PatternObserver: Send + Sync {
    fn observe(&self, topic: &str, payload: &Value, reading: &NormalizedReading);
}

/// Observer that ignores everything
pub struct NoopObserver;

impl PatternObserver for NoopObserver {
    fn observe(&self, _: &str, _: &Value, _: &NormalizedReading) {}
}

#[derive(Clone)]
pub struct MessageInterpreter {
    config: InterpreterConfig,
    observer: Arc<dyn PatternObserver>,
}

impl Default for MessageInterpreter {
    fn default() -> Self {
        Self::new(InterpreterConfig::default())
    }
}

impl std::fmt::Debug for MessageInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageInterpreter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MessageInterpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            config,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PatternObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Interpret a message received just now
    pub fn interpret(&self, payload: &Value, topic: &str) -> NormalizedReading {
        self.interpret_at(payload, topic, Utc::now())
    }

    /// Interpret a message; `received_at` stands in for a missing payload timestamp
    pub fn interpret_at(
        &self,
        payload: &Value,
        topic: &str,
        received_at: DateTime<Utc>,
    ) -> NormalizedReading {
        let reading = match self.analyze(payload, topic, received_at) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("falling back to topic-only interpretation for {topic}: {e}");
                fallback_reading(payload, topic, received_at)
            }
        };

        trace!(
            "interpreted {topic} as {}/{} (confidence {:.2})",
            reading.equipment_id, reading.sensor_type, reading.confidence
        );

        self.observer.observe(topic, payload, &reading);
        reading
    }

    fn analyze(
        &self,
        payload: &Value,
        topic: &str,
        received_at: DateTime<Utc>,
    ) -> Result<NormalizedReading, InterpretError> {
        let fields = payload
            .as_object()
            .ok_or_else(|| InterpretError::NotAnObject(json_kind(payload)))?;

        let topic_info = TopicInfo::parse(topic);
        let analysis = PayloadAnalysis::analyze(fields);

        let equipment_id = resolve::equipment_id(&topic_info, &analysis);
        let sensor_type = resolve::sensor_type(
            &topic_info,
            &analysis,
            self.config.measurement_convention.applies_to(&topic_info),
        );
        let value = resolve::main_value(&analysis, fields);
        let status = resolve::status(&analysis, &value);
        let metadata = resolve::metadata(fields);
        let timestamp = resolve::timestamp(fields).unwrap_or_else(|| received_at.to_rfc3339());
        let confidence = resolve::confidence(&topic_info, &analysis, &equipment_id, &sensor_type);

        let unit = metadata
            .get("unit")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(NormalizedReading {
            display_name: display_name(&equipment_id, &sensor_type),
            equipment_id,
            sensor_type,
            value,
            unit,
            status,
            timestamp,
            topic: topic.to_string(),
            confidence,
            metadata,
            raw_payload: payload.clone(),
        })
    }
}

/// Minimal reading built from the topic when the payload can't be analysed
fn fallback_reading(payload: &Value, topic: &str, received_at: DateTime<Utc>) -> NormalizedReading {
    let (equipment_id, sensor_type) = match (topic.split('/').next(), topic.rsplit('/').next()) {
        (Some(first), Some(last)) if topic.contains('/') => (first.to_string(), last.to_string()),
        _ => ("unknown".to_string(), resolve::GENERIC_SENSOR.to_string()),
    };

    let value = match payload {
        Value::Object(fields) => fields.values().next().cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    };

    NormalizedReading {
        display_name: display_name(&equipment_id, &sensor_type),
        equipment_id,
        sensor_type,
        value,
        unit: String::new(),
        status: "unknown".to_string(),
        timestamp: received_at.to_rfc3339(),
        topic: topic.to_string(),
        confidence: resolve::CONFIDENCE_FLOOR,
        metadata: Map::new(),
        raw_payload: payload.clone(),
    }
}

fn display_name(equipment_id: &str, sensor_type: &str) -> String {
    format!("{equipment_id} {sensor_type}")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn interprets_hierarchical_topic() {
        let interpreter = MessageInterpreter::default();
        let reading = interpreter.interpret_at(
            &json!({"value": 25.3, "unit": "C"}),
            "cell/1/temperature",
            fixed_time(),
        );

        assert_eq!(reading.equipment_id, "cell_1");
        assert_eq!(reading.sensor_type, "temperature");
        assert_eq!(reading.value, json!(25.3));
        assert_eq!(reading.unit, "C");
        assert_eq!(reading.status, "active");
        assert_eq!(reading.timestamp, fixed_time().to_rfc3339());
        assert_eq!(reading.display_name, "cell_1 temperature");
        assert!(reading.confidence >= 0.8);
    }

    #[test]
    fn building_topic_with_device_field() {
        let interpreter = MessageInterpreter::default();
        let reading = interpreter.interpret_at(
            &json!({"device_id": "temp_sensor_42", "reading": 21.0}),
            "sensors/building1/temperature",
            fixed_time(),
        );

        assert_eq!(reading.equipment_id, "sensors_building1");
        assert_eq!(reading.sensor_type, "temperature");
        assert_eq!(reading.value, json!(21.0));
    }

    #[test]
    fn identifier_key_fragment_outranks_short_value() {
        let interpreter = MessageInterpreter::default();
        let reading = interpreter.interpret_at(
            &json!({"label": "abc", "device_id": "x42", "value": 3}),
            "factory/temperature_readings",
            fixed_time(),
        );

        assert_eq!(reading.equipment_id, "x42");
        assert_eq!(reading.sensor_type, "temperature_readings");
    }

    #[test]
    fn nested_objects_kept_in_metadata() {
        let reading = MessageInterpreter::default().interpret_at(
            &json!({"value": 1, "calibration": {"offset": 0.2}}),
            "cell/1/temperature",
            fixed_time(),
        );

        let expected = json!({"calibration": {"offset": 0.2}});
        assert_eq!(Value::Object(reading.metadata), expected);
    }

    #[test]
    fn payload_timestamp_wins() {
        let interpreter = MessageInterpreter::default();
        let reading = interpreter.interpret_at(
            &json!({"value": 1, "timestamp": "2024-05-01T12:00:00Z"}),
            "a/b",
            fixed_time(),
        );
        assert_eq!(reading.timestamp, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn convention_can_be_disabled() {
        let interpreter = MessageInterpreter::new(InterpreterConfig {
            measurement_convention: MeasurementConvention::disabled(),
        });
        let reading = interpreter.interpret(&json!({"value": 3}), "plant/vibration/7");
        assert_eq!(reading.sensor_type, "vibration");

        let reading = MessageInterpreter::default().interpret(&json!({"value": 3}), "plant/vibration/7");
        assert_eq!(reading.sensor_type, "7");
    }

    #[test]
    fn convention_restricted_to_roots() {
        let interpreter = MessageInterpreter::new(InterpreterConfig {
            measurement_convention: MeasurementConvention {
                roots: vec!["cell".to_string()],
                ..Default::default()
            },
        });
        let reading = interpreter.interpret(&json!({"value": 3}), "plant/vibration/7");
        assert_eq!(reading.sensor_type, "vibration");
        let reading = interpreter.interpret(&json!({"value": 3}), "cell/2/7");
        assert_eq!(reading.sensor_type, "7");
    }

    #[test]
    fn non_object_payload_falls_back() {
        let interpreter = MessageInterpreter::default();
        let reading = interpreter.interpret_at(&json!([1, 2]), "line/press", fixed_time());

        assert_eq!(reading.equipment_id, "line");
        assert_eq!(reading.sensor_type, "press");
        assert_eq!(reading.value, Value::Null);
        assert_eq!(reading.status, "unknown");
        assert_eq!(reading.confidence, 0.1);
        assert_eq!(reading.display_name, "line press");

        let reading = interpreter.interpret_at(&json!("text"), "flat", fixed_time());
        assert_eq!(reading.equipment_id, "unknown");
        assert_eq!(reading.sensor_type, "sensor");
    }

    #[test]
    fn interpretation_is_deterministic() {
        let interpreter = MessageInterpreter::default();
        let payload = json!({"machine": "m1", "pressure": 4.2, "state": "ok"});
        let first = interpreter.interpret_at(&payload, "hall/press", fixed_time());
        let second = interpreter.interpret_at(&payload, "hall/press", fixed_time());
        assert_eq!(first, second);
    }

    struct CountingObserver(AtomicUsize);

    impl PatternObserver for CountingObserver {
        fn observe(&self, _: &str, _: &Value, _: &NormalizedReading) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn observer_sees_every_message() {
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        let interpreter = MessageInterpreter::default().with_observer(observer.clone());

        interpreter.interpret(&json!({"value": 1}), "a/b/c");
        interpreter.interpret(&json!(null), "a/b/c");

        assert_eq!(observer.0.load(Ordering::SeqCst), 2);
    }
}
