//! Resolution rules turning a parsed topic and payload into reading fields

use serde_json::{Map, Value};

use super::heuristics::{
    is_digits, is_status_key, is_timestamp_key, looks_like_datetime, looks_like_identifier,
    looks_like_topic_identifier,
};
use super::payload::PayloadAnalysis;
use super::topic::TopicInfo;

pub const UNKNOWN_EQUIPMENT: &str = "device_unknown";
pub const GENERIC_SENSOR: &str = "sensor";

const CONFIDENCE_BASE: f64 = 0.5;
pub const CONFIDENCE_FLOOR: f64 = 0.1;
const CONFIDENCE_CEILING: f64 = 1.0;

/// Equipment identifier, from the most to the least specific source
pub fn equipment_id(topic: &TopicInfo<'_>, analysis: &PayloadAnalysis<'_>) -> String {
    if let Some(instance) = topic.typed_instance() {
        return instance;
    }

    if let Some(id) = analysis.best_identifier().and_then(|c| c.value.as_str()) {
        return if is_digits(id) {
            format!("{}_{}", topic.root, id)
        } else {
            id.to_string()
        };
    }

    match topic.parts.as_slice() {
        [first, second, ..] => format!("{first}_{second}"),
        [single] if !single.is_empty() => single.to_string(),
        _ => UNKNOWN_EQUIPMENT.to_string(),
    }
}

/// Sensor type; `measurement_convention` forces the leaf segment
pub fn sensor_type(
    topic: &TopicInfo<'_>,
    analysis: &PayloadAnalysis<'_>,
    measurement_convention: bool,
) -> String {
    if measurement_convention {
        return topic.leaf.to_string();
    }

    if !topic.leaf.is_empty() {
        if !looks_like_topic_identifier(topic.leaf) {
            return topic.leaf.to_string();
        }
        if let Some(parent) = topic.second_last.filter(|s| !s.is_empty()) {
            return parent.to_string();
        }
    }

    if let Some(description) = analysis.best_description().and_then(|c| c.value.as_str()) {
        return description.to_string();
    }

    analysis
        .best_main_value()
        .map(|c| c.key.to_string())
        .unwrap_or_else(|| GENERIC_SENSOR.to_string())
}

/// The reading's main value
pub fn main_value(analysis: &PayloadAnalysis<'_>, payload: &Map<String, Value>) -> Value {
    if let Some(candidate) = analysis.best_main_value() {
        return candidate.value.clone();
    }

    if let Some((_, value)) = analysis.numeric_fields.first() {
        return (*value).clone();
    }

    let free_text = analysis
        .string_fields
        .iter()
        .find(|(key, text)| !looks_like_identifier(key, text) && !looks_like_datetime(text));
    if let Some((_, text)) = free_text {
        return Value::String(text.to_string());
    }

    payload.values().next().cloned().unwrap_or(Value::Null)
}

/// Status from an explicit status-like field, else from the sign of the value
pub fn status(analysis: &PayloadAnalysis<'_>, value: &Value) -> String {
    if let Some((_, text)) = analysis.string_fields.iter().find(|(key, _)| is_status_key(key)) {
        return text.to_string();
    }

    match value.as_f64() {
        Some(v) if v < 0.0 => "error",
        Some(v) if v == 0.0 => "idle",
        Some(_) => "active",
        None => "unknown",
    }
    .to_string()
}

/// Unit and range bounds lifted out of the payload, nested objects kept under their own key
pub fn metadata(payload: &Map<String, Value>) -> Map<String, Value> {
    let mut metadata = Map::new();

    if let Some((_, unit)) = payload.iter().find(|(key, _)| key.to_lowercase().contains("unit")) {
        let unit = match unit {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        metadata.insert("unit".to_string(), Value::String(unit));
    }

    for (key, value) in payload {
        let lower = key.to_lowercase();
        match value {
            Value::Number(_) if lower.contains("min") => {
                metadata.insert("min_value".to_string(), value.clone());
            }
            Value::Number(_) if lower.contains("max") => {
                metadata.insert("max_value".to_string(), value.clone());
            }
            _ => {}
        }
    }

    for (key, value) in payload.iter().filter(|(_, value)| value.is_object()) {
        metadata.insert(key.clone(), value.clone());
    }

    metadata
}

/// The first timestamp-like field holding a date/time string
pub fn timestamp(payload: &Map<String, Value>) -> Option<String> {
    payload.iter().find_map(|(key, value)| match value {
        Value::String(text) if is_timestamp_key(key) && looks_like_datetime(text) => {
            Some(text.clone())
        }
        _ => None,
    })
}

/// How much the interpretation can be trusted, clamped to `[0.1, 1.0]`
pub fn confidence(
    topic: &TopicInfo<'_>,
    analysis: &PayloadAnalysis<'_>,
    equipment_id: &str,
    sensor_type: &str,
) -> f64 {
    let mut score = CONFIDENCE_BASE;

    match topic.depth() {
        depth if depth >= 3 => score += 0.2,
        2 => score += 0.1,
        _ => {}
    }
    if analysis.field_count >= 3 {
        score += 0.1;
    }
    if !analysis.main_value_candidates.is_empty() {
        score += 0.1;
    }
    if !analysis.identifier_candidates.is_empty() {
        score += 0.1;
    }
    if equipment_id == UNKNOWN_EQUIPMENT {
        score -= 0.2;
    }
    if sensor_type == GENERIC_SENSOR {
        score -= 0.1;
    }

    score.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
}
