//! Inbound transports
//!
//! A transport turns broker deliveries into [`RawMessage`](crate::RawMessage)s.
//! Payloads that are not a JSON object never reach the ingest actor.

#[cfg(feature = "mqtt")]
pub mod mqtt;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Decode a raw payload into a JSON object
pub fn decode_payload(bytes: &[u8]) -> Result<Value, TransportError> {
    let text = std::str::from_utf8(bytes)?;
    let value: Value = serde_json::from_str(text)?;

    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Err(TransportError::NotAnObject("null")),
        Value::Bool(_) => Err(TransportError::NotAnObject("bool")),
        Value::Number(_) => Err(TransportError::NotAnObject("number")),
        Value::String(_) => Err(TransportError::NotAnObject("string")),
        Value::Array(_) => Err(TransportError::NotAnObject("array")),
    }
}

/// Subscription filter for a configured topic; empty means everything
pub fn subscription_pattern(topic: &str) -> String {
    let trimmed = topic.trim().trim_matches('/');
    if trimmed.is_empty() {
        "#".to_string()
    } else {
        trimmed.to_string()
    }
}
