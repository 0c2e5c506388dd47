//! Stored message and recording session rows
//!
//! Messages keep the interpreted columns that queries filter on
//! (`project_id`, `equipment_id`, `session_id`, `timestamp`) next to the
//! untouched payload, stored as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NormalizedReading;

/// One interpreted message recorded during a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub project_id: String,
    pub session_id: Option<String>,
    pub equipment_id: String,
    pub sensor_type: String,
    pub value: Value,
    pub unit: String,
    pub status: String,
    /// When the hub received the message (always UTC)
    pub timestamp: DateTime<Utc>,
    /// Timestamp as reported by the device, if any
    pub reported_at: String,
    pub topic: String,
    pub raw_payload: Value,
}

impl MessageRow {
    pub fn from_reading(
        project_id: &str,
        session_id: Option<&str>,
        reading: &NormalizedReading,
        unit: &str,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            session_id: session_id.map(str::to_string),
            equipment_id: reading.equipment_id.clone(),
            sensor_type: reading.sensor_type.clone(),
            value: reading.value.clone(),
            unit: unit.to_string(),
            status: reading.status.clone(),
            timestamp: received_at,
            reported_at: reading.timestamp.clone(),
            topic: reading.topic.clone(),
            raw_payload: reading.raw_payload.clone(),
        }
    }
}

/// A recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub project_id: String,
    pub project_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_messages: u64,
    pub equipment_ids: Vec<String>,
    pub sensor_types: Vec<String>,
}

impl SessionRow {
    pub fn start(project_id: &str, project_name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            project_name: project_name.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            total_messages: 0,
            equipment_ids: Vec::new(),
            sensor_types: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Account for a message recorded in this session
    pub fn record(&mut self, message: &MessageRow) {
        self.total_messages += 1;
        if !self.equipment_ids.contains(&message.equipment_id) {
            self.equipment_ids.push(message.equipment_id.clone());
        }
        if !self.sensor_types.contains(&message.sensor_type) {
            self.sensor_types.push(message.sensor_type.clone());
        }
    }
}
