//! Discovery inventory - which equipment and sensors a broker carries
//!
//! While discovery runs, every interpreted message is filed under its
//! `(equipment_id, sensor_type)` pair. The inventory is then grouped into one
//! [`DiscoveredNode`] per piece of equipment, which is what a dashboard shows
//! when the operator lays out a new project.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::trace;

use crate::NormalizedReading;
use crate::graph::{GraphLayout, LayoutNode, LayoutNodeData, Position};
use crate::interpreter::resolve::UNKNOWN_EQUIPMENT;

/// Columns of the grid a suggested layout is placed on
const LAYOUT_COLUMNS: usize = 4;
const LAYOUT_SPACING_X: f64 = 300.0;
const LAYOUT_SPACING_Y: f64 = 200.0;

/// One `(equipment, sensor)` pair seen on the broker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredSensor {
    pub equipment_id: String,
    pub sensor_type: String,
    pub topic: String,
    pub message_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Payload of the most recent message
    pub sample_data: Value,
}

/// All sensors of one piece of equipment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredNode {
    pub id: String,
    pub equipment_id: String,
    pub equipment_type: String,
    pub sensor_types: Vec<String>,
    pub topics: Vec<String>,
    pub sample_data: Value,
    pub message_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Base name of an equipment: text before the first `_`, else the topic root
pub fn equipment_type_of(equipment_id: &str, topic: &str) -> String {
    match equipment_id.split_once('_') {
        Some((base, _)) => base.to_lowercase(),
        None => topic
            .split('/')
            .next()
            .filter(|root| !root.is_empty())
            .unwrap_or(equipment_id)
            .to_lowercase(),
    }
}

#[derive(Debug, Default)]
struct InventoryState {
    sensors: Vec<DiscoveredSensor>,
    index: HashMap<(String, String), usize>,
}

/// Thread-safe inventory of discovered sensors
#[derive(Debug, Default)]
pub struct DiscoveryInventory {
    state: Mutex<InventoryState>,
}

impl DiscoveryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// File a reading; returns false when its equipment could not be identified
    pub fn record(&self, reading: &NormalizedReading, payload: &Value, seen_at: DateTime<Utc>) -> bool {
        if reading.equipment_id == UNKNOWN_EQUIPMENT || reading.equipment_id == "unknown" {
            trace!("skipping unidentified message on {}", reading.topic);
            return false;
        }

        let mut state = self.state.lock();
        let key = (reading.equipment_id.clone(), reading.sensor_type.clone());

        match state.index.get(&key).copied() {
            Some(slot) => {
                let sensor = &mut state.sensors[slot];
                sensor.topic = reading.topic.clone();
                sensor.message_count += 1;
                sensor.last_seen = sensor.last_seen.max(seen_at);
                sensor.first_seen = sensor.first_seen.min(seen_at);
                sensor.sample_data = payload.clone();
            }
            None => {
                trace!(
                    "discovered {} / {} on {}",
                    reading.equipment_id, reading.sensor_type, reading.topic
                );
                let slot = state.sensors.len();
                state.sensors.push(DiscoveredSensor {
                    equipment_id: reading.equipment_id.clone(),
                    sensor_type: reading.sensor_type.clone(),
                    topic: reading.topic.clone(),
                    message_count: 1,
                    first_seen: seen_at,
                    last_seen: seen_at,
                    sample_data: payload.clone(),
                });
                state.index.insert(key, slot);
            }
        }

        true
    }

    pub fn sensors(&self) -> Vec<DiscoveredSensor> {
        self.state.lock().sensors.clone()
    }

    /// Sensors grouped per equipment, in order of discovery
    pub fn nodes(&self) -> Vec<DiscoveredNode> {
        let state = self.state.lock();
        let mut nodes: Vec<DiscoveredNode> = Vec::new();
        let mut by_equipment: HashMap<&str, usize> = HashMap::new();

        for sensor in &state.sensors {
            let slot = *by_equipment
                .entry(sensor.equipment_id.as_str())
                .or_insert_with(|| {
                    nodes.push(DiscoveredNode {
                        id: format!("node_{}", sensor.equipment_id),
                        equipment_id: sensor.equipment_id.clone(),
                        equipment_type: equipment_type_of(&sensor.equipment_id, &sensor.topic),
                        sensor_types: Vec::new(),
                        topics: Vec::new(),
                        sample_data: sensor.sample_data.clone(),
                        message_count: 0,
                        first_seen: sensor.first_seen,
                        last_seen: sensor.last_seen,
                    });
                    nodes.len() - 1
                });

            let node = &mut nodes[slot];
            node.sensor_types.push(sensor.sensor_type.clone());
            if !node.topics.contains(&sensor.topic) {
                node.topics.push(sensor.topic.clone());
            }
            node.message_count += sensor.message_count;
            node.first_seen = node.first_seen.min(sensor.first_seen);
            if sensor.last_seen >= node.last_seen {
                node.last_seen = sensor.last_seen;
                node.sample_data = sensor.sample_data.clone();
            }
        }

        nodes
    }

    /// A starting layout with one node per discovered equipment and no edges
    pub fn suggested_layout(&self) -> GraphLayout {
        let nodes = self
            .nodes()
            .into_iter()
            .enumerate()
            .map(|(slot, node)| {
                let mut extra = serde_json::Map::new();
                extra.insert("topics".to_string(), json!(node.topics));
                extra.insert("sensor_types".to_string(), json!(node.sensor_types));

                LayoutNode {
                    id: node.id,
                    position: Position {
                        x: (slot % LAYOUT_COLUMNS) as f64 * LAYOUT_SPACING_X,
                        y: (slot / LAYOUT_COLUMNS) as f64 * LAYOUT_SPACING_Y,
                    },
                    data: LayoutNodeData {
                        label: Some(node.equipment_id.clone()),
                        equipment_id: node.equipment_id,
                        equipment_type: Some(node.equipment_type),
                        image_url: None,
                        extra,
                    },
                }
            })
            .collect();

        GraphLayout {
            nodes,
            edges: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything; returns how many sensors were dropped
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.sensors.len();
        state.sensors.clear();
        state.index.clear();
        removed
    }
}
