//! Live Aggregator - latest sensor values per equipment node
//!
//! Keeps the graph shown to dashboards: one node per piece of equipment, each
//! carrying the newest reading of every sensor it reported.
//!
//! ## Layout Modes
//!
//! - **Fixed**: the project declares nodes. Only those are shown, readings for
//!   unknown equipment are ignored.
//! - **Permissive**: no nodes declared. A node is created on first sight of an
//!   equipment id and placed on a grid.
//!
//! Snapshots are pushed at most once per throttle window (500 ms by default).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

/// Minimum time between two emitted snapshots
pub const DEFAULT_EMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Grid used to place auto-provisioned nodes
const GRID_COLUMNS: usize = 5;
const GRID_SPACING_X: f64 = 250.0;
const GRID_SPACING_Y: f64 = 180.0;

const NODE_KIND: &str = "custom";

/// Node data keys owned by the aggregator; stored copies on a layout are dropped
const LIVE_KEYS: &[&str] = &[
    "equipment_id",
    "equipment_type",
    "label",
    "image_url",
    "sensors",
    "status",
    "last_updated",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Graph layout as declared by a project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphLayout {
    #[serde(default)]
    pub nodes: Vec<LayoutNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: String,
    #[serde(default)]
    pub position: Position,
    pub data: LayoutNodeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNodeData {
    pub equipment_id: String,
    #[serde(default)]
    pub equipment_type: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Anything else the dashboard stored on the node
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Edges are passed through untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Idle,
    Active,
}

/// Newest value of one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub sensor_type: String,
    pub value: Value,
    pub unit: String,
    pub timestamp: String,
    pub status: String,
}

/// The parts of a reading the aggregator keeps
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub value: Value,
    pub unit: String,
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub equipment_id: String,
    pub equipment_type: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub sensors: Vec<SensorSnapshot>,
    pub status: NodeStatus,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub position: Position,
    pub data: NodeData,
}

impl EquipmentNode {
    fn declared(node: &LayoutNode) -> Self {
        let data = &node.data;
        Self {
            id: node.id.clone(),
            kind: NODE_KIND.to_string(),
            position: node.position,
            data: NodeData {
                equipment_id: data.equipment_id.clone(),
                equipment_type: data
                    .equipment_type
                    .clone()
                    .unwrap_or_else(|| equipment_type_of(&data.equipment_id)),
                label: data
                    .label
                    .clone()
                    .unwrap_or_else(|| data.equipment_id.clone()),
                image_url: data.image_url.clone(),
                sensors: Vec::new(),
                status: NodeStatus::Idle,
                last_updated: None,
                extra: data
                    .extra
                    .iter()
                    .filter(|(key, _)| !LIVE_KEYS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            },
        }
    }

    fn provisioned(equipment_id: &str, slot: usize) -> Self {
        Self {
            id: equipment_id.to_string(),
            kind: NODE_KIND.to_string(),
            position: Position {
                x: (slot % GRID_COLUMNS) as f64 * GRID_SPACING_X,
                y: (slot / GRID_COLUMNS) as f64 * GRID_SPACING_Y,
            },
            data: NodeData {
                equipment_id: equipment_id.to_string(),
                equipment_type: equipment_type_of(equipment_id),
                label: equipment_id.to_string(),
                image_url: None,
                sensors: Vec::new(),
                status: NodeStatus::Idle,
                last_updated: None,
                extra: Map::new(),
            },
        }
    }

    fn record(&mut self, sensor_type: &str, reading: SensorReading) {
        let snapshot = SensorSnapshot {
            sensor_type: sensor_type.to_string(),
            value: reading.value,
            unit: reading.unit,
            timestamp: reading.timestamp,
            status: reading.status,
        };

        match self
            .data
            .sensors
            .iter_mut()
            .find(|s| s.sensor_type == sensor_type)
        {
            Some(existing) => *existing = snapshot,
            None => self.data.sensors.push(snapshot),
        }

        self.data.status = NodeStatus::Active;
        self.data.last_updated = Some(Utc::now());
    }
}

/// `cell_1` is a `cell`
fn equipment_type_of(equipment_id: &str) -> String {
    equipment_id
        .rsplit_once('_')
        .map_or(equipment_id, |(kind, _)| kind)
        .to_string()
}

/// Snapshot pushed to dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<EquipmentNode>,
    pub edges: Vec<GraphEdge>,
    pub last_updated: DateTime<Utc>,
    pub first_message: bool,
}

/// Admits at most one emission per interval
#[derive(Debug, Clone)]
pub struct EmitThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl EmitThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

#[derive(Debug)]
struct GraphState {
    fixed_layout: bool,
    nodes: Vec<EquipmentNode>,
    by_equipment: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    throttle: EmitThrottle,
}

#[derive(Debug)]
pub struct LiveAggregator {
    state: Mutex<GraphState>,
}

impl Default for LiveAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_EMIT_INTERVAL)
    }
}

impl LiveAggregator {
    pub fn new(emit_interval: Duration) -> Self {
        Self {
            state: Mutex::new(GraphState {
                fixed_layout: false,
                nodes: Vec::new(),
                by_equipment: HashMap::new(),
                edges: Vec::new(),
                throttle: EmitThrottle::new(emit_interval),
            }),
        }
    }

    /// Reset the graph to a project's layout
    ///
    /// A layout without nodes switches to permissive mode.
    pub fn set_project(&self, layout: &GraphLayout) {
        let mut state = self.state.lock();
        state.nodes.clear();
        state.by_equipment.clear();
        state.edges = layout.edges.clone();
        state.fixed_layout = !layout.nodes.is_empty();

        for node in &layout.nodes {
            if state.by_equipment.contains_key(&node.data.equipment_id) {
                debug!(
                    "duplicate layout node for {}, keeping the first",
                    node.data.equipment_id
                );
                continue;
            }
            let index = state.nodes.len();
            state
                .by_equipment
                .insert(node.data.equipment_id.clone(), index);
            state.nodes.push(EquipmentNode::declared(node));
        }

        debug!(
            "graph reset: {} nodes, {} edges, {} layout",
            state.nodes.len(),
            state.edges.len(),
            if state.fixed_layout { "fixed" } else { "permissive" }
        );
    }

    /// Record a reading; returns whether the graph changed
    pub fn update(&self, equipment_id: &str, sensor_type: &str, reading: SensorReading) -> bool {
        let mut state = self.state.lock();

        let index = match state.by_equipment.get(equipment_id).copied() {
            Some(index) => index,
            None if state.fixed_layout => {
                trace!("ignoring reading for undeclared equipment {equipment_id}");
                return false;
            }
            None => {
                let index = state.nodes.len();
                debug!("provisioning node for {equipment_id}");
                state
                    .nodes
                    .push(EquipmentNode::provisioned(equipment_id, index));
                state.by_equipment.insert(equipment_id.to_string(), index);
                index
            }
        };

        match state.nodes.get_mut(index) {
            Some(node) => {
                node.record(sensor_type, reading);
                true
            }
            None => false,
        }
    }

    /// Whether a snapshot may be emitted now
    pub fn should_emit(&self) -> bool {
        self.should_emit_at(Instant::now())
    }

    pub fn should_emit_at(&self, now: Instant) -> bool {
        self.state.lock().throttle.admit(now)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.lock();
        GraphSnapshot {
            nodes: state.nodes.clone(),
            edges: state.edges.clone(),
            last_updated: Utc::now(),
            first_message: !state.nodes.is_empty(),
        }
    }

    pub fn node(&self, equipment_id: &str) -> Option<EquipmentNode> {
        let state = self.state.lock();
        state
            .by_equipment
            .get(equipment_id)
            .and_then(|index| state.nodes.get(*index))
            .cloned()
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }
}
