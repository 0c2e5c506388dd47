//! Shared setup for the integration tests

use std::sync::Arc;
use std::time::Duration;

use sensor_hub::{
    RawMessage,
    actors::{
        discovery::DiscoveryHandle,
        dispatcher::DispatcherHandle,
        ingest::{IngestHandle, Pipeline},
        messages::IngestStats,
        storage::StorageHandle,
    },
    alerts::AlertEngine,
    config::{Project, ProjectDeclaration},
    graph::LiveAggregator,
    interpreter::MessageInterpreter,
    storage::{MessageStore, memory::MemoryBackend},
};
use serde_json::{Value, json};

/// Every actor and engine of a running hub
pub struct TestHub {
    pub ingest: IngestHandle,
    pub storage: StorageHandle,
    pub dispatcher: DispatcherHandle,
    pub aggregator: Arc<LiveAggregator>,
    pub alerts: Arc<AlertEngine>,
    pub discovery: DiscoveryHandle,
}

/// Spawn a hub over `backend`; a zero `throttle` emits a graph update per message
pub fn spawn_hub_with(backend: Box<dyn MessageStore>, throttle: Duration) -> TestHub {
    let storage = StorageHandle::spawn(backend, None, 256);
    let dispatcher = DispatcherHandle::spawn(256);
    let aggregator = Arc::new(LiveAggregator::new(throttle));
    let alerts = Arc::new(AlertEngine::default());

    let pipeline = Pipeline {
        interpreter: MessageInterpreter::default(),
        aggregator: aggregator.clone(),
        alerts: alerts.clone(),
        min_confidence: 0.0,
    };
    let ingest = IngestHandle::spawn(
        pipeline,
        dispatcher.event_sender(),
        Some(storage.clone()),
        1024,
    );

    TestHub {
        ingest,
        storage,
        dispatcher,
        aggregator,
        alerts,
        discovery: DiscoveryHandle::spawn(MessageInterpreter::default(), 256),
    }
}

/// In-memory hub emitting a graph update for every message
pub fn spawn_hub() -> TestHub {
    spawn_hub_with(Box::new(MemoryBackend::default()), Duration::ZERO)
}

/// Declaration of the `plant` project as it would arrive over the API
pub fn plant_declaration(layout_nodes: &[&str]) -> Value {
    let nodes: Vec<Value> = layout_nodes
        .iter()
        .enumerate()
        .map(|(i, equipment_id)| {
            json!({
                "id": format!("node-{i}"),
                "position": {"x": i as f64 * 100.0, "y": 0.0},
                "data": {"equipment_id": equipment_id, "label": equipment_id.to_uppercase()}
            })
        })
        .collect();

    json!({
        "id": "plant",
        "name": "Plant",
        "graph_layout": {"nodes": nodes, "edges": []},
        "alert_thresholds": [
            {"id": "cell-temp", "topic_name": "cell/1/temperature", "min_value": 10.0, "max_value": 50.0},
            {"id": "press", "topic_name": "pressure", "max_value": 8.0}
        ]
    })
}

pub fn plant_project(layout_nodes: &[&str]) -> Project {
    serde_json::from_value::<ProjectDeclaration>(plant_declaration(layout_nodes))
        .expect("valid declaration")
        .validate()
        .expect("valid thresholds")
}

/// `cell/<n>/temperature` with a numeric value in °C
pub fn temperature(cell: u32, value: f64) -> RawMessage {
    RawMessage::new(
        format!("cell/{cell}/temperature"),
        json!({"value": value, "unit": "C"}),
    )
}

/// Poll `check` until it holds or a second has passed
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Wait until the ingest actor processed at least `count` messages
pub async fn wait_processed(ingest: &IngestHandle, count: u64) -> IngestStats {
    for _ in 0..100 {
        match ingest.get_stats().await {
            Some(stats) if stats.messages_processed >= count => return stats,
            _ => {}
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("ingest actor did not process {count} messages in time");
}
