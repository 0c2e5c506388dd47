//! End-to-end tests of the ingestion pipeline
//!
//! These tests verify that:
//! - Messages flow from the ingest queue to dashboard subscribers
//! - Alerts are raised once per breach and resolved on recovery
//! - Fixed layouts ignore undeclared equipment
//! - Throttling bounds graph updates

use std::time::Duration;

use pretty_assertions::assert_eq;
use sensor_hub::RawMessage;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::helpers::{
    eventually, plant_project, spawn_hub, spawn_hub_with, temperature, wait_processed,
};
use sensor_hub::storage::memory::MemoryBackend;

async fn next_event(rx: &mut broadcast::Receiver<std::sync::Arc<str>>) -> Value {
    let text = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event in time")
        .expect("open channel");
    serde_json::from_str(&text).expect("event is JSON")
}

#[tokio::test]
async fn test_message_reaches_subscribers() {
    let hub = spawn_hub();
    let mut events = hub.dispatcher.subscribe();

    hub.ingest.submit(temperature(1, 25.3)).await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event["type"], "graph_update");
    assert_eq!(event["data"]["first_message"], true);

    let node = &event["data"]["nodes"][0];
    assert_eq!(node["type"], "custom");
    assert_eq!(node["data"]["equipment_id"], "cell_1");
    assert_eq!(node["data"]["status"], "active");
    assert_eq!(node["data"]["sensors"][0]["sensor_type"], "temperature");
    assert_eq!(node["data"]["sensors"][0]["value"], json!(25.3));
    assert_eq!(node["data"]["sensors"][0]["unit"], "C");
}

#[tokio::test]
async fn test_alert_lifecycle_through_pipeline() {
    let hub = spawn_hub();
    let mut events = hub.dispatcher.subscribe();
    hub.ingest.set_project(plant_project(&[])).await.unwrap();

    for value in [60.0, 70.0, 30.0] {
        hub.ingest.submit(temperature(1, value)).await.unwrap();
    }

    let mut kinds = Vec::new();
    let mut alert = Value::Null;
    for _ in 0..5 {
        let event = next_event(&mut events).await;
        if event["type"] == "alert_update" {
            alert = event["data"].clone();
        }
        kinds.push(event["type"].as_str().unwrap_or_default().to_string());
    }

    assert_eq!(
        kinds,
        // the project switch publishes the empty graph first
        vec![
            "graph_update",
            "graph_update",
            "alert_update",
            "graph_update",
            "graph_update"
        ]
    );
    assert_eq!(alert["id"], "plant_cell_1_temperature_max");
    assert_eq!(alert["threshold_type"], "max");
    assert_eq!(alert["severity"], "warning");
    assert_eq!(alert["current_value"], json!(60.0));

    assert!(hub.alerts.active_alerts(None).is_empty());
    let history = hub.alerts.history(0, Some("cell_1"));
    assert_eq!(history.len(), 1);
    assert!(history[0].resolved);
}

#[tokio::test]
async fn test_suffix_threshold_matches_any_prefix() {
    let hub = spawn_hub();
    hub.ingest.set_project(plant_project(&[])).await.unwrap();

    let message = RawMessage::new("line/a/pressure", json!({"value": 12.5, "unit": "bar"}));
    hub.ingest.submit(message).await.unwrap();

    assert!(eventually(|| hub.alerts.active_alerts(None).len() == 1).await);
    let alert = &hub.alerts.active_alerts(None)[0];
    assert_eq!(alert.sensor_type, "pressure");
    assert_eq!(alert.threshold_value, 8.0);
    // 12.5 exceeds 8.0 by more than 20%
    assert_eq!(alert.severity, sensor_hub::alerts::Severity::Critical);
}

#[tokio::test]
async fn test_fixed_layout_ignores_undeclared_equipment() {
    let hub = spawn_hub();
    hub.ingest
        .set_project(plant_project(&["cell_1"]))
        .await
        .unwrap();

    hub.ingest.submit(temperature(2, 20.0)).await.unwrap();
    hub.ingest.submit(temperature(1, 20.0)).await.unwrap();

    wait_processed(&hub.ingest, 2).await;

    assert_eq!(hub.aggregator.node_count(), 1);
    let node = hub.aggregator.node("cell_1").expect("declared node");
    assert_eq!(node.id, "node-0");
    assert_eq!(node.data.label, "CELL_1");
    assert_eq!(node.data.sensors.len(), 1);
    assert!(hub.aggregator.node("cell_2").is_none());
}

#[tokio::test]
async fn test_throttle_limits_graph_updates() {
    let hub = spawn_hub_with(Box::new(MemoryBackend::default()), Duration::from_secs(60));

    for value in 0..20 {
        hub.ingest.submit(temperature(1, value as f64)).await.unwrap();
    }

    let stats = wait_processed(&hub.ingest, 20).await;
    assert_eq!(stats.graph_updates, 1);

    // the aggregator still holds the newest value
    let node = hub.aggregator.node("cell_1").unwrap();
    assert_eq!(node.data.sensors[0].value, json!(19.0));
}

#[tokio::test]
async fn test_messages_processed_in_delivery_order() {
    let hub = spawn_hub();
    let sender = hub.ingest.message_sender();

    for value in 1..=50 {
        sender.send(temperature(3, value as f64)).await.unwrap();
    }

    wait_processed(&hub.ingest, 50).await;
    let node = hub.aggregator.node("cell_3").unwrap();
    assert_eq!(node.data.sensors[0].value, json!(50.0));
}
