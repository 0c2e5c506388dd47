//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - All REST endpoints return correct responses
//! - Authentication middleware functions properly
//! - Project validation errors surface as 400s
//! - WebSocket streaming delivers the graph and subsequent events

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use sensor_hub::api::{ApiConfig, ApiState, spawn_api_server};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::helpers::{
    TestHub, eventually, plant_declaration, spawn_hub, temperature, wait_processed,
};

const TOKEN: &str = "test-token";

async fn spawn_test_api(hub: &TestHub) -> SocketAddr {
    let state = ApiState::new(
        hub.ingest.clone(),
        hub.storage.clone(),
        hub.aggregator.clone(),
        hub.alerts.clone(),
        hub.dispatcher.clone(),
        hub.discovery.clone(),
    );

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        auth_token: Some(TOKEN.to_string()),
        enable_cors: true,
    };

    spawn_api_server(config, state).await.unwrap()
}

async fn get(addr: SocketAddr, path: &str) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .get(format!("http://{addr}{path}"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

async fn send(
    method: reqwest::Method,
    addr: SocketAddr,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = reqwest::Client::new()
        .request(method, format!("http://{addr}{path}"))
        .bearer_auth(TOKEN);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health_endpoint() {
    let hub = spawn_hub();
    let addr = spawn_test_api(&hub).await;

    let (status, body) = get(addr, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"]["healthy"], true);
}

#[tokio::test]
async fn test_auth_is_enforced() {
    let hub = spawn_hub();
    let addr = spawn_test_api(&hub).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/v1/graph");

    let missing = client.get(&url).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let malformed = client
        .get(&url)
        .header("Authorization", TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::UNAUTHORIZED);

    let wrong = client.get(&url).bearer_auth("nope").send().await.unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
    let body: Value = wrong.json().await.unwrap();
    assert_eq!(body["error"], "invalid token");

    let query = client
        .get(format!("{url}?token={TOKEN}"))
        .send()
        .await
        .unwrap();
    assert_eq!(query.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_put_project_resets_graph() {
    let hub = spawn_hub();
    let addr = spawn_test_api(&hub).await;

    hub.ingest.submit(temperature(7, 20.0)).await.unwrap();
    wait_processed(&hub.ingest, 1).await;
    let (_, graph) = get(addr, "/api/v1/graph").await;
    assert_eq!(graph["nodes"][0]["data"]["equipment_id"], "cell_7");

    let (status, body) = send(
        reqwest::Method::PUT,
        addr,
        "/api/v1/project",
        Some(plant_declaration(&["cell_1"])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"id": "plant", "name": "Plant", "thresholds": 2, "layout_nodes": 1})
    );

    let (status, graph) = get(addr, "/api/v1/graph").await;
    assert_eq!(status, StatusCode::OK);
    let nodes = graph["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["data"]["equipment_id"], "cell_1");
    assert_eq!(nodes[0]["data"]["status"], "idle");
    assert_eq!(graph["first_message"], true);
}

#[tokio::test]
async fn test_invalid_project_is_rejected() {
    let hub = spawn_hub();
    let addr = spawn_test_api(&hub).await;

    let declaration = json!({
        "id": "broken",
        "alert_thresholds": [{"topic_name": "cell/1/temperature"}]
    });
    let (status, body) = send(
        reqwest::Method::PUT,
        addr,
        "/api/v1/project",
        Some(declaration),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("cell/1/temperature"));

    // the running project is untouched
    let stats = hub.ingest.get_stats().await.unwrap();
    assert_eq!(stats.project_id, None);
}

#[tokio::test]
async fn test_alert_endpoints() {
    let hub = spawn_hub();
    let addr = spawn_test_api(&hub).await;
    send(
        reqwest::Method::PUT,
        addr,
        "/api/v1/project",
        Some(plant_declaration(&[])),
    )
    .await;

    hub.ingest.submit(temperature(1, 5.0)).await.unwrap();
    wait_processed(&hub.ingest, 1).await;

    let (status, active) = get(addr, "/api/v1/alerts/active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["count"], 1);
    assert_eq!(active["alerts"][0]["threshold_type"], "min");
    // 5.0 is 50% below 10.0
    assert_eq!(active["alerts"][0]["severity"], "critical");

    let (_, filtered) = get(addr, "/api/v1/alerts/active?equipment_id=cell_9").await;
    assert_eq!(filtered["count"], 0);

    hub.ingest.submit(temperature(1, 25.0)).await.unwrap();
    wait_processed(&hub.ingest, 2).await;

    let (_, active) = get(addr, "/api/v1/alerts/active").await;
    assert_eq!(active["count"], 0);
    let (_, history) = get(addr, "/api/v1/alerts/history?limit=10&equipment_id=cell_1").await;
    assert_eq!(history["count"], 1);
    assert_eq!(history["alerts"][0]["resolved"], true);

    let (_, stats) = get(addr, "/api/v1/alerts/stats").await;
    assert_eq!(stats["active_count"], 0);
    assert_eq!(stats["historical_count"], 1);

    let (status, _) = send(
        reqwest::Method::DELETE,
        addr,
        "/api/v1/alerts/resolved?older_than_hours=-1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        reqwest::Method::DELETE,
        addr,
        &format!("/api/v1/alerts/resolved?older_than_hours={}", i64::MAX),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("out of range"));

    // the largest representable window keeps everything
    let (status, cleared) = send(
        reqwest::Method::DELETE,
        addr,
        "/api/v1/alerts/resolved?older_than_hours=2562047788015",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["removed"], 0);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let (status, cleared) = send(
        reqwest::Method::DELETE,
        addr,
        "/api/v1/alerts/resolved?older_than_hours=0",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["removed"], 1);
}

#[tokio::test]
async fn test_session_and_message_endpoints() {
    let hub = spawn_hub();
    let addr = spawn_test_api(&hub).await;

    // no active project and none given
    let (status, _) = send(reqwest::Method::POST, addr, "/api/v1/sessions/start", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    send(
        reqwest::Method::PUT,
        addr,
        "/api/v1/project",
        Some(plant_declaration(&[])),
    )
    .await;

    let (status, started) = send(reqwest::Method::POST, addr, "/api/v1/sessions/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["session"]["project_id"], "plant");
    assert_eq!(started["session"]["project_name"], "plant");

    for cell in [1, 2, 1] {
        hub.ingest.submit(temperature(cell, 20.0)).await.unwrap();
    }
    wait_processed(&hub.ingest, 3).await;

    let (status, stopped) = send(reqwest::Method::POST, addr, "/api/v1/sessions/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["session"]["id"], started["session"]["id"]);
    assert_eq!(stopped["session"]["total_messages"], 3);

    // stopping twice is not an error
    let (status, stopped) = send(reqwest::Method::POST, addr, "/api/v1/sessions/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["session"], Value::Null);

    let (_, messages) = get(addr, "/api/v1/projects/plant/messages?limit=2").await;
    assert_eq!(messages["count"], 2);
    assert_eq!(messages["messages"][1]["equipment_id"], "cell_1");

    let (_, cell_2) = get(addr, "/api/v1/projects/plant/equipment/cell_2/messages").await;
    assert_eq!(cell_2["equipment_id"], "cell_2");
    assert_eq!(cell_2["count"], 1);

    let (_, sessions) = get(addr, "/api/v1/projects/plant/sessions").await;
    assert_eq!(sessions["count"], 1);
    assert_eq!(sessions["sessions"][0]["equipment_ids"], json!(["cell_1", "cell_2"]));

    let (status, named) = send(
        reqwest::Method::POST,
        addr,
        "/api/v1/sessions/start",
        Some(json!({"project_id": "lab", "project_name": "Lab"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(named["session"]["project_name"], "Lab");
}

#[tokio::test]
async fn test_stats_endpoint() {
    let hub = spawn_hub();
    let addr = spawn_test_api(&hub).await;

    hub.ingest.submit(temperature(1, 20.0)).await.unwrap();
    wait_processed(&hub.ingest, 1).await;

    let (status, stats) = get(addr, "/api/v1/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["ingest"]["messages_processed"], 1);
    assert_eq!(stats["ingest"]["graph_updates"], 1);
    assert_eq!(stats["graph_nodes"], 1);
    assert_eq!(stats["storage"]["total_messages"], 0);
    assert!(stats["uptime_secs"].as_i64().unwrap() >= 0);
}

#[cfg(feature = "mqtt")]
#[tokio::test]
async fn test_discovery_endpoints() {
    let hub = spawn_hub();
    let addr = spawn_test_api(&hub).await;

    let (status, idle) = get(addr, "/api/v1/discovery").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(idle["running"], false);
    assert_eq!(idle["count"], 0);

    // nothing listens on port 1, messages are pushed by hand below
    let (status, started) = send(
        reqwest::Method::POST,
        addr,
        "/api/v1/discovery/start",
        Some(json!({"host": "127.0.0.1", "port": 1, "topic": "plant/#"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["running"], true);
    assert_eq!(started["topic"], "plant/#");

    let sender = hub.discovery.message_sender();
    for (topic, payload) in [
        ("cell/1/temperature", json!({"value": 20.5, "unit": "C"})),
        ("cell/1/humidity", json!({"value": 40})),
        ("cell/2/temperature", json!({"value": 21})),
    ] {
        sender
            .send(sensor_hub::RawMessage::new(topic, payload))
            .await
            .unwrap();
    }
    assert!(eventually(|| hub.discovery.inventory().len() == 3).await);

    let (_, discovered) = get(addr, "/api/v1/discovery").await;
    assert_eq!(discovered["count"], 2);
    let cell_1 = &discovered["discovered_nodes"][0];
    assert_eq!(cell_1["id"], "node_cell_1");
    assert_eq!(cell_1["equipment_type"], "cell");
    assert_eq!(cell_1["message_count"], 2);
    assert_eq!(
        cell_1["topics"],
        json!(["cell/1/temperature", "cell/1/humidity"])
    );

    // discovery never touches the live graph
    let (_, graph) = get(addr, "/api/v1/graph").await;
    assert_eq!(graph["nodes"], json!([]));

    let (status, layout) = get(addr, "/api/v1/discovery/layout").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(layout["nodes"].as_array().unwrap().len(), 2);

    let (status, project) = send(
        reqwest::Method::PUT,
        addr,
        "/api/v1/project",
        Some(json!({"id": "discovered", "graph_layout": layout})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(project["layout_nodes"], 2);

    let (status, stopped) = send(reqwest::Method::POST, addr, "/api/v1/discovery/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["running"], false);
    assert_eq!(stopped["count"], 2);

    let (status, cleared) = send(reqwest::Method::DELETE, addr, "/api/v1/discovery/nodes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["removed"], 3);
}

#[tokio::test]
async fn test_websocket_streams_graph_updates() {
    let hub = spawn_hub();
    let addr = spawn_test_api(&hub).await;

    let url = format!("ws://{addr}/api/v1/stream?token={TOKEN}");
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    let next_json = |message: Message| -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    };

    // current graph first
    let initial = tokio::time::timeout(Duration::from_secs(1), ws.next())
        .await
        .expect("initial frame in time")
        .unwrap()
        .unwrap();
    let initial = next_json(initial);
    assert_eq!(initial["type"], "graph_update");
    assert_eq!(initial["data"]["first_message"], false);

    assert!(eventually(|| hub.dispatcher.subscriber_count() == 1).await);
    hub.ingest.submit(temperature(4, 31.5)).await.unwrap();

    let update = tokio::time::timeout(Duration::from_secs(1), ws.next())
        .await
        .expect("update in time")
        .unwrap()
        .unwrap();
    let update = next_json(update);
    assert_eq!(update["type"], "graph_update");
    assert_eq!(update["data"]["nodes"][0]["data"]["equipment_id"], "cell_4");
    assert_eq!(
        update["data"]["nodes"][0]["data"]["sensors"][0]["value"],
        json!(31.5)
    );
}
