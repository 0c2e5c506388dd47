//! Integration tests for recording sessions on SQLite
//!
//! These tests verify that:
//! - Messages are persisted only while a session records
//! - Session bookkeeping (counts, equipment, sensors) is kept
//! - Recorded data survives reopening the database

use std::time::Duration;

use pretty_assertions::assert_eq;
use sensor_hub::RawMessage;
use sensor_hub::storage::{MessageStore, sqlite::SqliteBackend};
use serde_json::json;
use tempfile::tempdir;

use super::helpers::{plant_project, spawn_hub_with, temperature, wait_processed};

#[tokio::test]
async fn test_recording_session_round_trip() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("recording.db");

    let backend = SqliteBackend::new(&db_path).await.unwrap();
    let hub = spawn_hub_with(Box::new(backend), Duration::ZERO);
    hub.ingest.set_project(plant_project(&[])).await.unwrap();

    // not recorded: no session yet
    hub.ingest.submit(temperature(1, 18.0)).await.unwrap();
    wait_processed(&hub.ingest, 1).await;

    let session = hub.ingest.start_recording("plant", "Plant").await.unwrap();
    assert!(session.is_active());

    hub.ingest.submit(temperature(1, 20.0)).await.unwrap();
    hub.ingest.submit(temperature(2, 21.0)).await.unwrap();
    hub.ingest
        .submit(RawMessage::new(
            "line/a/pressure",
            json!({"value": 4.5, "unit": "bar"}),
        ))
        .await
        .unwrap();
    wait_processed(&hub.ingest, 4).await;

    let stopped = hub
        .ingest
        .stop_recording()
        .await
        .unwrap()
        .expect("a session was recording");
    assert_eq!(stopped.id, session.id);
    assert!(stopped.ended_at.is_some());
    assert_eq!(stopped.total_messages, 3);
    assert_eq!(stopped.equipment_ids, vec!["cell_1", "cell_2", "line_a"]);
    assert_eq!(stopped.sensor_types, vec!["temperature", "pressure"]);

    // not recorded: session closed
    hub.ingest.submit(temperature(1, 22.0)).await.unwrap();
    wait_processed(&hub.ingest, 5).await;

    let messages = hub.storage.query_project_messages("plant", 100).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.session_id.as_deref() == Some(session.id.as_str())));
    assert_eq!(messages[0].value, json!(20.0));
    assert_eq!(messages[0].unit, "C");

    let cell_1 = hub
        .storage
        .query_equipment_messages("plant", "cell_1", 100)
        .await
        .unwrap();
    assert_eq!(cell_1.len(), 1);

    hub.ingest.shutdown().await;
    hub.storage.shutdown().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // everything is still there after reopening
    let reopened = SqliteBackend::new(&db_path).await.unwrap();
    assert_eq!(reopened.count_messages().await.unwrap(), 3);

    let sessions = reopened.list_sessions("plant").await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].total_messages, 3);
    assert!(!sessions[0].is_active());
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_restarting_a_recording_closes_the_previous_session() {
    let temp_dir = tempdir().unwrap();
    let backend = SqliteBackend::new(temp_dir.path().join("restart.db"))
        .await
        .unwrap();
    let hub = spawn_hub_with(Box::new(backend), Duration::ZERO);

    let first = hub.ingest.start_recording("plant", "Plant").await.unwrap();
    hub.ingest.submit(temperature(1, 20.0)).await.unwrap();
    wait_processed(&hub.ingest, 1).await;

    let second = hub.ingest.start_recording("plant", "Plant").await.unwrap();
    assert_ne!(first.id, second.id);

    let sessions = hub.storage.list_sessions("plant").await.unwrap();
    assert_eq!(sessions.len(), 2);

    let closed = sessions.iter().find(|s| s.id == first.id).unwrap();
    assert!(!closed.is_active());
    assert_eq!(closed.total_messages, 1);

    let open = sessions.iter().find(|s| s.id == second.id).unwrap();
    assert!(open.is_active());

    let stats = hub.ingest.get_stats().await.unwrap();
    assert_eq!(stats.session_id.as_deref(), Some(second.id.as_str()));
}

#[tokio::test]
async fn test_ending_unknown_session_fails() {
    let temp_dir = tempdir().unwrap();
    let backend = SqliteBackend::new(temp_dir.path().join("unknown.db"))
        .await
        .unwrap();
    let hub = spawn_hub_with(Box::new(backend), Duration::ZERO);

    assert!(hub.storage.end_session("missing").await.is_err());
    assert!(hub.ingest.stop_recording().await.unwrap().is_none());
}
