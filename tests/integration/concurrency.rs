//! Concurrency tests
//!
//! Many transports feed the ingest queue while readers query the engines.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use sensor_hub::alerts::{AlertEngine, AlertThreshold};
use sensor_hub::graph::{LiveAggregator, SensorReading};
use serde_json::json;

use super::helpers::{spawn_hub, temperature, wait_processed};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_and_readers() {
    let hub = spawn_hub();

    let mut producers = Vec::new();
    for cell in 0..8u32 {
        let sender = hub.ingest.message_sender();
        producers.push(tokio::spawn(async move {
            for value in 0..50 {
                sender
                    .send(temperature(cell, value as f64))
                    .await
                    .expect("ingest running");
            }
        }));
    }

    let reader = {
        let aggregator = hub.aggregator.clone();
        let alerts = hub.alerts.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                let snapshot = aggregator.snapshot();
                assert!(snapshot.nodes.len() <= 8);
                let _ = alerts.stats();
                tokio::task::yield_now().await;
            }
        })
    };

    for producer in producers {
        producer.await.unwrap();
    }
    reader.await.unwrap();

    let stats = wait_processed(&hub.ingest, 400).await;
    assert_eq!(stats.messages_processed, 400);
    assert_eq!(hub.aggregator.node_count(), 8);

    // per producer, messages arrive in order: the last value wins
    for cell in 0..8 {
        let node = hub
            .aggregator
            .node(&format!("cell_{cell}"))
            .expect("node per cell");
        assert_eq!(node.data.sensors.len(), 1);
        assert_eq!(node.data.sensors[0].value, json!(49.0));
    }
}

#[test]
fn test_aggregator_shared_across_threads() {
    let aggregator = Arc::new(LiveAggregator::new(Duration::ZERO));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let aggregator = aggregator.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    aggregator.update(
                        &format!("pump_{}", i % 10),
                        &format!("sensor_{t}"),
                        SensorReading {
                            value: json!(i),
                            unit: String::new(),
                            status: "normal".to_string(),
                            timestamp: String::new(),
                        },
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(aggregator.node_count(), 10);
    for i in 0..10 {
        let node = aggregator.node(&format!("pump_{i}")).unwrap();
        // one entry per sensor type, never duplicated
        assert_eq!(node.data.sensors.len(), 4);
    }
}

#[test]
fn test_alert_engine_raises_once_under_contention() {
    let engine = Arc::new(AlertEngine::default());
    engine.set_project_thresholds(
        "plant",
        vec![AlertThreshold {
            id: "t".to_string(),
            topic_name: "boiler/1/pressure".to_string(),
            sensor_type: "pressure".to_string(),
            min_value: None,
            max_value: Some(8.0),
            enabled: true,
        }],
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                (0..50)
                    .filter(|_| {
                        engine
                            .evaluate(
                                "boiler_1",
                                "pressure",
                                9.0,
                                "boiler/1/pressure",
                                chrono::Utc::now(),
                                "plant",
                            )
                            .is_some()
                    })
                    .count()
            })
        })
        .collect();

    let raised: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(raised, 1);
    assert_eq!(engine.active_alerts(None).len(), 1);
}
