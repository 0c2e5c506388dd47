use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use sensor_hub::{
    actors::{
        discovery::DiscoveryHandle,
        dispatcher::DispatcherHandle,
        ingest::{IngestHandle, Pipeline},
        storage::StorageHandle,
    },
    alerts::AlertEngine,
    config::{Config, read_config_file, read_project_file},
    graph::LiveAggregator,
    interpreter::MessageInterpreter,
    storage::{open_backend, retention_days},
};
use tracing::{info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: String,

    /// Maximum log level
    #[arg(long, default_value = "debug")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_target("sensor_hub", level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)
        .with_context(|| format!("failed to load configuration from {}", args.file))?;

    run(config).await
}

#[instrument(skip_all)]
async fn run(config: Config) -> anyhow::Result<()> {
    let storage_config = config.storage.clone().unwrap_or_default();
    let backend = open_backend(&storage_config)
        .await
        .context("failed to open storage backend")?;
    let storage = StorageHandle::spawn(
        backend,
        retention_days(&storage_config),
        config.ingest.notification_capacity,
    );

    let dispatcher = DispatcherHandle::spawn(config.ingest.notification_capacity);
    let aggregator = Arc::new(LiveAggregator::new(Duration::from_millis(
        config.aggregator.throttle_ms,
    )));
    let alerts = Arc::new(AlertEngine::new(config.alerts.max_history_size));

    let pipeline = Pipeline {
        interpreter: MessageInterpreter::new(config.interpreter.clone()),
        aggregator: aggregator.clone(),
        alerts: alerts.clone(),
        min_confidence: config.ingest.min_confidence,
    };
    let ingest = IngestHandle::spawn(
        pipeline,
        dispatcher.event_sender(),
        Some(storage.clone()),
        config.ingest.queue_capacity,
    );

    let discovery = DiscoveryHandle::spawn(
        MessageInterpreter::new(config.interpreter.clone()),
        config.ingest.queue_capacity,
    );

    if let Some(path) = &config.project {
        let project = read_project_file(path)
            .with_context(|| format!("failed to load project from {}", path.display()))?;
        ingest.set_project(project).await?;
    }

    #[cfg(feature = "mqtt")]
    let listener = config.mqtt.clone().map(|mqtt| {
        sensor_hub::transport::mqtt::spawn_mqtt_listener(mqtt, ingest.message_sender())
    });
    #[cfg(not(feature = "mqtt"))]
    if config.mqtt.is_some() {
        warn!("mqtt section ignored: built without the mqtt feature");
    }
    if config.mqtt.is_none() {
        warn!("no mqtt section configured, no messages will be ingested");
    }

    #[cfg(feature = "api")]
    if let Some(mut api_config) = config.api.clone() {
        use sensor_hub::api::{ApiState, spawn_api_server};
        use sensor_hub::util::{get_api_addr, get_api_token};

        api_config.bind_addr = get_api_addr(api_config.bind_addr);
        if api_config.auth_token.is_none() {
            api_config.auth_token = get_api_token();
        }

        let state = ApiState::new(
            ingest.clone(),
            storage.clone(),
            aggregator,
            alerts,
            dispatcher.clone(),
            discovery.clone(),
        );
        spawn_api_server(api_config, state).await?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    #[cfg(feature = "mqtt")]
    if let Some(listener) = listener {
        listener.abort();
    }

    match ingest.stop_recording().await {
        Ok(Some(session)) => info!(
            "closed recording session {} ({} messages)",
            session.id, session.total_messages
        ),
        Ok(None) => {}
        Err(e) => warn!("failed to close recording session: {e:#}"),
    }
    ingest.shutdown().await;
    discovery.shutdown().await;

    if let Err(e) = storage.flush().await {
        warn!("final flush failed: {e:#}");
    }
    storage.shutdown().await;

    Ok(())
}
