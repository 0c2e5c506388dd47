//! IngestActor - the ingestion orchestrator
//!
//! Single consumer of the inbound message queue. For every message:
//!
//! ```text
//! interpret ─► confidence gate ─► aggregator.update ─► throttle? ─► graph_update
//!                                        │
//!                                        ├─► numeric? ─► alerts.evaluate ─► alert_update
//!                                        │
//!                                        └─► session active? ─► storage record
//! ```
//!
//! Nothing on this path waits on I/O: notifications and records are handed
//! off with `try_send` and dropped (and counted) when their queue is full.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, trace, warn};

use super::messages::{HubEvent, IngestCommand, IngestStats};
use super::storage::StorageHandle;
use crate::alerts::{Alert, AlertEngine};
use crate::config::Project;
use crate::graph::{GraphSnapshot, LiveAggregator, SensorReading};
use crate::interpreter::MessageInterpreter;
use crate::storage::{MessageRow, SessionRow};
use crate::{NormalizedReading, RawMessage};

/// The engines one message flows through
#[derive(Clone)]
pub struct Pipeline {
    pub interpreter: MessageInterpreter,
    pub aggregator: Arc<LiveAggregator>,
    pub alerts: Arc<AlertEngine>,
    /// Readings below this confidence are discarded
    pub min_confidence: f64,
}

/// What processing one message produced
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub reading: NormalizedReading,
    /// Unit shown on the dashboard
    pub unit: String,
    pub graph_update: Option<GraphSnapshot>,
    pub alert: Option<Alert>,
    pub record: Option<MessageRow>,
}

#[derive(Debug, Clone)]
struct ActiveSession {
    project_id: String,
    session_id: String,
}

/// Unit from the payload, else the suffix of a `field` entry (`temp_C` gives `C`)
pub fn display_unit(reading: &NormalizedReading) -> String {
    if !reading.unit.is_empty() {
        return reading.unit.clone();
    }

    reading
        .raw_payload
        .get("field")
        .and_then(Value::as_str)
        .and_then(|field| field.rsplit_once('_'))
        .map(|(_, suffix)| suffix.to_string())
        .unwrap_or_default()
}

pub struct IngestActor {
    pipeline: Pipeline,
    message_rx: mpsc::Receiver<RawMessage>,
    command_rx: mpsc::Receiver<IngestCommand>,
    event_tx: mpsc::Sender<HubEvent>,
    record_tx: Option<mpsc::Sender<MessageRow>>,
    project_id: Option<String>,
    session: Option<ActiveSession>,
    stats: IngestStats,
}

impl IngestActor {
    pub fn new(
        pipeline: Pipeline,
        message_rx: mpsc::Receiver<RawMessage>,
        command_rx: mpsc::Receiver<IngestCommand>,
        event_tx: mpsc::Sender<HubEvent>,
        record_tx: Option<mpsc::Sender<MessageRow>>,
    ) -> Self {
        Self {
            pipeline,
            message_rx,
            command_rx,
            event_tx,
            record_tx,
            project_id: None,
            session: None,
            stats: IngestStats::default(),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting ingest actor");

        loop {
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(IngestCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                Some(message) = self.message_rx.recv() => {
                    if let Some(outcome) = self.process(message) {
                        self.dispatch(outcome);
                    }
                }
            }
        }

        debug!(
            "ingest actor stopped after {} messages",
            self.stats.messages_processed
        );
    }

    /// Run one message through the pipeline
    ///
    /// Returns `None` when the reading was discarded.
    pub fn process(&mut self, message: RawMessage) -> Option<IngestOutcome> {
        self.stats.messages_processed += 1;

        let reading = self.pipeline.interpreter.interpret_at(
            &message.payload,
            &message.topic,
            message.received_at,
        );

        if reading.confidence < self.pipeline.min_confidence {
            self.stats.messages_discarded += 1;
            debug!(
                "discarding {} (confidence {:.2} below {:.2})",
                message.topic, reading.confidence, self.pipeline.min_confidence
            );
            return None;
        }

        let unit = display_unit(&reading);

        let aggregator = &self.pipeline.aggregator;
        aggregator.update(
            &reading.equipment_id,
            &reading.sensor_type,
            SensorReading {
                value: reading.value.clone(),
                unit: unit.clone(),
                status: reading.status.clone(),
                timestamp: reading.timestamp.clone(),
            },
        );
        let graph_update = aggregator.should_emit().then(|| aggregator.snapshot());

        let project_id = self.project_id.as_deref().unwrap_or_default();
        let alert = reading.numeric_value().and_then(|value| {
            self.pipeline.alerts.evaluate(
                &reading.equipment_id,
                &reading.sensor_type,
                value,
                &reading.topic,
                message.received_at,
                project_id,
            )
        });

        let record = self.session.as_ref().map(|session| {
            MessageRow::from_reading(
                &session.project_id,
                Some(&session.session_id),
                &reading,
                &unit,
                message.received_at,
            )
        });

        if graph_update.is_some() {
            self.stats.graph_updates += 1;
        }
        if alert.is_some() {
            self.stats.alerts_raised += 1;
        }

        Some(IngestOutcome {
            reading,
            unit,
            graph_update,
            alert,
            record,
        })
    }

    /// Hand the outcome's notifications and record off without waiting
    fn dispatch(&mut self, outcome: IngestOutcome) {
        if let Some(graph) = outcome.graph_update {
            self.notify(HubEvent::GraphUpdate(graph));
        }
        if let Some(alert) = outcome.alert {
            self.notify(HubEvent::AlertUpdate(alert));
        }
        if let Some(record) = outcome.record {
            self.persist(record);
        }
    }

    fn notify(&mut self, event: HubEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.notifications_dropped += 1;
                warn!("notification queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                trace!("notification dispatcher gone, dropping event");
            }
        }
    }

    fn persist(&mut self, record: MessageRow) {
        let Some(record_tx) = self.record_tx.as_ref() else {
            return;
        };

        match record_tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.records_dropped += 1;
                warn!("storage queue full, dropping record");
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.records_dropped += 1;
                warn!("storage actor gone, dropping record");
            }
        }
    }

    fn handle_command(&mut self, cmd: IngestCommand) {
        match cmd {
            IngestCommand::SetProject {
                project,
                respond_to,
            } => {
                self.set_project(project);
                let _ = respond_to.send(());
            }

            IngestCommand::AttachSession {
                project_id,
                session_id,
                respond_to,
            } => {
                info!("recording project {project_id} into session {session_id}");
                let previous = self.session.replace(ActiveSession {
                    project_id,
                    session_id,
                });
                let _ = respond_to.send(previous.map(|s| s.session_id));
            }

            IngestCommand::DetachSession { respond_to } => {
                let previous = self.session.take();
                if let Some(session) = &previous {
                    info!("stopped recording session {}", session.session_id);
                }
                let _ = respond_to.send(previous.map(|s| s.session_id));
            }

            IngestCommand::GetStats { respond_to } => {
                let _ = respond_to.send(self.stats());
            }

            IngestCommand::Shutdown => {}
        }
    }

    fn set_project(&mut self, project: Project) {
        info!(
            "switching to project {} ({} thresholds)",
            project.id,
            project.thresholds.len()
        );

        self.pipeline.aggregator.set_project(&project.graph_layout);
        self.pipeline
            .alerts
            .set_project_thresholds(&project.id, project.thresholds);
        self.project_id = Some(project.id);

        let snapshot = self.pipeline.aggregator.snapshot();
        self.stats.graph_updates += 1;
        self.notify(HubEvent::GraphUpdate(snapshot));
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            project_id: self.project_id.clone(),
            session_id: self.session.as_ref().map(|s| s.session_id.clone()),
            ..self.stats.clone()
        }
    }
}

/// Handle for controlling the IngestActor
#[derive(Clone)]
pub struct IngestHandle {
    sender: mpsc::Sender<IngestCommand>,
    message_tx: mpsc::Sender<RawMessage>,
    storage: Option<StorageHandle>,
}

impl IngestHandle {
    /// Spawn the ingest actor
    ///
    /// `capacity` bounds the inbound message queue. Recording requires a
    /// storage handle.
    pub fn spawn(
        pipeline: Pipeline,
        event_tx: mpsc::Sender<HubEvent>,
        storage: Option<StorageHandle>,
        capacity: usize,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (message_tx, message_rx) = mpsc::channel(capacity.max(1));

        let actor = IngestActor::new(
            pipeline,
            message_rx,
            cmd_rx,
            event_tx,
            storage.as_ref().map(StorageHandle::record_sender),
        );
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            message_tx,
            storage,
        }
    }

    /// Queue transports push raw messages into
    pub fn message_sender(&self) -> mpsc::Sender<RawMessage> {
        self.message_tx.clone()
    }

    /// Queue a message, waiting for room if the queue is full
    pub async fn submit(&self, message: RawMessage) -> anyhow::Result<()> {
        self.message_tx
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("ingest actor is not running"))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> IngestCommand,
    ) -> anyhow::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| anyhow::anyhow!("ingest actor is not running"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("ingest actor dropped the request"))
    }

    pub async fn set_project(&self, project: Project) -> anyhow::Result<()> {
        self.request(|respond_to| IngestCommand::SetProject {
            project,
            respond_to,
        })
        .await
    }

    /// Open a recording session and attach incoming messages to it
    ///
    /// A session that was already recording is closed first.
    pub async fn start_recording(
        &self,
        project_id: &str,
        project_name: &str,
    ) -> anyhow::Result<SessionRow> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("recording requires a storage backend"))?;

        let session = storage.start_session(project_id, project_name).await?;
        let previous = self
            .request(|respond_to| IngestCommand::AttachSession {
                project_id: project_id.to_string(),
                session_id: session.id.clone(),
                respond_to,
            })
            .await?;

        if let Some(previous) = previous {
            storage.end_session(&previous).await?;
        }

        Ok(session)
    }

    /// Stop recording; returns the closed session, if one was active
    pub async fn stop_recording(&self) -> anyhow::Result<Option<SessionRow>> {
        let detached = self
            .request(|respond_to| IngestCommand::DetachSession { respond_to })
            .await?;

        match (detached, self.storage.as_ref()) {
            (Some(session_id), Some(storage)) => Ok(Some(storage.end_session(&session_id).await?)),
            _ => Ok(None),
        }
    }

    pub async fn get_stats(&self) -> Option<IngestStats> {
        self.request(|respond_to| IngestCommand::GetStats { respond_to })
            .await
            .ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(IngestCommand::Shutdown).await;
    }
}
