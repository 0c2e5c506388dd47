//! DiscoveryActor - maps what a broker carries before a project exists
//!
//! Discovery runs its own broker connection next to live ingestion. Messages
//! it receives are interpreted and filed in the [`DiscoveryInventory`]; they
//! never reach the graph, the alerts or storage.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::RawMessage;
use crate::config::MqttConfig;
use crate::discovery::{DiscoveredNode, DiscoveryInventory};
use crate::interpreter::MessageInterpreter;

/// Appended to the configured client id so discovery never takes over the
/// connection of the live listener
const CLIENT_ID_SUFFIX: &str = "-discovery";

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryStatus {
    pub running: bool,
    /// Subscription pattern of the running discovery
    pub topic: Option<String>,
    pub discovered_nodes: Vec<DiscoveredNode>,
    pub count: usize,
}

#[derive(Debug)]
pub enum DiscoveryCommand {
    /// Start a discovery, replacing a running one and its results
    Start {
        config: MqttConfig,
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Stop listening; discovered nodes stay available
    Stop { respond_to: oneshot::Sender<bool> },

    /// Current state and discovered nodes
    Status {
        respond_to: oneshot::Sender<DiscoveryStatus>,
    },

    /// Drop discovered nodes
    Clear { respond_to: oneshot::Sender<usize> },

    Shutdown,
}

struct RunningDiscovery {
    topic: String,
    listener: Option<JoinHandle<()>>,
}

pub struct DiscoveryActor {
    interpreter: MessageInterpreter,
    inventory: Arc<DiscoveryInventory>,
    command_rx: mpsc::Receiver<DiscoveryCommand>,
    message_rx: mpsc::Receiver<RawMessage>,
    /// Handed to every listener this actor starts
    message_tx: mpsc::Sender<RawMessage>,
    running: Option<RunningDiscovery>,
}

impl DiscoveryActor {
    pub fn new(
        interpreter: MessageInterpreter,
        inventory: Arc<DiscoveryInventory>,
        command_rx: mpsc::Receiver<DiscoveryCommand>,
        message_rx: mpsc::Receiver<RawMessage>,
        message_tx: mpsc::Sender<RawMessage>,
    ) -> Self {
        Self {
            interpreter,
            inventory,
            command_rx,
            message_rx,
            message_tx,
            running: None,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting discovery actor");

        loop {
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(DiscoveryCommand::Shutdown) => {
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
                    self.observe(message);
                }
            }
        }

        self.stop();
        debug!("discovery actor stopped");
    }

    fn observe(&self, message: RawMessage) {
        if self.running.is_none() {
            trace!("discovery stopped, dropping message on {}", message.topic);
            return;
        }

        let reading =
            self.interpreter
                .interpret_at(&message.payload, &message.topic, message.received_at);
        self.inventory
            .record(&reading, &message.payload, message.received_at);
    }

    fn handle_command(&mut self, cmd: DiscoveryCommand) {
        match cmd {
            DiscoveryCommand::Start { config, respond_to } => {
                let result = self.start(config);
                let _ = respond_to.send(result);
            }

            DiscoveryCommand::Stop { respond_to } => {
                let _ = respond_to.send(self.stop());
            }

            DiscoveryCommand::Status { respond_to } => {
                let discovered_nodes = self.inventory.nodes();
                let _ = respond_to.send(DiscoveryStatus {
                    running: self.running.is_some(),
                    topic: self.running.as_ref().map(|r| r.topic.clone()),
                    count: discovered_nodes.len(),
                    discovered_nodes,
                });
            }

            DiscoveryCommand::Clear { respond_to } => {
                let removed = self.inventory.clear();
                debug!("cleared {removed} discovered sensors");
                let _ = respond_to.send(removed);
            }

            DiscoveryCommand::Shutdown => {}
        }
    }

    fn start(&mut self, mut config: MqttConfig) -> anyhow::Result<()> {
        self.stop();
        self.discard_queued();
        self.inventory.clear();

        config.client_id.push_str(CLIENT_ID_SUFFIX);
        let topic = crate::transport::subscription_pattern(&config.topic);
        let listener = self.spawn_listener(config)?;

        info!("discovery started on {topic}");
        self.running = Some(RunningDiscovery { topic, listener });
        Ok(())
    }

    #[cfg(feature = "mqtt")]
    fn spawn_listener(&self, config: MqttConfig) -> anyhow::Result<Option<JoinHandle<()>>> {
        Ok(Some(crate::transport::mqtt::spawn_mqtt_listener(
            config,
            self.message_tx.clone(),
        )))
    }

    #[cfg(not(feature = "mqtt"))]
    fn spawn_listener(&self, _config: MqttConfig) -> anyhow::Result<Option<JoinHandle<()>>> {
        anyhow::bail!("discovery requires the mqtt transport")
    }

    /// Drop messages queued while no discovery was accepting them
    fn discard_queued(&mut self) {
        let mut dropped = 0;
        while self.message_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            trace!("discarded {dropped} queued messages");
        }
    }

    /// Returns whether a discovery was running
    fn stop(&mut self) -> bool {
        let Some(running) = self.running.take() else {
            return false;
        };

        if let Some(listener) = running.listener {
            listener.abort();
        }
        self.discard_queued();

        info!(
            "discovery on {} stopped with {} sensors",
            running.topic,
            self.inventory.len()
        );
        true
    }
}

/// Handle for controlling the DiscoveryActor
#[derive(Clone)]
pub struct DiscoveryHandle {
    sender: mpsc::Sender<DiscoveryCommand>,
    message_tx: mpsc::Sender<RawMessage>,
    inventory: Arc<DiscoveryInventory>,
}

impl DiscoveryHandle {
    pub fn spawn(interpreter: MessageInterpreter, capacity: usize) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (message_tx, message_rx) = mpsc::channel(capacity.max(1));
        let inventory = Arc::new(DiscoveryInventory::new());

        let actor = DiscoveryActor::new(
            interpreter,
            inventory.clone(),
            cmd_rx,
            message_rx,
            message_tx.clone(),
        );
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            message_tx,
            inventory,
        }
    }

    /// Queue listeners push into; messages are only kept while discovery runs
    pub fn message_sender(&self) -> mpsc::Sender<RawMessage> {
        self.message_tx.clone()
    }

    pub fn inventory(&self) -> Arc<DiscoveryInventory> {
        self.inventory.clone()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> DiscoveryCommand,
    ) -> anyhow::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| anyhow::anyhow!("discovery actor is not running"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("discovery actor dropped the request"))
    }

    pub async fn start(&self, config: MqttConfig) -> anyhow::Result<()> {
        self.request(|respond_to| DiscoveryCommand::Start { config, respond_to })
            .await?
    }

    /// Returns whether a discovery was running
    pub async fn stop(&self) -> anyhow::Result<bool> {
        self.request(|respond_to| DiscoveryCommand::Stop { respond_to })
            .await
    }

    pub async fn status(&self) -> anyhow::Result<DiscoveryStatus> {
        self.request(|respond_to| DiscoveryCommand::Status { respond_to })
            .await
    }

    /// Returns how many discovered sensors were dropped
    pub async fn clear(&self) -> anyhow::Result<usize> {
        self.request(|respond_to| DiscoveryCommand::Clear { respond_to })
            .await
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(DiscoveryCommand::Shutdown).await;
    }
}
