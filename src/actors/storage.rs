//! StorageActor - Persists recorded messages
//!
//! ## Batching Strategy
//!
//! Records arrive on a bounded queue fed with `try_send` by the ingest
//! actor, so a slow backend never stalls ingestion. They are written in
//! batches:
//! - **Size trigger**: Flush after 100 records
//! - **Time trigger**: Flush after 5 seconds
//!
//! Pending records are flushed before every query and on shutdown, so reads
//! always see what has been accepted.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{StorageCommand, StorageStats};
use crate::storage::{HealthStatus, MessageRow, MessageStore, SessionRow, StorageResult};

/// Batch size trigger - flush after this many records
const BATCH_SIZE_TRIGGER: usize = 100;

/// Batch time trigger - flush after this duration
const BATCH_TIME_TRIGGER: Duration = Duration::from_secs(5);

/// Cleanup interval - run retention cleanup daily
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Oldest timestamp kept under `retention_days`, `None` when the window
/// reaches before the representable calendar
fn retention_cutoff(
    now: chrono::DateTime<chrono::Utc>,
    retention_days: u32,
) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::TimeDelta::try_days(i64::from(retention_days))
        .and_then(|window| now.checked_sub_signed(window))
}

pub struct StorageActor {
    backend: Box<dyn MessageStore>,

    /// Records waiting to be flushed
    batch_buffer: Vec<MessageRow>,

    command_rx: mpsc::Receiver<StorageCommand>,

    record_rx: mpsc::Receiver<MessageRow>,

    flush_count: u64,

    /// Retention period in days (for automatic cleanup)
    retention_days: Option<u32>,

    last_cleanup_time: Option<chrono::DateTime<chrono::Utc>>,

    total_messages_deleted: u64,
}

impl StorageActor {
    pub fn new(
        command_rx: mpsc::Receiver<StorageCommand>,
        record_rx: mpsc::Receiver<MessageRow>,
        backend: Box<dyn MessageStore>,
        retention_days: Option<u32>,
    ) -> Self {
        if let Some(days) = retention_days {
            debug!("retention cleanup enabled: {} days", days);
        }

        Self {
            backend,
            batch_buffer: Vec::with_capacity(BATCH_SIZE_TRIGGER),
            command_rx,
            record_rx,
            flush_count: 0,
            retention_days,
            last_cleanup_time: None,
            total_messages_deleted: 0,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting storage actor");

        let has_retention = self.retention_days.is_some();
        let mut flush_interval = time::interval(BATCH_TIME_TRIGGER);
        let mut cleanup_interval = time::interval(CLEANUP_INTERVAL);

        // the first tick completes immediately and doubles as startup cleanup
        loop {
            tokio::select! {
                Some(record) = self.record_rx.recv() => {
                    self.store_record(record).await;
                }

                _ = flush_interval.tick() => {
                    if !self.batch_buffer.is_empty() {
                        trace!("time-based flush triggered ({} records)", self.batch_buffer.len());
                        let _ = self.flush_batch().await;
                    }
                }

                _ = cleanup_interval.tick(), if has_retention => {
                    debug!("retention cleanup triggered");
                    self.run_cleanup().await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(StorageCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        // drain whatever was accepted before the shutdown
        debug!("final flush before shutdown");
        let _ = self.flush_pending().await;

        if let Err(e) = self.backend.close().await {
            error!("error closing backend: {}", e);
        }

        debug!("storage actor stopped");
    }

    async fn store_record(&mut self, record: MessageRow) {
        trace!(
            "buffering message for {} at {}",
            record.equipment_id, record.timestamp
        );

        self.batch_buffer.push(record);

        if self.batch_buffer.len() >= BATCH_SIZE_TRIGGER {
            trace!(
                "size-based flush triggered ({} records)",
                self.batch_buffer.len()
            );
            let _ = self.flush_batch().await;
        }
    }

    /// Take in records already queued, then flush
    ///
    /// Commands that read back must see every record sent before them.
    async fn flush_pending(&mut self) -> StorageResult<()> {
        while let Ok(record) = self.record_rx.try_recv() {
            self.batch_buffer.push(record);
        }
        self.flush_batch().await
    }

    /// Write the buffer out; a failed batch is logged and dropped
    async fn flush_batch(&mut self) -> StorageResult<()> {
        if self.batch_buffer.is_empty() {
            return Ok(());
        }

        let batch: Vec<MessageRow> = self.batch_buffer.drain(..).collect();
        let batch_size = batch.len();
        debug!("flushing {} records to backend", batch_size);

        match self.backend.insert_batch(batch).await {
            Ok(()) => {
                self.flush_count += 1;
                trace!(
                    "flush #{} complete ({} records)",
                    self.flush_count, batch_size
                );
                Ok(())
            }
            Err(e) => {
                error!("failed to flush batch of {batch_size} records: {}", e);
                Err(e)
            }
        }
    }

    /// Delete messages older than `retention_days`
    async fn run_cleanup(&mut self) {
        let Some(retention_days) = self.retention_days else {
            return;
        };

        let Some(cutoff) = retention_cutoff(chrono::Utc::now(), retention_days) else {
            debug!("retention of {retention_days} days reaches before any stored data, skipping cleanup");
            return;
        };
        debug!("running retention cleanup (deleting data before {})", cutoff);

        match self.backend.cleanup_old_messages(cutoff).await {
            Ok(deleted) => {
                if deleted > 0 {
                    info!("retention cleanup complete: deleted {} old messages", deleted);
                } else {
                    trace!("retention cleanup: no old messages to delete");
                }
                self.total_messages_deleted += deleted as u64;
            }
            Err(e) => {
                error!("failed to cleanup old messages: {}", e);
            }
        }

        self.last_cleanup_time = Some(chrono::Utc::now());
    }

    async fn handle_command(&mut self, cmd: StorageCommand) {
        match cmd {
            StorageCommand::Flush { respond_to } => {
                debug!("manual flush requested");
                let result = self.flush_pending().await.map_err(Into::into);
                let _ = respond_to.send(result);
            }

            StorageCommand::GetStats { respond_to } => {
                let stats = self.get_stats().await;
                let _ = respond_to.send(stats);
            }

            StorageCommand::StartSession {
                project_id,
                project_name,
                respond_to,
            } => {
                let session = SessionRow::start(&project_id, &project_name);
                let result = self
                    .backend
                    .start_session(session.clone())
                    .await
                    .map(|()| session)
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }

            StorageCommand::EndSession {
                session_id,
                respond_to,
            } => {
                let _ = self.flush_pending().await;
                let result = self
                    .backend
                    .end_session(&session_id, chrono::Utc::now())
                    .await
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }

            StorageCommand::QueryProjectMessages {
                project_id,
                limit,
                respond_to,
            } => {
                let _ = self.flush_pending().await;
                let result = self
                    .backend
                    .query_project(&project_id, limit)
                    .await
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }

            StorageCommand::QueryEquipmentMessages {
                project_id,
                equipment_id,
                limit,
                respond_to,
            } => {
                let _ = self.flush_pending().await;
                let result = self
                    .backend
                    .query_equipment(&project_id, &equipment_id, limit)
                    .await
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }

            StorageCommand::ListSessions {
                project_id,
                respond_to,
            } => {
                let _ = self.flush_pending().await;
                let result = self
                    .backend
                    .list_sessions(&project_id)
                    .await
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }

            StorageCommand::HealthCheck { respond_to } => {
                let result = self.backend.health_check().await.map_err(Into::into);
                let _ = respond_to.send(result);
            }

            StorageCommand::Shutdown => {}
        }
    }

    async fn get_stats(&self) -> StorageStats {
        let total_messages = match self.backend.count_messages().await {
            Ok(count) => count,
            Err(e) => {
                warn!("failed to count stored messages: {}", e);
                0
            }
        };

        StorageStats {
            total_messages,
            buffered_messages: self.batch_buffer.len(),
            flush_count: self.flush_count,
            last_cleanup_time: self.last_cleanup_time,
            total_messages_deleted: self.total_messages_deleted,
        }
    }
}

/// Handle for controlling the StorageActor
#[derive(Clone)]
pub struct StorageHandle {
    sender: mpsc::Sender<StorageCommand>,
    record_tx: mpsc::Sender<MessageRow>,
}

impl StorageHandle {
    /// Spawn a storage actor over `backend`
    ///
    /// `capacity` bounds the record queue; records beyond it are rejected by
    /// `try_send` on the producer side.
    pub fn spawn(
        backend: Box<dyn MessageStore>,
        retention_days: Option<u32>,
        capacity: usize,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (record_tx, record_rx) = mpsc::channel(capacity.max(1));

        let actor = StorageActor::new(cmd_rx, record_rx, backend, retention_days);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            record_tx,
        }
    }

    /// Queue feeding records to the actor
    pub fn record_sender(&self) -> mpsc::Sender<MessageRow> {
        self.record_tx.clone()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> StorageCommand,
    ) -> anyhow::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| anyhow::anyhow!("storage actor is not running"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("storage actor dropped the request"))
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        self.request(|respond_to| StorageCommand::Flush { respond_to })
            .await?
    }

    pub async fn get_stats(&self) -> Option<StorageStats> {
        self.request(|respond_to| StorageCommand::GetStats { respond_to })
            .await
            .ok()
    }

    pub async fn start_session(
        &self,
        project_id: &str,
        project_name: &str,
    ) -> anyhow::Result<SessionRow> {
        self.request(|respond_to| StorageCommand::StartSession {
            project_id: project_id.to_string(),
            project_name: project_name.to_string(),
            respond_to,
        })
        .await?
    }

    pub async fn end_session(&self, session_id: &str) -> anyhow::Result<SessionRow> {
        self.request(|respond_to| StorageCommand::EndSession {
            session_id: session_id.to_string(),
            respond_to,
        })
        .await?
    }

    pub async fn query_project_messages(
        &self,
        project_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<MessageRow>> {
        self.request(|respond_to| StorageCommand::QueryProjectMessages {
            project_id: project_id.to_string(),
            limit,
            respond_to,
        })
        .await?
    }

    pub async fn query_equipment_messages(
        &self,
        project_id: &str,
        equipment_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<MessageRow>> {
        self.request(|respond_to| StorageCommand::QueryEquipmentMessages {
            project_id: project_id.to_string(),
            equipment_id: equipment_id.to_string(),
            limit,
            respond_to,
        })
        .await?
    }

    pub async fn list_sessions(&self, project_id: &str) -> anyhow::Result<Vec<SessionRow>> {
        self.request(|respond_to| StorageCommand::ListSessions {
            project_id: project_id.to_string(),
            respond_to,
        })
        .await?
    }

    pub async fn health_check(&self) -> anyhow::Result<HealthStatus> {
        self.request(|respond_to| StorageCommand::HealthCheck { respond_to })
            .await?
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(StorageCommand::Shutdown).await;
    }
}
