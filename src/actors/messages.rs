//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Events**: Notifications fanned out to dashboard subscribers
//! 3. **Records**: Persistence rows handed to the storage actor with `try_send`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::alerts::Alert;
use crate::config::Project;
use crate::graph::GraphSnapshot;
use crate::storage::{HealthStatus, MessageRow, SessionRow};

/// Notification pushed to every connected dashboard
///
/// Serialized as `{"type": "graph_update" | "alert_update", "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HubEvent {
    GraphUpdate(GraphSnapshot),
    AlertUpdate(Alert),
}

/// Commands that can be sent to the IngestActor
#[derive(Debug)]
pub enum IngestCommand {
    /// Switch to a project: resets the graph and loads its thresholds
    SetProject {
        project: Project,
        respond_to: oneshot::Sender<()>,
    },

    /// Start attaching incoming messages to a recording session
    ///
    /// Replies with the session it replaced, if one was active.
    AttachSession {
        project_id: String,
        session_id: String,
        respond_to: oneshot::Sender<Option<String>>,
    },

    /// Stop recording; replies with the detached session id
    DetachSession {
        respond_to: oneshot::Sender<Option<String>>,
    },

    GetStats {
        respond_to: oneshot::Sender<IngestStats>,
    },

    /// Gracefully shut down the ingest actor
    Shutdown,
}

/// Counters of the ingestion pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub messages_processed: u64,
    /// Readings dropped for low confidence
    pub messages_discarded: u64,
    pub alerts_raised: u64,
    pub graph_updates: u64,
    /// Notifications dropped because the dispatcher queue was full
    pub notifications_dropped: u64,
    /// Records dropped because the storage queue was full
    pub records_dropped: u64,
    pub project_id: Option<String>,
    pub session_id: Option<String>,
}

/// Commands that can be sent to the StorageActor
#[derive(Debug)]
pub enum StorageCommand {
    /// Manually flush the write buffer to storage
    Flush {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Get storage statistics
    GetStats {
        respond_to: oneshot::Sender<StorageStats>,
    },

    StartSession {
        project_id: String,
        project_name: String,
        respond_to: oneshot::Sender<anyhow::Result<SessionRow>>,
    },

    EndSession {
        session_id: String,
        respond_to: oneshot::Sender<anyhow::Result<SessionRow>>,
    },

    QueryProjectMessages {
        project_id: String,
        limit: usize,
        respond_to: oneshot::Sender<anyhow::Result<Vec<MessageRow>>>,
    },

    QueryEquipmentMessages {
        project_id: String,
        equipment_id: String,
        limit: usize,
        respond_to: oneshot::Sender<anyhow::Result<Vec<MessageRow>>>,
    },

    ListSessions {
        project_id: String,
        respond_to: oneshot::Sender<anyhow::Result<Vec<SessionRow>>>,
    },

    HealthCheck {
        respond_to: oneshot::Sender<anyhow::Result<HealthStatus>>,
    },

    /// Gracefully shut down the storage actor
    Shutdown,
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Messages held by the backend
    pub total_messages: usize,

    /// Messages waiting in the batch buffer
    pub buffered_messages: usize,

    /// Number of batches written
    pub flush_count: u64,

    pub last_cleanup_time: Option<DateTime<Utc>>,

    pub total_messages_deleted: u64,
}
