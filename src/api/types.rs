//! API request and response bodies

use serde::{Deserialize, Serialize};

use crate::actors::messages::{IngestStats, StorageStats};
use crate::alerts::{Alert, AlertStats};
use crate::storage::{HealthStatus, MessageRow, SessionRow};

/// Default number of rows returned by message queries
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Upper bound on rows returned by message queries
pub const MAX_QUERY_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
}

impl From<HealthStatus> for StorageHealth {
    fn from(status: HealthStatus) -> Self {
        Self {
            healthy: status.healthy,
            message: status.message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub timestamp: String,
    pub uptime_secs: i64,
    pub ingest: IngestStats,
    pub storage: StorageStats,
    pub alerts: AlertStats,
    pub graph_nodes: usize,
    pub websocket_clients: usize,
    pub events_published: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
    pub count: usize,
}

impl From<Vec<Alert>> for AlertsResponse {
    fn from(alerts: Vec<Alert>) -> Self {
        Self {
            count: alerts.len(),
            alerts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearedResponse {
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub id: String,
    pub name: String,
    pub thresholds: usize,
    pub layout_nodes: usize,
}

/// Body of `POST /api/v1/sessions/start`
///
/// Both fields default to the active project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub project_id: Option<String>,
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    /// `None` when stopping while nothing was recording
    pub session: Option<SessionRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub project_id: String,
    pub sessions: Vec<SessionRow>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment_id: Option<String>,
    pub messages: Vec<MessageRow>,
    pub count: usize,
}
