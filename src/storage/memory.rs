//! In-memory storage backend (no persistence)
//!
//! Keeps the newest messages of every project in a bounded queue. Used when
//! no database is configured, and in tests.
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Limited capacity**: oldest messages of a project are evicted first

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::backend::{HealthStatus, MessageStore};
use super::error::{StorageError, StorageResult};
use super::schema::{MessageRow, SessionRow};

/// Messages kept per project unless configured otherwise
pub const DEFAULT_MESSAGES_PER_PROJECT: usize = 5000;

#[derive(Debug, Default)]
struct MemoryState {
    messages: HashMap<String, VecDeque<MessageRow>>,
    sessions: Vec<SessionRow>,
}

/// In-memory storage backend
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    max_messages_per_project: usize,
}

impl MemoryBackend {
    pub fn new(max_messages_per_project: usize) -> Self {
        debug!("creating in-memory store ({max_messages_per_project} messages per project)");
        Self {
            state: RwLock::new(MemoryState::default()),
            max_messages_per_project,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGES_PER_PROJECT)
    }
}

/// The last `limit` rows matching `keep`, oldest first
fn latest<'a>(
    rows: impl DoubleEndedIterator<Item = &'a MessageRow>,
    limit: usize,
    keep: impl Fn(&MessageRow) -> bool,
) -> Vec<MessageRow> {
    let mut result: Vec<MessageRow> = rows.rev().filter(|r| keep(r)).take(limit).cloned().collect();
    result.reverse();
    result
}

#[async_trait]
impl MessageStore for MemoryBackend {
    async fn insert_batch(&self, messages: Vec<MessageRow>) -> StorageResult<()> {
        let mut state = self.state.write();

        for message in messages {
            if let Some(session_id) = message.session_id.as_deref() {
                if let Some(session) = state.sessions.iter_mut().find(|s| s.id == session_id) {
                    session.record(&message);
                }
            }

            let queue = state
                .messages
                .entry(message.project_id.clone())
                .or_default();
            queue.push_back(message);
            while queue.len() > self.max_messages_per_project {
                queue.pop_front();
            }
        }

        trace!("in-memory store holds {} projects", state.messages.len());
        Ok(())
    }

    async fn query_project(&self, project_id: &str, limit: usize) -> StorageResult<Vec<MessageRow>> {
        let state = self.state.read();
        Ok(state
            .messages
            .get(project_id)
            .map(|queue| latest(queue.iter(), limit, |_| true))
            .unwrap_or_default())
    }

    async fn query_equipment(
        &self,
        project_id: &str,
        equipment_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<MessageRow>> {
        let state = self.state.read();
        Ok(state
            .messages
            .get(project_id)
            .map(|queue| latest(queue.iter(), limit, |r| r.equipment_id == equipment_id))
            .unwrap_or_default())
    }

    async fn start_session(&self, session: SessionRow) -> StorageResult<()> {
        self.state.write().sessions.push(session);
        Ok(())
    }

    async fn end_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> StorageResult<SessionRow> {
        let mut state = self.state.write();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| StorageError::UnknownSession(session_id.to_string()))?;
        session.ended_at = Some(ended_at);
        Ok(session.clone())
    }

    async fn list_sessions(&self, project_id: &str) -> StorageResult<Vec<SessionRow>> {
        let state = self.state.read();
        let mut sessions: Vec<SessionRow> = state
            .sessions
            .iter()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    async fn cleanup_old_messages(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.state.write();
        let mut deleted = 0;
        for queue in state.messages.values_mut() {
            let len = queue.len();
            queue.retain(|m| m.timestamp >= before);
            deleted += len - queue.len();
        }
        Ok(deleted)
    }

    async fn count_messages(&self) -> StorageResult<usize> {
        Ok(self.state.read().messages.values().map(VecDeque::len).sum())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let mut metadata = HashMap::new();
        metadata.insert("backend".to_string(), "memory".to_string());
        metadata.insert(
            "max_messages_per_project".to_string(),
            self.max_messages_per_project.to_string(),
        );

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata,
        })
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
