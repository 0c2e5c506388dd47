//! Storage backend trait definition
//!
//! This module defines the `MessageStore` trait implemented by every
//! storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::StorageResult;
use super::schema::{MessageRow, SessionRow};

/// Health status of the storage backend
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for message stores
///
/// Implementations must be `Send + Sync` as they are shared across async
/// tasks. Message queries return rows oldest first; session listings return
/// the newest session first.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a batch of messages
    ///
    /// Also updates the counters of the sessions the messages belong to.
    async fn insert_batch(&self, messages: Vec<MessageRow>) -> StorageResult<()>;

    /// The latest `limit` messages of a project
    async fn query_project(&self, project_id: &str, limit: usize) -> StorageResult<Vec<MessageRow>>;

    /// The latest `limit` messages of one piece of equipment
    async fn query_equipment(
        &self,
        project_id: &str,
        equipment_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<MessageRow>>;

    async fn start_session(&self, session: SessionRow) -> StorageResult<()>;

    /// Close a session and return its final state
    async fn end_session(&self, session_id: &str, ended_at: DateTime<Utc>)
    -> StorageResult<SessionRow>;

    async fn list_sessions(&self, project_id: &str) -> StorageResult<Vec<SessionRow>>;

    /// Delete messages received before `before`; returns how many were deleted
    async fn cleanup_old_messages(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    async fn count_messages(&self) -> StorageResult<usize>;

    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
