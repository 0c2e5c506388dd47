//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `MessageStore` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Values and payloads are stored as JSON text, timestamps as Unix
//! milliseconds.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, MessageStore};
use super::error::{StorageError, StorageResult};
use super::schema::{MessageRow, SessionRow};

const MESSAGE_COLUMNS: &str = "id, project_id, session_id, equipment_id, sensor_type, value, \
                               unit, status, timestamp, reported_at, topic, raw_payload";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn message_from_row(row: &SqliteRow) -> StorageResult<MessageRow> {
        let value: String = row.try_get("value")?;
        let raw_payload: String = row.try_get("raw_payload")?;

        Ok(MessageRow {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            session_id: row.try_get("session_id")?,
            equipment_id: row.try_get("equipment_id")?,
            sensor_type: row.try_get("sensor_type")?,
            value: serde_json::from_str(&value)?,
            unit: row.try_get("unit")?,
            status: row.try_get("status")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
            reported_at: row.try_get("reported_at")?,
            topic: row.try_get("topic")?,
            raw_payload: serde_json::from_str(&raw_payload)?,
        })
    }

    /// Newest-first query result turned around to oldest-first
    fn chronological(rows: Vec<SqliteRow>) -> StorageResult<Vec<MessageRow>> {
        let mut messages = rows
            .iter()
            .map(Self::message_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn distinct_in_session(&self, column: &str, session_id: &str) -> StorageResult<Vec<String>> {
        let sql = format!(
            "SELECT {column} AS item FROM messages WHERE session_id = ? \
             GROUP BY {column} ORDER BY MIN(rowid)"
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("item").map_err(StorageError::from))
            .collect()
    }

    async fn session_from_row(&self, row: &SqliteRow) -> StorageResult<SessionRow> {
        let id: String = row.try_get("id")?;
        let ended_at: Option<i64> = row.try_get("ended_at")?;
        let total_messages: i64 = row.try_get("total_messages")?;

        Ok(SessionRow {
            equipment_ids: self.distinct_in_session("equipment_id", &id).await?,
            sensor_types: self.distinct_in_session("sensor_type", &id).await?,
            project_id: row.try_get("project_id")?,
            project_name: row.try_get("project_name")?,
            started_at: Self::millis_to_timestamp(row.try_get("started_at")?),
            ended_at: ended_at.map(Self::millis_to_timestamp),
            total_messages: total_messages.max(0) as u64,
            id,
        })
    }
}

#[async_trait]
impl MessageStore for SqliteBackend {
    #[instrument(skip(self, messages), fields(count = messages.len()))]
    async fn insert_batch(&self, messages: Vec<MessageRow>) -> StorageResult<()> {
        if messages.is_empty() {
            return Ok(());
        }

        debug!("inserting {} messages into SQLite", messages.len());

        let mut per_session: HashMap<String, i64> = HashMap::new();
        let mut tx = self.pool.begin().await?;

        for message in messages {
            if let Some(session_id) = &message.session_id {
                *per_session.entry(session_id.clone()).or_default() += 1;
            }

            sqlx::query(&format!(
                "INSERT OR REPLACE INTO messages ({MESSAGE_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&message.id)
            .bind(&message.project_id)
            .bind(&message.session_id)
            .bind(&message.equipment_id)
            .bind(&message.sensor_type)
            .bind(serde_json::to_string(&message.value)?)
            .bind(&message.unit)
            .bind(&message.status)
            .bind(message.timestamp.timestamp_millis())
            .bind(&message.reported_at)
            .bind(&message.topic)
            .bind(serde_json::to_string(&message.raw_payload)?)
            .execute(&mut *tx)
            .await?;
        }

        for (session_id, count) in per_session {
            sqlx::query("UPDATE sessions SET total_messages = total_messages + ? WHERE id = ?")
                .bind(count)
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("batch insert complete");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_project(&self, project_id: &str, limit: usize) -> StorageResult<Vec<MessageRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE project_id = ? \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?"
        ))
        .bind(project_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Self::chronological(rows)
    }

    #[instrument(skip(self))]
    async fn query_equipment(
        &self,
        project_id: &str,
        equipment_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<MessageRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE project_id = ? AND equipment_id = ? \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?"
        ))
        .bind(project_id)
        .bind(equipment_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Self::chronological(rows)
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    async fn start_session(&self, session: SessionRow) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO sessions (id, project_id, project_name, started_at, ended_at, total_messages) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.project_id)
        .bind(&session.project_name)
        .bind(session.started_at.timestamp_millis())
        .bind(session.ended_at.map(|t| t.timestamp_millis()))
        .bind(session.total_messages as i64)
        .execute(&self.pool)
        .await?;

        info!("recording session {} started", session.id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn end_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> StorageResult<SessionRow> {
        let result = sqlx::query("UPDATE sessions SET ended_at = ? WHERE id = ?")
            .bind(ended_at.timestamp_millis())
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::UnknownSession(session_id.to_string()));
        }

        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;

        info!("recording session {session_id} ended");
        self.session_from_row(&row).await
    }

    #[instrument(skip(self))]
    async fn list_sessions(&self, project_id: &str) -> StorageResult<Vec<SessionRow>> {
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE project_id = ? ORDER BY started_at DESC, rowid DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(self.session_from_row(row).await?);
        }
        Ok(sessions)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_old_messages(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        info!("cleaning up messages older than {}", before);

        let result = sqlx::query("DELETE FROM messages WHERE timestamp < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} old messages", deleted);
        Ok(deleted)
    }

    async fn count_messages(&self) -> StorageResult<usize> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.max(0) as usize)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
