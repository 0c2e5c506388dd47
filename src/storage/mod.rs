//! Message stores for recorded telemetry
//!
//! ## Design
//!
//! - **Trait-based**: `MessageStore` allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Batch-oriented**: writes arrive in batches from the storage actor
//!
//! ## Backends
//!
//! - **SQLite** (`storage-sqlite` feature): embedded database with migrations
//! - **In-Memory**: bounded per-project queues, no persistence

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, MessageStore};
pub use error::{StorageError, StorageResult};
pub use schema::{MessageRow, SessionRow};

use crate::config::StorageConfig;

/// Open the backend described by the configuration
pub async fn open_backend(config: &StorageConfig) -> StorageResult<Box<dyn MessageStore>> {
    match config {
        StorageConfig::Memory {
            max_messages_per_project,
        } => Ok(Box::new(memory::MemoryBackend::new(
            *max_messages_per_project,
        ))),

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path, .. } => Ok(Box::new(sqlite::SqliteBackend::new(path).await?)),

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}

/// Retention configured for the backend, if any
pub fn retention_days(config: &StorageConfig) -> Option<u32> {
    match config {
        StorageConfig::Memory { .. } => None,
        StorageConfig::Sqlite { retention_days, .. } => Some(*retention_days),
    }
}
