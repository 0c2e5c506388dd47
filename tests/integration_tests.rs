//! Integration tests for the actor-based ingestion pipeline

#[path = "integration/helpers.rs"]
mod helpers;

#[path = "integration/pipeline.rs"]
mod pipeline;

#[path = "integration/concurrency.rs"]
mod concurrency;

#[cfg(feature = "storage-sqlite")]
#[path = "integration/storage_persistence.rs"]
mod storage_persistence;

#[cfg(feature = "api")]
#[path = "integration/api_endpoints.rs"]
mod api_endpoints;
