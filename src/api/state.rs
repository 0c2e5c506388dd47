//! API shared state containing actor handles and engines

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::actors::{
    discovery::DiscoveryHandle, dispatcher::DispatcherHandle, ingest::IngestHandle,
    storage::StorageHandle,
};
use crate::alerts::AlertEngine;
use crate::graph::LiveAggregator;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Project switching and recording control
    pub ingest: IngestHandle,

    /// Recorded message and session queries
    pub storage: StorageHandle,

    pub aggregator: Arc<LiveAggregator>,

    pub alerts: Arc<AlertEngine>,

    /// Subscription point for WebSocket connections
    pub dispatcher: DispatcherHandle,

    /// Broker inventory for laying out new projects
    pub discovery: DiscoveryHandle,

    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(
        ingest: IngestHandle,
        storage: StorageHandle,
        aggregator: Arc<LiveAggregator>,
        alerts: Arc<AlertEngine>,
        dispatcher: DispatcherHandle,
        discovery: DiscoveryHandle,
    ) -> Self {
        Self {
            ingest,
            storage,
            aggregator,
            alerts,
            dispatcher,
            discovery,
            started_at: Utc::now(),
        }
    }
}
