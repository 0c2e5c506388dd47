//! Actor-based ingestion pipeline
//!
//! Each actor runs as an independent async task communicating via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌───────────────┐   RawMessage (bounded mpsc)
//!   │ MQTT listener │ ─────────────────────────┐
//!   └───────────────┘                          │
//!                                     ┌────────▼────────┐
//!                                     │   IngestActor   │ interpreter, aggregator, alerts
//!                                     └───┬─────────┬───┘
//!                     HubEvent (try_send) │         │ MessageRow (try_send)
//!                          ┌──────────────▼───┐  ┌──▼───────────┐
//!                          │    Dispatcher    │  │ StorageActor │
//!                          └────────┬─────────┘  └──────────────┘
//!                                   │ broadcast
//!                         WebSocket connections
//! ```
//!
//! ## Actor Types
//!
//! - **IngestActor**: interprets messages and drives the live graph and alerts
//! - **NotificationDispatcher**: serializes events and fans them out
//! - **StorageActor**: batches recorded messages into the message store
//! - **DiscoveryActor**: inventories equipment on a broker of its own, apart from the pipeline
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: Dashboard notifications fan out over a broadcast channel
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod discovery;
pub mod dispatcher;
pub mod ingest;
pub mod messages;
pub mod storage;
