//! Route handlers grouped by resource

pub mod alerts;
pub mod discovery;
pub mod graph;
pub mod health;
pub mod messages;
pub mod sessions;
pub mod stats;
