//! StreamPilot gateway: WebSocket telemetry ingestion, live metrics
//! broadcast, and sampled persistence of streaming sessions.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
pub mod stream;
