//! Streaming session core wiring: connection set, hub, WebSocket endpoint.

pub mod connections;
pub mod hub;
pub mod ws;

pub use connections::{BroadcastReport, ConnectionSet, ConnectionSink, SendError};
pub use hub::StreamHub;
