//! Streaming session core for StreamPilot.
//!
//! Owns the per-session state machine (idle → streaming → stopped), the
//! registry binding session ids to live connections, the metrics sampling
//! policy, and the shapes of the records persisted to the document store.

pub mod record;
pub mod registry;
pub mod sampling;
pub mod session;

pub use record::{MetricRecord, SessionEndPatch, SessionRecord, METRICS_COLLECTION, SESSIONS_COLLECTION};
pub use registry::{SessionHandle, SessionRegistry};
pub use sampling::SamplingPolicy;
pub use session::{ConnectionId, StreamStart, StreamState, StreamSession, StreamSummary, TransitionError};
