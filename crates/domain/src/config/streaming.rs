use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tuning for the streaming session core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Persist one metrics sample every N events per session.
    /// `1` persists every event. Broadcast is never sampled.
    #[serde(default = "d_sample_interval")]
    pub metrics_sample_interval: u64,
    /// Per-connection outbound queue depth. Messages for a connection whose
    /// queue is full are dropped for that connection only.
    #[serde(default = "d_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Depth of the persistence queue feeding the store writer.
    #[serde(default = "d_persist_queue")]
    pub persist_queue: usize,
    /// Close connections that stay silent for this many seconds.
    /// `None` (the default) keeps connections open indefinitely.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    /// `user_id` recorded when `stream_start` omits one.
    #[serde(default = "d_user_id")]
    pub default_user_id: String,
    /// Platforms recorded when `stream_start` omits them.
    #[serde(default = "d_platforms")]
    pub default_platforms: Vec<String>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            metrics_sample_interval: d_sample_interval(),
            outbound_buffer: d_outbound_buffer(),
            persist_queue: d_persist_queue(),
            idle_timeout_secs: None,
            default_user_id: d_user_id(),
            default_platforms: d_platforms(),
        }
    }
}

fn d_sample_interval() -> u64 {
    10
}
fn d_outbound_buffer() -> usize {
    64
}
fn d_persist_queue() -> usize {
    1024
}
fn d_user_id() -> String {
    "demo-user".into()
}
fn d_platforms() -> Vec<String> {
    vec!["youtube".into(), "twitch".into()]
}
