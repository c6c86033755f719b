//! The stream hub: session registry + connection set + sampling policy +
//! persistence queue, behind one injected object.
//!
//! Flow for one inbound frame:
//! 1. decode into a [`ClientMessage`] (malformed frames are dropped here)
//! 2. apply the transition to the sender's session under the registry lock
//! 3. outside the lock: unicast acks, broadcast metrics, enqueue writes
//!
//! Nothing in the hub awaits, so a slow recipient or a slow store can never
//! stall the connection that is being processed.

use chrono::Utc;
use sp_domain::config::StreamingConfig;
use sp_domain::trace::TraceEvent;
use sp_protocol::{ClientMessage, MetricsPayload, ServerMessage};
use sp_sessions::{
    ConnectionId, MetricRecord, SamplingPolicy, SessionEndPatch, SessionHandle, SessionRecord,
    SessionRegistry, METRICS_COLLECTION, SESSIONS_COLLECTION,
};

use crate::runtime::persist::PersistHandle;
use crate::stream::connections::{ConnectionSet, ConnectionSink, SendError};

pub struct StreamHub {
    sessions: SessionRegistry,
    connections: ConnectionSet,
    sampling: SamplingPolicy,
    persist: PersistHandle,
    default_user_id: String,
    default_platforms: Vec<String>,
}

impl StreamHub {
    pub fn new(config: &StreamingConfig, persist: PersistHandle) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            connections: ConnectionSet::new(),
            sampling: SamplingPolicy::every(config.metrics_sample_interval),
            persist,
            default_user_id: config.default_user_id.clone(),
            default_platforms: config.default_platforms.clone(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    pub fn sampling(&self) -> SamplingPolicy {
        self.sampling
    }

    pub fn persist(&self) -> &PersistHandle {
        &self.persist
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Connection lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// A transport connection opened for `session_id`: register it and
    /// bind a fresh session to it.
    pub fn connect(&self, session_id: &str, sink: ConnectionSink) -> SessionHandle {
        let connection = self.connections.register(session_id, sink);
        let handle = self.sessions.open(connection, session_id);
        tracing::info!(
            session_id = %session_id,
            connection = %connection,
            connections = self.connections.len(),
            "stream connection opened"
        );
        handle
    }

    /// The transport connection closed.  Cleanup only: the connection is
    /// gone, so nothing is sent and no stop record is written.
    pub fn disconnect(&self, handle: &SessionHandle) {
        self.teardown(handle.connection, "disconnected");
    }

    fn teardown(&self, connection: ConnectionId, reason: &str) {
        let Some(session_id) = self.connections.unregister(connection) else {
            return;
        };
        let released = self.sessions.release(&session_id, connection);
        tracing::info!(
            session_id = %session_id,
            connection = %connection,
            reason,
            session_released = released.is_some(),
            "stream connection closed"
        );
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Inbound
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Decode and handle one text frame.  Malformed frames are ignored.
    pub fn handle_frame(&self, handle: &SessionHandle, text: &str) {
        match ClientMessage::decode(text) {
            Ok(msg) => self.handle_message(handle, msg),
            Err(e) => tracing::debug!(
                session_id = %handle.session_id,
                connection = %handle.connection,
                error = %e,
                "ignoring malformed frame"
            ),
        }
    }

    pub fn handle_message(&self, handle: &SessionHandle, msg: ClientMessage) {
        match msg {
            ClientMessage::StreamStart { user_id, platforms } => {
                self.on_stream_start(handle, user_id, platforms)
            }
            ClientMessage::StreamStop => self.on_stream_stop(handle),
            ClientMessage::Metrics { data } => self.on_metrics(handle, data),
            ClientMessage::Ping { timestamp } => {
                self.deliver(handle.connection, ServerMessage::Pong { timestamp })
            }
        }
    }

    fn on_stream_start(
        &self,
        handle: &SessionHandle,
        user_id: Option<String>,
        platforms: Option<Vec<String>>,
    ) {
        let now = Utc::now();
        let user_id = user_id.unwrap_or_else(|| self.default_user_id.clone());
        let platforms = platforms.unwrap_or_else(|| self.default_platforms.clone());

        let outcome = self.sessions.update(&handle.session_id, handle.connection, |s| {
            s.start(user_id, platforms, now)
        });
        let start = match outcome {
            Some(Ok(start)) => start,
            Some(Err(e)) => {
                tracing::debug!(session_id = %handle.session_id, error = %e, "stream_start ignored");
                return;
            }
            None => {
                tracing::debug!(session_id = %handle.session_id, "stream_start for unbound session ignored");
                return;
            }
        };

        TraceEvent::StreamStarted {
            session_id: handle.session_id.clone(),
            user_id: start.user_id.clone(),
            platforms: start.platforms.clone(),
        }
        .emit();

        self.deliver(
            handle.connection,
            ServerMessage::StreamStarted {
                session_id: handle.session_id.clone(),
                timestamp: start.started_at,
            },
        );
        self.persist
            .insert(SESSIONS_COLLECTION, &SessionRecord::started(&handle.session_id, &start));
    }

    fn on_stream_stop(&self, handle: &SessionHandle) {
        let now = Utc::now();
        let outcome = self
            .sessions
            .update(&handle.session_id, handle.connection, |s| s.stop(now));
        let summary = match outcome {
            Some(Ok(summary)) => summary,
            Some(Err(e)) => {
                tracing::debug!(session_id = %handle.session_id, error = %e, "stream_stop ignored");
                return;
            }
            None => {
                tracing::debug!(session_id = %handle.session_id, "stream_stop for unbound session ignored");
                return;
            }
        };

        TraceEvent::StreamStopped {
            session_id: handle.session_id.clone(),
            total_metrics: summary.total_metrics,
            duration_seconds: summary.duration_seconds,
            peak_viewers: summary.peak_viewers,
        }
        .emit();

        self.deliver(
            handle.connection,
            ServerMessage::StreamStopped {
                session_id: handle.session_id.clone(),
                total_metrics: Some(summary.total_metrics),
                duration_seconds: Some(summary.duration_seconds),
                timestamp: summary.stopped_at,
            },
        );
        self.persist.update(
            SESSIONS_COLLECTION,
            SessionRecord::filter(&handle.session_id, summary.started_at),
            &SessionEndPatch::from(&summary),
        );
    }

    fn on_metrics(&self, handle: &SessionHandle, data: MetricsPayload) {
        let now = Utc::now();
        let outcome = self
            .sessions
            .update(&handle.session_id, handle.connection, |s| s.record_metric(data.viewers()));
        let sequence = match outcome {
            Some(Ok(seq)) => seq,
            Some(Err(e)) => {
                tracing::debug!(session_id = %handle.session_id, error = %e, "metrics ignored");
                return;
            }
            None => {
                tracing::debug!(session_id = %handle.session_id, "metrics for unbound session ignored");
                return;
            }
        };

        if self.sampling.should_persist(sequence) {
            self.persist.insert(
                METRICS_COLLECTION,
                &MetricRecord::from_payload(&handle.session_id, &data, now),
            );
            TraceEvent::MetricsSampled {
                session_id: handle.session_id.clone(),
                sequence,
            }
            .emit();
        }

        self.fan_out(ServerMessage::MetricsUpdate {
            session_id: handle.session_id.clone(),
            data,
            timestamp: now,
        });
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Outbound
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn deliver(&self, connection: ConnectionId, message: ServerMessage) {
        match self.connections.send_to(connection, message) {
            Ok(()) => {}
            Err(SendError::Full) => {
                tracing::warn!(connection = %connection, "outbound queue full, message dropped");
            }
            Err(SendError::Closed) => self.drop_dead(connection),
        }
    }

    fn fan_out(&self, message: ServerMessage) {
        let report = self.connections.broadcast(&message);
        for connection in report.dead {
            self.drop_dead(connection);
        }
    }

    fn drop_dead(&self, connection: ConnectionId) {
        tracing::warn!(connection = %connection, "send failed, dropping connection");
        TraceEvent::ConnectionDropped {
            connection_id: connection.as_u64(),
            reason: "send failed".into(),
        }
        .emit();
        self.teardown(connection, "send failed");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::persist::PersistOp;
    use sp_sessions::StreamState;
    use sp_store::{DocumentStore, MemoryStore};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        hub: StreamHub,
        persisted: mpsc::Receiver<PersistOp>,
    }

    fn harness(sample_interval: u64) -> Harness {
        let config = StreamingConfig {
            metrics_sample_interval: sample_interval,
            ..StreamingConfig::default()
        };
        let (persist, persisted) = PersistHandle::channel(1024);
        Harness {
            hub: StreamHub::new(&config, persist),
            persisted,
        }
    }

    fn client(hub: &StreamHub, session_id: &str) -> (SessionHandle, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(256);
        (hub.connect(session_id, tx), rx)
    }

    fn drain<T>(rx: &mut mpsc::Receiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(v) = rx.try_recv() {
            out.push(v);
        }
        out
    }

    fn metrics(viewers: u64) -> ClientMessage {
        ClientMessage::Metrics {
            data: MetricsPayload::new(30.0, 2500.0, viewers),
        }
    }

    fn start() -> ClientMessage {
        ClientMessage::StreamStart {
            user_id: None,
            platforms: None,
        }
    }

    #[test]
    fn start_acknowledges_only_the_originator() {
        let Harness { hub, mut persisted } = harness(10);
        let (streamer, mut streamer_rx) = client(&hub, "s1");
        let (_viewer, mut viewer_rx) = client(&hub, "dash");

        hub.handle_message(&streamer, start());

        let to_streamer = drain(&mut streamer_rx);
        assert_eq!(to_streamer.len(), 1);
        assert!(matches!(
            &to_streamer[0],
            ServerMessage::StreamStarted { session_id, .. } if session_id == "s1"
        ));
        assert!(drain(&mut viewer_rx).is_empty());

        let ops = drain(&mut persisted);
        assert_eq!(ops.len(), 1);
        let PersistOp::Insert { collection, record } = &ops[0] else {
            panic!("expected insert");
        };
        assert_eq!(*collection, SESSIONS_COLLECTION);
        assert_eq!(record["id"], "s1");
        assert_eq!(record["user_id"], "demo-user");
        assert_eq!(record["platforms"], serde_json::json!(["youtube", "twitch"]));
        assert_eq!(record["is_active"], true);
    }

    #[test]
    fn metrics_are_broadcast_to_everyone_including_sender() {
        let Harness { hub, .. } = harness(10);
        let (streamer, mut streamer_rx) = client(&hub, "s1");
        let (_v1, mut v1_rx) = client(&hub, "dash-1");
        let (_v2, mut v2_rx) = client(&hub, "dash-2");

        hub.handle_message(&streamer, start());
        drain(&mut streamer_rx);

        hub.handle_message(&streamer, metrics(3));

        for rx in [&mut streamer_rx, &mut v1_rx, &mut v2_rx] {
            let got = drain(rx);
            assert_eq!(got.len(), 1);
            let ServerMessage::MetricsUpdate { session_id, data, .. } = &got[0] else {
                panic!("expected metrics_update, got {:?}", got[0]);
            };
            assert_eq!(session_id, "s1");
            assert_eq!(data.viewers(), 3);
        }
    }

    #[test]
    fn twenty_five_metrics_with_interval_ten() {
        let Harness { hub, mut persisted } = harness(10);
        let (streamer, mut streamer_rx) = client(&hub, "s1");
        let (_viewer, mut viewer_rx) = client(&hub, "dash");

        hub.handle_message(&streamer, start());
        drain(&mut persisted);
        drain(&mut streamer_rx);

        for i in 0..25 {
            hub.handle_message(&streamer, metrics(i));
        }

        let ops = drain(&mut persisted);
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| matches!(
            op,
            PersistOp::Insert { collection, .. } if *collection == METRICS_COLLECTION
        )));
        // 10th and 20th events (viewers 9 and 19).
        let viewers: Vec<_> = ops
            .iter()
            .map(|op| match op {
                PersistOp::Insert { record, .. } => record["viewers"].as_u64().unwrap(),
                PersistOp::Update { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(viewers, vec![9, 19]);

        assert_eq!(drain(&mut streamer_rx).len(), 25);
        assert_eq!(drain(&mut viewer_rx).len(), 25);
        assert_eq!(hub.sessions().get("s1").unwrap().metrics_count, 25);

        hub.handle_message(&streamer, ClientMessage::StreamStop);
        let stopped = drain(&mut streamer_rx);
        assert_eq!(stopped.len(), 1);
        let ServerMessage::StreamStopped {
            total_metrics,
            duration_seconds,
            ..
        } = &stopped[0]
        else {
            panic!("expected stream_stopped");
        };
        assert_eq!(*total_metrics, Some(25));
        assert!(matches!(duration_seconds, Some(d) if *d >= 0.0));
        assert!(drain(&mut viewer_rx).is_empty());

        let ops = drain(&mut persisted);
        assert_eq!(ops.len(), 1);
        let PersistOp::Update { collection, filter, patch } = &ops[0] else {
            panic!("expected update");
        };
        assert_eq!(*collection, SESSIONS_COLLECTION);
        assert_eq!(filter["id"], "s1");
        assert!(filter["start_time"].is_string());
        assert_eq!(patch["is_active"], false);
        assert_eq!(patch["peak_viewers"], 24);
        assert!(patch["end_time"].is_string());
    }

    async fn apply(store: &MemoryStore, ops: Vec<PersistOp>) {
        for op in ops {
            match op {
                PersistOp::Insert { collection, record } => {
                    store.insert(collection, record).await.unwrap();
                }
                PersistOp::Update {
                    collection,
                    filter,
                    patch,
                } => {
                    store.update(collection, &filter, patch).await.unwrap();
                }
            }
        }
    }

    #[tokio::test]
    async fn stopping_a_reopened_session_leaves_earlier_runs_untouched() {
        let Harness { hub, mut persisted } = harness(10);
        let store = MemoryStore::new();

        let (first, _first_rx) = client(&hub, "s1");
        hub.handle_message(&first, start());
        hub.handle_message(&first, metrics(500));
        hub.handle_message(&first, ClientMessage::StreamStop);
        hub.disconnect(&first);
        apply(&store, drain(&mut persisted)).await;
        let first_run = store.snapshot(SESSIONS_COLLECTION)[0].clone();
        assert_eq!(first_run["peak_viewers"], 500);
        assert_eq!(first_run["is_active"], false);

        // Keep the two start times apart.
        tokio::time::sleep(Duration::from_millis(2)).await;

        let (second, _second_rx) = client(&hub, "s1");
        hub.handle_message(&second, start());
        hub.handle_message(&second, metrics(3));
        hub.handle_message(&second, ClientMessage::StreamStop);
        apply(&store, drain(&mut persisted)).await;

        let rows = store.snapshot(SESSIONS_COLLECTION);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], first_run);
        assert_eq!(rows[1]["peak_viewers"], 3);
        assert_eq!(rows[1]["total_viewers"], 3);
        assert_eq!(rows[1]["is_active"], false);
        assert_ne!(rows[0]["end_time"], rows[1]["end_time"]);
    }

    #[test]
    fn interval_one_persists_every_event() {
        let Harness { hub, mut persisted } = harness(1);
        let (streamer, _rx) = client(&hub, "s1");
        hub.handle_message(&streamer, start());
        drain(&mut persisted);

        for i in 0..7 {
            hub.handle_message(&streamer, metrics(i));
        }
        assert_eq!(drain(&mut persisted).len(), 7);
    }

    #[test]
    fn numeric_viewers_of_any_shape_are_broadcast_and_counted() {
        let Harness { hub, .. } = harness(10);
        let (streamer, mut streamer_rx) = client(&hub, "s1");
        let (_viewer, mut viewer_rx) = client(&hub, "dash");
        hub.handle_message(&streamer, start());
        drain(&mut streamer_rx);

        hub.handle_frame(
            &streamer,
            r#"{"type":"metrics","data":{"fps":30,"bitrate":2500,"viewers":12.0}}"#,
        );
        hub.handle_frame(
            &streamer,
            r#"{"type":"metrics","data":{"fps":30,"bitrate":2500,"viewers":-1}}"#,
        );

        let got = drain(&mut viewer_rx);
        assert_eq!(got.len(), 2);
        let ServerMessage::MetricsUpdate { data, .. } = &got[0] else {
            panic!("expected metrics_update, got {:?}", got[0]);
        };
        // Relayed as the client spelled it.
        assert_eq!(
            serde_json::to_value(data).unwrap(),
            serde_json::json!({"fps": 30, "bitrate": 2500, "viewers": 12.0})
        );

        let session = hub.sessions().get("s1").unwrap();
        assert_eq!(session.metrics_count, 2);
        assert_eq!(session.peak_viewers, 12);
        assert_eq!(session.last_viewers, 0);
    }

    #[test]
    fn malformed_metrics_frame_is_ignored() {
        let Harness { hub, mut persisted } = harness(1);
        let (streamer, mut streamer_rx) = client(&hub, "s1");
        let (_viewer, mut viewer_rx) = client(&hub, "dash");
        hub.handle_message(&streamer, start());
        drain(&mut streamer_rx);
        drain(&mut persisted);

        hub.handle_frame(&streamer, r#"{"type":"metrics"}"#);
        hub.handle_frame(&streamer, r#"{"type":"metrics","data":{"fps":30}}"#);
        hub.handle_frame(&streamer, "garbage");

        assert!(drain(&mut streamer_rx).is_empty());
        assert!(drain(&mut viewer_rx).is_empty());
        assert!(drain(&mut persisted).is_empty());
        assert_eq!(hub.sessions().get("s1").unwrap().metrics_count, 0);
        assert!(hub.connections().contains(streamer.connection));
    }

    #[test]
    fn metrics_before_start_are_ignored() {
        let Harness { hub, .. } = harness(10);
        let (streamer, mut streamer_rx) = client(&hub, "s1");
        hub.handle_message(&streamer, metrics(1));
        assert!(drain(&mut streamer_rx).is_empty());
        assert_eq!(hub.sessions().get("s1").unwrap().state, StreamState::Idle);
    }

    #[test]
    fn disconnect_removes_session_without_notifying() {
        let Harness { hub, mut persisted } = harness(10);
        let (streamer, mut streamer_rx) = client(&hub, "s1");
        hub.handle_message(&streamer, start());
        drain(&mut streamer_rx);
        drain(&mut persisted);

        hub.disconnect(&streamer);

        assert!(hub.sessions().get("s1").is_none());
        assert!(!hub.connections().contains(streamer.connection));
        assert!(drain(&mut streamer_rx).is_empty());
        assert!(drain(&mut persisted).is_empty());

        // Second disconnect is a no-op.
        hub.disconnect(&streamer);
    }

    #[test]
    fn reopen_overwrites_and_prior_connection_stays_registered() {
        let Harness { hub, .. } = harness(10);
        let (first, mut first_rx) = client(&hub, "s1");
        let (second, mut second_rx) = client(&hub, "s1");

        assert_eq!(second.replaced, Some(first.connection));
        assert_eq!(hub.sessions().get("s1").unwrap().connection, second.connection);
        assert!(hub.connections().contains(first.connection));
        assert_eq!(hub.connections().len(), 2);

        // The displaced connection no longer drives the session.
        hub.handle_message(&first, start());
        assert!(drain(&mut first_rx).is_empty());

        // It still receives broadcasts.
        hub.handle_message(&second, start());
        drain(&mut second_rx);
        hub.handle_message(&second, metrics(5));
        assert_eq!(drain(&mut first_rx).len(), 1);

        // Its later disconnect does not tear down the new binding.
        hub.disconnect(&first);
        assert!(hub.sessions().get("s1").is_some());
        assert!(!hub.connections().contains(first.connection));
    }

    #[test]
    fn dead_recipient_is_torn_down_during_broadcast() {
        let Harness { hub, .. } = harness(10);
        let (streamer, mut streamer_rx) = client(&hub, "s1");
        let (viewer, viewer_rx) = client(&hub, "dash");
        drop(viewer_rx);

        hub.handle_message(&streamer, start());
        drain(&mut streamer_rx);
        hub.handle_message(&streamer, metrics(1));

        assert_eq!(drain(&mut streamer_rx).len(), 1);
        assert!(!hub.connections().contains(viewer.connection));
        assert!(hub.sessions().get("dash").is_none());
    }

    #[test]
    fn ping_gets_pong() {
        let Harness { hub, .. } = harness(10);
        let (conn, mut rx) = client(&hub, "s1");
        hub.handle_frame(&conn, r#"{"type":"ping","timestamp":42}"#);
        assert_eq!(drain(&mut rx), vec![ServerMessage::Pong { timestamp: 42 }]);
    }
}
