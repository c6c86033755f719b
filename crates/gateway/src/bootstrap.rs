//! AppState construction shared by the `serve` command and tests.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use sp_domain::config::{Config, ConfigSeverity};
use sp_store::DocumentStore;

use crate::runtime::persist::{PersistHandle, PersistWriter};
use crate::state::AppState;
use crate::stream::StreamHub;

/// Validate config, open the document store, start the persistence writer
/// and return a fully-wired [`AppState`] plus the writer's handle.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<(AppState, PersistWriter)> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Document store ───────────────────────────────────────────────
    let store = sp_store::create_store(&config.store)
        .await
        .context("opening document store")?;
    tracing::info!(backend = store.backend(), "document store ready");

    Ok(build_with_store(config, store))
}

/// Wire the hub and writer around an already-open store.
pub fn build_with_store(config: Arc<Config>, store: Arc<dyn DocumentStore>) -> (AppState, PersistWriter) {
    // ── Persistence queue + writer ───────────────────────────────────
    let (persist, persist_rx) = PersistHandle::channel(config.streaming.persist_queue);
    let writer = PersistWriter::spawn(store.clone(), &persist, persist_rx);
    tracing::info!(capacity = config.streaming.persist_queue, "persist writer ready");

    // ── Stream hub ───────────────────────────────────────────────────
    let hub = Arc::new(StreamHub::new(&config.streaming, persist));
    tracing::info!(
        sample_interval = hub.sampling().interval(),
        outbound_buffer = config.streaming.outbound_buffer,
        idle_timeout_secs = ?config.streaming.idle_timeout_secs,
        "stream hub ready"
    );

    let state = AppState {
        config,
        hub,
        store,
        started_at: Instant::now(),
    };
    (state, writer)
}
