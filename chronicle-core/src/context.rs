//! Timeline context
//!
//! [`TimelineContext`] wires the subsystem together: one shared store, one
//! recorder, and one audit engine, constructed explicitly at process or
//! session start and passed to collaborators. There is no hidden global
//! instance; callers own the context's lifecycle, which keeps tests
//! isolated and shutdown explicit.

use std::sync::Arc;

use crate::audit::AuditEngine;
use crate::config::ChronicleConfig;
use crate::error::Result;
use crate::recorder::Recorder;
use crate::replay::ReplayEngine;
use crate::store::{EventStore, ExportOptions, SharedEventStore};

/// Explicitly constructed bundle of the timeline components for one session
pub struct TimelineContext {
    config: ChronicleConfig,
    store: SharedEventStore,
    recorder: Arc<Recorder>,
    audit: Arc<AuditEngine>,
}

impl TimelineContext {
    /// Build a context from the given configuration.
    ///
    /// The store's session id comes from the configuration when set, and is
    /// generated otherwise.
    pub fn new(config: ChronicleConfig) -> Self {
        let store = match config.session_id {
            Some(ref session_id) => EventStore::new(session_id.clone()),
            None => EventStore::with_generated_session(),
        }
        .into_shared();

        let recorder = Arc::new(Recorder::new(store.clone()));
        let audit = Arc::new(AuditEngine::new(store.clone()));

        Self {
            config,
            store,
            recorder,
            audit,
        }
    }

    /// Build a context from configuration loaded from file and environment
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ChronicleConfig::load()?))
    }

    /// The configuration this context was built with
    pub fn config(&self) -> &ChronicleConfig {
        &self.config
    }

    /// Shared handle to the session's event store
    pub fn store(&self) -> &SharedEventStore {
        &self.store
    }

    /// The session's recorder, the intended write path
    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    /// The session's audit engine
    pub fn audit(&self) -> &Arc<AuditEngine> {
        &self.audit
    }

    /// Create a fresh replay engine using the configured timing.
    ///
    /// Replay engines are per-invocation, not shared: each carries its own
    /// session cursor and callbacks.
    pub fn new_replay(&self) -> ReplayEngine {
        ReplayEngine::with_timing(self.config.replay.clone())
    }

    /// Export the session, honoring the configured PII policy
    pub async fn export(&self) -> Result<String> {
        self.store.read().await.export_with(&ExportOptions {
            include_pii: self.config.export.include_pii,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecordOptions;
    use crate::store::EventFilter;

    #[tokio::test]
    async fn test_context_components_share_one_store() {
        let config = ChronicleConfig {
            session_id: Some("ctx_test".to_string()),
            ..Default::default()
        };
        let ctx = TimelineContext::new(config);

        ctx.recorder()
            .record_interaction("click", serde_json::Value::Null, RecordOptions::default())
            .await;

        let report = ctx.audit().generate_report(&EventFilter::default()).await;
        assert_eq!(report.session_id, "ctx_test");
        assert_eq!(report.summary.total_events, 1);
        assert_eq!(ctx.store().read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_contexts_are_isolated() {
        let a = TimelineContext::new(ChronicleConfig::default());
        let b = TimelineContext::new(ChronicleConfig::default());

        a.recorder()
            .record_interaction("click", serde_json::Value::Null, RecordOptions::default())
            .await;

        assert_eq!(a.store().read().await.len(), 1);
        assert!(b.store().read().await.is_empty());
        assert_ne!(
            a.store().read().await.session_id(),
            b.store().read().await.session_id()
        );
    }

    #[tokio::test]
    async fn test_export_honors_pii_policy() {
        let config = ChronicleConfig {
            session_id: Some("pii_ctx".to_string()),
            ..Default::default()
        };
        let mut no_pii = config.clone();
        no_pii.export.include_pii = false;

        let ctx = TimelineContext::new(no_pii);
        ctx.recorder()
            .record_interaction(
                "submit",
                serde_json::json!({"email": "user@example.com"}),
                RecordOptions::default().with_pii(),
            )
            .await;

        let exported = ctx.export().await.unwrap();
        let imported = EventStore::import(&exported).unwrap();
        assert!(imported.is_empty());
    }

    #[tokio::test]
    async fn test_replay_engine_uses_configured_timing() {
        let mut config = ChronicleConfig::default();
        config.replay.default_speed = 2.0;
        let ctx = TimelineContext::new(config);

        let engine = ctx.new_replay();
        ctx.recorder()
            .record_interaction("click", serde_json::Value::Null, RecordOptions::default())
            .await;

        let loaded = engine
            .load_from_store(ctx.store(), crate::replay::ReplayOptions::default())
            .await;
        assert_eq!(loaded, 1);
    }
}
