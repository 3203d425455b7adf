//! Integration tests for the timeline subsystem
//!
//! These tests drive the full record, audit, replay, and export flow
//! through the public API, the way an embedding application would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Once;

use chronicle_core::prelude::*;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chronicle_core=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

fn context(session_id: &str) -> TimelineContext {
    init_tracing();
    TimelineContext::new(ChronicleConfig {
        session_id: Some(session_id.to_string()),
        ..Default::default()
    })
}

/// Record a small governance session: navigation, decisions, agent
/// activity, and one error.
async fn record_session(ctx: &TimelineContext) {
    let recorder = ctx.recorder();

    recorder.record_session_start().await;
    recorder
        .record_navigation_enter("sphere_governance", RecordOptions::default())
        .await;
    recorder
        .set_active_sphere(Some("sphere_governance".to_string()))
        .await;

    recorder.push_correlation("op_charter").await;
    let created = recorder
        .record_decision_created("dec_1", "Adopt charter", RecordOptions::default())
        .await;
    recorder
        .record_agent_activated("scout", RecordOptions::default().caused_by(created.clone()))
        .await;
    recorder
        .record_agent_recommendation(
            "scout",
            "charter_v2",
            serde_json::json!({"confidence": 0.9}),
            RecordOptions::default().caused_by(created.clone()),
        )
        .await;
    recorder
        .record_proposal_accepted("scout", "charter_v2", RecordOptions::default())
        .await;
    recorder
        .record_decision_resolved("dec_1", "adopted", RecordOptions::default())
        .await;
    recorder.pop_correlation().await;

    recorder
        .record_error("save failed", Some("E42".to_string()), true, RecordOptions::default())
        .await;
    recorder.record_session_end().await;
}

#[tokio::test]
async fn test_record_then_audit_full_session() {
    let ctx = context("e2e_audit");
    record_session(&ctx).await;

    let report = ctx.audit().generate_report(&EventFilter::default()).await;
    assert_eq!(report.session_id, "e2e_audit");
    assert_eq!(report.summary.total_events, 9);
    assert_eq!(report.summary.by_category["decision"], 2);
    assert_eq!(report.summary.by_category["agent_activity"], 3);
    assert_eq!(report.summary.decisions_flow.created, 1);
    assert_eq!(report.summary.decisions_flow.resolved, 1);
    assert_eq!(report.summary.decisions_flow.pending, 0);

    let performance = ctx.audit().agent_performance().await;
    let scout = &performance["scout"];
    assert_eq!(scout.activations, 1);
    assert_eq!(scout.recommendations, 1);
    assert_eq!(scout.proposals_accepted, 1);
    assert_eq!(scout.acceptance_rate, 1.0);

    let metrics = ctx.audit().decision_metrics().await;
    assert_eq!(metrics.resolution_rate, 1.0);
    assert!(metrics.mean_resolution_latency.is_some());

    let markdown = ReportExporter::to_markdown(&report);
    assert!(markdown.contains("## Decisions Flow"));
    assert!(markdown.contains("- Created: 1"));
}

#[tokio::test]
async fn test_correlation_and_causality_are_queryable() {
    let ctx = context("e2e_links");
    record_session(&ctx).await;

    let store = ctx.store().read().await;

    let correlated = store.events_for_correlation("op_charter");
    assert_eq!(correlated.len(), 5);
    assert!(correlated
        .windows(2)
        .all(|w| w[0].context.sequence < w[1].context.sequence));

    let recommendation = correlated
        .iter()
        .find(|e| e.event_type == "agent.recommendation")
        .unwrap();
    let chain = store.causality_chain(&recommendation.id);
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].event_type, "decision.created");
}

#[tokio::test]
async fn test_replay_of_recorded_session_preserves_order() {
    let ctx = context("e2e_replay");
    record_session(&ctx).await;

    let replay = ctx.new_replay();
    let loaded = replay
        .load_from_store(ctx.store(), ReplayOptions::default().skipping_errors())
        .await;
    assert_eq!(loaded, 8);

    let emitted = Arc::new(AtomicUsize::new(0));
    let sink = emitted.clone();
    replay.on_event(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    let mut sequences = Vec::new();
    while let Some(event) = replay.step() {
        sequences.push(event.context.sequence);
    }

    assert_eq!(replay.status(), ReplayStatus::Completed);
    assert_eq!(emitted.load(Ordering::SeqCst), 8);
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));

    // Source untouched
    assert_eq!(ctx.store().read().await.len(), 9);
}

#[tokio::test]
async fn test_export_import_then_audit_matches() {
    let ctx = context("e2e_export");
    record_session(&ctx).await;

    let exported = ctx.export().await.unwrap();
    let imported = EventStore::import(&exported).unwrap();
    assert_eq!(imported.session_id(), "e2e_export");
    assert_eq!(imported.len(), 9);

    let rehydrated = AuditEngine::new(imported.into_shared());
    let report = rehydrated.generate_report(&EventFilter::default()).await;
    assert_eq!(report.summary.total_events, 9);
    assert_eq!(report.summary.decisions_flow.resolved, 1);
}

#[tokio::test]
async fn test_session_file_round_trip() {
    let ctx = context("e2e_file");
    record_session(&ctx).await;

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("session.jsonl");
    {
        let store = ctx.store().read().await;
        store.save(&path).unwrap();
    }

    let loaded = EventStore::load(&path).unwrap();
    assert_eq!(loaded.session_id(), "e2e_file");
    assert_eq!(loaded.all_events(), ctx.store().read().await.all_events());
}

#[tokio::test]
async fn test_subscriber_sees_recorder_appends() {
    let ctx = context("e2e_subscribe");

    let seen = Arc::new(AtomicUsize::new(0));
    let sink = seen.clone();
    let id = ctx.store().write().await.subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    ctx.recorder()
        .record_interaction("click", serde_json::Value::Null, RecordOptions::default())
        .await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert!(ctx.store().write().await.unsubscribe(id));
    ctx.recorder()
        .record_interaction("click", serde_json::Value::Null, RecordOptions::default())
        .await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bottlenecked_session_yields_warning() {
    let ctx = context("e2e_bottleneck");
    for i in 0..6 {
        ctx.recorder()
            .record_decision_created(
                format!("dec_{i}"),
                "Pending decision",
                RecordOptions::default(),
            )
            .await;
    }

    let report = ctx.audit().generate_report(&EventFilter::default()).await;
    assert!(report
        .insights
        .iter()
        .any(|i| i.title == "Decision Bottleneck" && i.severity == Severity::Warning));
}
