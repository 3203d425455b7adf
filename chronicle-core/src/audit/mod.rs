//! Read-only analytics over an event store
//!
//! [`AuditEngine`] answers "what happened in this session" questions:
//! structured reports with summary statistics and heuristic insights,
//! per-agent performance counters, and decision lifecycle metrics. It
//! never mutates the store; every report is recomputed on demand and
//! handed to the caller, never cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::event::{AgentAction, DecisionStage, Event, EventPayload};
use crate::store::{EventFilter, SharedEventStore};

mod detectors;
pub mod export;

pub use export::{ReportExporter, ReportFormat};

/// Finding class produced by a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    /// Recurring structure in the event flow
    Pattern,
    /// Deviation from the session's own baseline
    Anomaly,
}

/// Severity ranking for insights
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Stable string form used in rendered reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A typed, severity-ranked finding referencing the events that justify it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Finding class
    pub kind: InsightKind,

    /// Severity ranking
    pub severity: Severity,

    /// Short human-readable title
    pub title: String,

    /// Longer human-readable description
    pub description: String,

    /// Ids of the events that triggered the finding
    pub event_ids: Vec<String>,
}

/// Decision funnel counts for one queried event set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionsFlow {
    /// Decisions created
    pub created: usize,

    /// Decisions resolved
    pub resolved: usize,

    /// Decisions deferred
    pub deferred: usize,

    /// Created minus resolved, floored at zero
    pub pending: usize,
}

/// Summary statistics for one queried event set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Matched event count
    pub total_events: usize,

    /// Event counts keyed by category
    pub by_category: BTreeMap<String, usize>,

    /// Event counts keyed by source
    pub by_source: BTreeMap<String, usize>,

    /// Timestamp of the earliest matched event
    pub first_timestamp: Option<DateTime<Utc>>,

    /// Timestamp of the latest matched event
    pub last_timestamp: Option<DateTime<Utc>>,

    /// Decision funnel counts
    pub decisions_flow: DecisionsFlow,
}

/// An on-demand analytical report: summary, matched events, and insights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// When the report was computed
    pub generated_at: DateTime<Utc>,

    /// Session the report covers
    pub session_id: String,

    /// Summary statistics
    pub summary: ReportSummary,

    /// The matched events, in append order
    pub events: Vec<Event>,

    /// Heuristic findings, in detector order
    pub insights: Vec<Insight>,
}

/// Activity counters for one agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    /// Times the agent was activated
    pub activations: usize,

    /// Signals the agent emitted
    pub signals: usize,

    /// Recommendations the agent produced
    pub recommendations: usize,

    /// Agent proposals that were accepted
    pub proposals_accepted: usize,

    /// Agent proposals that were rejected
    pub proposals_rejected: usize,

    /// Accepted fraction of resolved proposals; zero with no samples
    pub acceptance_rate: f64,
}

/// Global decision lifecycle metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    /// Decisions created
    pub created: usize,

    /// Decisions resolved
    pub resolved: usize,

    /// Decisions deferred
    pub deferred: usize,

    /// Created minus resolved, floored at zero
    pub pending: usize,

    /// Resolved fraction of created decisions; zero with no creations
    pub resolution_rate: f64,

    /// Mean time from creation to resolution, over decisions whose
    /// creation event is present in the log
    pub mean_resolution_latency: Option<Duration>,
}

/// Read-only analytics engine over a shared event store
pub struct AuditEngine {
    store: SharedEventStore,
}

impl AuditEngine {
    /// Create an engine over the given store
    pub fn new(store: SharedEventStore) -> Self {
        Self { store }
    }

    /// Run the given query and compute a full report over the matched
    /// events: summary statistics plus the heuristic detector battery.
    ///
    /// Detectors that find nothing contribute no insight; a report over
    /// zero events has all-zero counts rather than being an error.
    pub async fn generate_report(&self, filter: &EventFilter) -> AuditReport {
        let (events, session_id) = {
            let guard = self.store.read().await;
            (guard.query(filter), guard.session_id().to_string())
        };

        let summary = summarize(&events);
        let insights = detectors::run_all(&events);

        tracing::debug!(
            session_id = %session_id,
            events = events.len(),
            insights = insights.len(),
            "Audit report generated"
        );

        AuditReport {
            generated_at: Utc::now(),
            session_id,
            summary,
            events,
            insights,
        }
    }

    /// Per-agent activity counters over the full log, keyed by agent id
    pub async fn agent_performance(&self) -> BTreeMap<String, AgentPerformance> {
        let events = self.store.read().await.all_events();

        let mut by_agent: BTreeMap<String, AgentPerformance> = BTreeMap::new();
        for event in &events {
            let EventPayload::Agent(ref payload) = event.payload else {
                continue;
            };
            let entry = by_agent.entry(payload.agent_id.clone()).or_default();
            match payload.action {
                AgentAction::Activated => entry.activations += 1,
                AgentAction::Signal => entry.signals += 1,
                AgentAction::Recommendation => entry.recommendations += 1,
                AgentAction::ProposalAccepted => entry.proposals_accepted += 1,
                AgentAction::ProposalRejected => entry.proposals_rejected += 1,
            }
        }

        for perf in by_agent.values_mut() {
            let resolved = perf.proposals_accepted + perf.proposals_rejected;
            if resolved > 0 {
                perf.acceptance_rate = perf.proposals_accepted as f64 / resolved as f64;
            }
        }

        by_agent
    }

    /// Decision lifecycle metrics over the full log.
    ///
    /// Resolution latency matches each resolution back to its creation via
    /// the shared decision id carried in the payload, not via causal links.
    pub async fn decision_metrics(&self) -> DecisionMetrics {
        let events = self.store.read().await.all_events();

        let mut created_at: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        let mut metrics = DecisionMetrics::default();
        let mut latency_total = Duration::ZERO;
        let mut latency_samples = 0u32;

        for event in &events {
            let EventPayload::Decision(ref payload) = event.payload else {
                continue;
            };
            match payload.stage {
                DecisionStage::Created => {
                    metrics.created += 1;
                    created_at
                        .entry(payload.decision_id.clone())
                        .or_insert(event.timestamp);
                }
                DecisionStage::Resolved => {
                    metrics.resolved += 1;
                    if let Some(start) = created_at.get(&payload.decision_id) {
                        if let Ok(latency) = (event.timestamp - *start).to_std() {
                            latency_total += latency;
                            latency_samples += 1;
                        }
                    }
                }
                DecisionStage::Deferred => metrics.deferred += 1,
            }
        }

        metrics.pending = metrics.created.saturating_sub(metrics.resolved);
        if metrics.created > 0 {
            metrics.resolution_rate = metrics.resolved as f64 / metrics.created as f64;
        }
        if latency_samples > 0 {
            metrics.mean_resolution_latency = Some(latency_total / latency_samples);
        }

        metrics
    }
}

fn summarize(events: &[Event]) -> ReportSummary {
    let mut summary = ReportSummary {
        total_events: events.len(),
        first_timestamp: events.first().map(|e| e.timestamp),
        last_timestamp: events.last().map(|e| e.timestamp),
        ..Default::default()
    };

    for event in events {
        *summary
            .by_category
            .entry(event.category.as_str().to_string())
            .or_insert(0) += 1;
        *summary
            .by_source
            .entry(event.source.as_str().to_string())
            .or_insert(0) += 1;

        if let EventPayload::Decision(ref payload) = event.payload {
            match payload.stage {
                DecisionStage::Created => summary.decisions_flow.created += 1,
                DecisionStage::Resolved => summary.decisions_flow.resolved += 1,
                DecisionStage::Deferred => summary.decisions_flow.deferred += 1,
            }
        }
    }
    summary.decisions_flow.pending = summary
        .decisions_flow
        .created
        .saturating_sub(summary.decisions_flow.resolved);

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        generate_event_id, AgentPayload, DecisionPayload, EventCategory, EventContext,
        EventMetadata, EventSource,
    };
    use crate::store::EventStore;

    fn decision_event(decision_id: &str, stage: DecisionStage) -> Event {
        Event {
            id: generate_event_id(),
            timestamp: Utc::now(),
            source: EventSource::User,
            category: EventCategory::Decision,
            event_type: format!("decision.{:?}", stage).to_lowercase(),
            context: EventContext::default(),
            payload: EventPayload::Decision(DecisionPayload {
                decision_id: decision_id.to_string(),
                stage,
                title: Some("Adopt proposal".to_string()),
                outcome: None,
            }),
            description: format!("Decision {decision_id}"),
            caused_by: None,
            correlation_id: None,
            metadata: EventMetadata::default(),
        }
    }

    fn agent_event(agent_id: &str, action: AgentAction) -> Event {
        Event {
            id: generate_event_id(),
            timestamp: Utc::now(),
            source: EventSource::Agent,
            category: EventCategory::AgentActivity,
            event_type: "agent.activity".to_string(),
            context: EventContext::default(),
            payload: EventPayload::Agent(AgentPayload {
                agent_id: agent_id.to_string(),
                action,
                subject: None,
                detail: serde_json::Value::Null,
            }),
            description: format!("Agent {agent_id}"),
            caused_by: None,
            correlation_id: None,
            metadata: EventMetadata::default(),
        }
    }

    async fn engine_with(events: Vec<Event>) -> AuditEngine {
        let mut store = EventStore::new("audit_test");
        for event in events {
            store.append(event);
        }
        AuditEngine::new(store.into_shared())
    }

    #[tokio::test]
    async fn test_decision_funnel_counts() {
        let engine = engine_with(vec![
            decision_event("D1", DecisionStage::Created),
            decision_event("D1", DecisionStage::Resolved),
        ])
        .await;

        let report = engine.generate_report(&EventFilter::default()).await;
        let flow = report.summary.decisions_flow;
        assert_eq!(flow.created, 1);
        assert_eq!(flow.resolved, 1);
        assert_eq!(flow.pending, 0);
    }

    #[tokio::test]
    async fn test_bottleneck_insight_is_reported() {
        let events = (0..6)
            .map(|i| decision_event(&format!("D{i}"), DecisionStage::Created))
            .collect();
        let engine = engine_with(events).await;

        let report = engine.generate_report(&EventFilter::default()).await;
        let bottlenecks: Vec<_> = report
            .insights
            .iter()
            .filter(|i| i.title == "Decision Bottleneck")
            .collect();

        assert_eq!(bottlenecks.len(), 1);
        assert_eq!(bottlenecks[0].severity, Severity::Warning);
        assert_eq!(bottlenecks[0].event_ids.len(), 6);
    }

    #[tokio::test]
    async fn test_agent_performance_counters_and_acceptance_rate() {
        let engine = engine_with(vec![
            agent_event("A", AgentAction::Activated),
            agent_event("A", AgentAction::Signal),
            agent_event("A", AgentAction::ProposalAccepted),
            agent_event("A", AgentAction::ProposalRejected),
        ])
        .await;

        let performance = engine.agent_performance().await;
        let a = &performance["A"];
        assert_eq!(a.activations, 1);
        assert_eq!(a.signals, 1);
        assert_eq!(a.proposals_accepted, 1);
        assert_eq!(a.proposals_rejected, 1);
        assert_eq!(a.acceptance_rate, 0.5);
    }

    #[tokio::test]
    async fn test_decision_metrics_latency_matches_by_decision_id() {
        let mut created = decision_event("D1", DecisionStage::Created);
        created.timestamp = Utc::now() - chrono::Duration::seconds(30);
        let resolved = decision_event("D1", DecisionStage::Resolved);

        let engine = engine_with(vec![
            created,
            decision_event("D2", DecisionStage::Created),
            decision_event("D3", DecisionStage::Deferred),
            resolved,
        ])
        .await;

        let metrics = engine.decision_metrics().await;
        assert_eq!(metrics.created, 2);
        assert_eq!(metrics.resolved, 1);
        assert_eq!(metrics.deferred, 1);
        assert_eq!(metrics.pending, 1);
        assert_eq!(metrics.resolution_rate, 0.5);

        let latency = metrics.mean_resolution_latency.unwrap();
        assert!(latency >= Duration::from_secs(29));
        assert!(latency <= Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_empty_report_has_zero_counts() {
        let engine = engine_with(Vec::new()).await;

        let report = engine.generate_report(&EventFilter::default()).await;
        assert_eq!(report.summary.total_events, 0);
        assert_eq!(report.summary.decisions_flow, DecisionsFlow::default());
        assert!(report.summary.by_category.is_empty());
        assert!(report.events.is_empty());
        assert!(report.insights.is_empty());

        let metrics = engine.decision_metrics().await;
        assert_eq!(metrics, DecisionMetrics::default());
        assert!(engine.agent_performance().await.is_empty());
    }
}
