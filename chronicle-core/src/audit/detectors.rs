//! Heuristic detector battery
//!
//! Each detector scans the queried event set independently and contributes
//! at most one [`Insight`]. Detectors evaluate the queried set, not the
//! whole log, so callers can scope findings with the report query. A
//! detector that finds nothing contributes nothing; there is no error path.

use std::collections::{BTreeMap, HashSet};

use super::{Insight, InsightKind, Severity};
use crate::event::{DecisionStage, Event, EventCategory, EventPayload, NavigationDirection};

/// Fraction of error events above which the session is flagged critical
const ERROR_RATE_CRITICAL: f64 = 0.10;

/// Error count at which recurring errors are flagged even under the rate
const ERROR_COUNT_WARNING: usize = 3;

/// Unresolved-decision surplus at which a backlog is flagged
const BACKLOG_THRESHOLD: usize = 5;

/// Fraction of rejected proposals above which rejections are flagged
const REJECTION_RATE_WARNING: f64 = 0.5;

/// Minimum resolved proposals before a zero-rejection streak is notable
const UNCHALLENGED_MIN_SAMPLES: usize = 5;

/// Fraction of events in one sphere above which concentration is flagged
const CONCENTRATION_THRESHOLD: f64 = 0.7;

/// Multiple of the mean per-minute rate above which a spike is flagged
const SPIKE_FACTOR: f64 = 2.0;

/// A-B-A navigation pattern count at which thrashing is flagged
const THRASHING_THRESHOLD: usize = 3;

/// Run the full battery against one queried event set, in a fixed order
pub(crate) fn run_all(events: &[Event]) -> Vec<Insight> {
    [
        detect_error_rate(events),
        detect_decision_backlog(events),
        detect_proposal_rejection(events),
        detect_sphere_concentration(events),
        detect_activity_spike(events),
        detect_navigation_thrashing(events),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn detect_error_rate(events: &[Event]) -> Option<Insight> {
    let error_ids: Vec<String> = events
        .iter()
        .filter(|e| e.category == EventCategory::Error)
        .map(|e| e.id.clone())
        .collect();
    if error_ids.is_empty() {
        return None;
    }

    let rate = error_ids.len() as f64 / events.len() as f64;
    if rate > ERROR_RATE_CRITICAL {
        Some(Insight {
            kind: InsightKind::Anomaly,
            severity: Severity::Critical,
            title: "High Error Rate".to_string(),
            description: format!(
                "{} of {} events ({:.0}%) are errors",
                error_ids.len(),
                events.len(),
                rate * 100.0
            ),
            event_ids: error_ids,
        })
    } else if error_ids.len() >= ERROR_COUNT_WARNING {
        Some(Insight {
            kind: InsightKind::Anomaly,
            severity: Severity::Warning,
            title: "Recurring Errors".to_string(),
            description: format!("{} errors occurred during the session", error_ids.len()),
            event_ids: error_ids,
        })
    } else {
        None
    }
}

fn detect_decision_backlog(events: &[Event]) -> Option<Insight> {
    let mut created: Vec<(&str, &str)> = Vec::new();
    let mut resolved: HashSet<&str> = HashSet::new();

    for event in events {
        if let EventPayload::Decision(ref payload) = event.payload {
            match payload.stage {
                DecisionStage::Created => created.push((&payload.decision_id, &event.id)),
                DecisionStage::Resolved => {
                    resolved.insert(&payload.decision_id);
                }
                DecisionStage::Deferred => {}
            }
        }
    }

    let unresolved: Vec<String> = created
        .iter()
        .filter(|(decision_id, _)| !resolved.contains(decision_id))
        .map(|(_, event_id)| event_id.to_string())
        .collect();

    if created.len() >= resolved.len() + BACKLOG_THRESHOLD {
        Some(Insight {
            kind: InsightKind::Pattern,
            severity: Severity::Warning,
            title: "Decision Bottleneck".to_string(),
            description: format!(
                "{} decisions created but only {} resolved; {} unresolved",
                created.len(),
                resolved.len(),
                unresolved.len()
            ),
            event_ids: unresolved,
        })
    } else {
        None
    }
}

fn detect_proposal_rejection(events: &[Event]) -> Option<Insight> {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for event in events {
        if let EventPayload::Agent(ref payload) = event.payload {
            match payload.action {
                crate::event::AgentAction::ProposalAccepted => accepted.push(event.id.clone()),
                crate::event::AgentAction::ProposalRejected => rejected.push(event.id.clone()),
                _ => {}
            }
        }
    }

    let total = accepted.len() + rejected.len();
    if total == 0 {
        return None;
    }

    let rejection_rate = rejected.len() as f64 / total as f64;
    if rejection_rate > REJECTION_RATE_WARNING {
        Some(Insight {
            kind: InsightKind::Pattern,
            severity: Severity::Warning,
            title: "High Proposal Rejection Rate".to_string(),
            description: format!(
                "{} of {} resolved agent proposals ({:.0}%) were rejected",
                rejected.len(),
                total,
                rejection_rate * 100.0
            ),
            event_ids: rejected,
        })
    } else if rejected.is_empty() && total >= UNCHALLENGED_MIN_SAMPLES {
        Some(Insight {
            kind: InsightKind::Pattern,
            severity: Severity::Info,
            title: "Proposals Never Rejected".to_string(),
            description: format!(
                "All {total} resolved agent proposals were accepted without rejection"
            ),
            event_ids: accepted,
        })
    } else {
        None
    }
}

fn detect_sphere_concentration(events: &[Event]) -> Option<Insight> {
    if events.is_empty() {
        return None;
    }

    let mut by_sphere: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for event in events {
        if let Some(ref sphere) = event.context.sphere_id {
            by_sphere.entry(sphere).or_default().push(&event.id);
        }
    }

    // The share is measured against the whole queried set, so unscoped
    // events dilute it.
    let (sphere, ids) = by_sphere.iter().max_by_key(|(_, ids)| ids.len())?;
    let share = ids.len() as f64 / events.len() as f64;
    if share > CONCENTRATION_THRESHOLD {
        Some(Insight {
            kind: InsightKind::Pattern,
            severity: Severity::Info,
            title: "Activity Concentration".to_string(),
            description: format!(
                "{:.0}% of all activity happened in sphere {sphere}",
                share * 100.0
            ),
            event_ids: ids.iter().map(|id| id.to_string()).collect(),
        })
    } else {
        None
    }
}

fn detect_activity_spike(events: &[Event]) -> Option<Insight> {
    let first = events.first()?.timestamp;
    let last = events.last()?.timestamp;
    let minutes = (last - first).num_seconds() / 60 + 1;
    if minutes < 2 {
        return None;
    }

    // Sparse map keyed by minute index: cost stays proportional to the
    // event count, not the session's wall-clock span.
    let mut buckets: BTreeMap<i64, Vec<&str>> = BTreeMap::new();
    for event in events {
        let bucket = ((event.timestamp - first).num_seconds() / 60).clamp(0, minutes - 1);
        buckets.entry(bucket).or_default().push(&event.id);
    }

    // Empty minutes still count toward the mean
    let mean = events.len() as f64 / minutes as f64;
    let (minute, ids) = buckets
        .iter()
        .filter(|(_, ids)| ids.len() as f64 > SPIKE_FACTOR * mean)
        .max_by_key(|(_, ids)| ids.len())?;

    Some(Insight {
        kind: InsightKind::Anomaly,
        severity: Severity::Info,
        title: "Activity Spike".to_string(),
        description: format!(
            "Minute {minute} saw {} events against a mean of {:.1} per minute",
            ids.len(),
            mean
        ),
        event_ids: ids.iter().map(|id| id.to_string()).collect(),
    })
}

fn detect_navigation_thrashing(events: &[Event]) -> Option<Insight> {
    let visits: Vec<(&str, &str)> = events
        .iter()
        .filter_map(|e| match e.payload {
            EventPayload::Navigation(ref payload)
                if payload.direction == NavigationDirection::Enter =>
            {
                Some((payload.sphere_id.as_str(), e.id.as_str()))
            }
            _ => None,
        })
        .collect();

    let mut pattern_count = 0;
    let mut involved: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for window in visits.windows(3) {
        let [(a, a_id), (b, b_id), (back, back_id)] = window else {
            continue;
        };
        if a == back && a != b {
            pattern_count += 1;
            for id in [a_id, b_id, back_id] {
                if seen.insert(*id) {
                    involved.push(id.to_string());
                }
            }
        }
    }

    if pattern_count >= THRASHING_THRESHOLD {
        Some(Insight {
            kind: InsightKind::Anomaly,
            severity: Severity::Warning,
            title: "Navigation Thrashing".to_string(),
            description: format!(
                "{pattern_count} back-and-forth sphere switches suggest difficulty locating content"
            ),
            event_ids: involved,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        generate_event_id, AgentAction, AgentPayload, DecisionPayload, ErrorPayload,
        EventContext, EventMetadata, EventSource, NavigationPayload,
    };
    use chrono::{Duration, Utc};

    fn base_event(category: EventCategory, payload: EventPayload) -> Event {
        Event {
            id: generate_event_id(),
            timestamp: Utc::now(),
            source: EventSource::User,
            category,
            event_type: "test".to_string(),
            context: EventContext::default(),
            payload,
            description: "test".to_string(),
            caused_by: None,
            correlation_id: None,
            metadata: EventMetadata::default(),
        }
    }

    fn interaction() -> Event {
        base_event(
            EventCategory::Interaction,
            EventPayload::Custom {
                name: "click".to_string(),
                data: serde_json::Value::Null,
            },
        )
    }

    fn error() -> Event {
        base_event(
            EventCategory::Error,
            EventPayload::Error(ErrorPayload {
                code: None,
                message: "boom".to_string(),
                recoverable: true,
            }),
        )
    }

    fn proposal(action: AgentAction) -> Event {
        base_event(
            EventCategory::AgentActivity,
            EventPayload::Agent(AgentPayload {
                agent_id: "scout".to_string(),
                action,
                subject: None,
                detail: serde_json::Value::Null,
            }),
        )
    }

    fn enter(sphere: &str) -> Event {
        base_event(
            EventCategory::Navigation,
            EventPayload::Navigation(NavigationPayload {
                sphere_id: sphere.to_string(),
                from_sphere: None,
                direction: NavigationDirection::Enter,
            }),
        )
    }

    #[test]
    fn test_error_rate_escalates_to_critical() {
        let mut events: Vec<Event> = (0..8).map(|_| interaction()).collect();
        events.push(error());
        events.push(error());

        let insight = detect_error_rate(&events).unwrap();
        assert_eq!(insight.severity, Severity::Critical);
        assert_eq!(insight.event_ids.len(), 2);
    }

    #[test]
    fn test_recurring_errors_warn_below_critical_rate() {
        let mut events: Vec<Event> = (0..47).map(|_| interaction()).collect();
        for _ in 0..3 {
            events.push(error());
        }

        let insight = detect_error_rate(&events).unwrap();
        assert_eq!(insight.severity, Severity::Warning);
        assert_eq!(insight.title, "Recurring Errors");
    }

    #[test]
    fn test_few_errors_raise_nothing() {
        let mut events: Vec<Event> = (0..30).map(|_| interaction()).collect();
        events.push(error());

        assert!(detect_error_rate(&events).is_none());
    }

    #[test]
    fn test_backlog_ignores_resolved_decisions() {
        let mut events = Vec::new();
        for i in 0..6 {
            events.push(base_event(
                EventCategory::Decision,
                EventPayload::Decision(DecisionPayload {
                    decision_id: format!("D{i}"),
                    stage: DecisionStage::Created,
                    title: None,
                    outcome: None,
                }),
            ));
        }
        events.push(base_event(
            EventCategory::Decision,
            EventPayload::Decision(DecisionPayload {
                decision_id: "D0".to_string(),
                stage: DecisionStage::Resolved,
                title: None,
                outcome: None,
            }),
        ));

        // 6 created, 1 resolved: exactly at the threshold
        let insight = detect_decision_backlog(&events).unwrap();
        assert_eq!(insight.title, "Decision Bottleneck");
        assert_eq!(insight.event_ids.len(), 5);
    }

    #[test]
    fn test_rejection_rate_above_half_warns() {
        let events = vec![
            proposal(AgentAction::ProposalAccepted),
            proposal(AgentAction::ProposalRejected),
            proposal(AgentAction::ProposalRejected),
        ];

        let insight = detect_proposal_rejection(&events).unwrap();
        assert_eq!(insight.severity, Severity::Warning);
        assert_eq!(insight.event_ids.len(), 2);
    }

    #[test]
    fn test_unchallenged_proposals_are_informational() {
        let events: Vec<Event> = (0..5)
            .map(|_| proposal(AgentAction::ProposalAccepted))
            .collect();

        let insight = detect_proposal_rejection(&events).unwrap();
        assert_eq!(insight.severity, Severity::Info);
        assert_eq!(insight.title, "Proposals Never Rejected");
    }

    #[test]
    fn test_even_split_raises_nothing() {
        let events = vec![
            proposal(AgentAction::ProposalAccepted),
            proposal(AgentAction::ProposalRejected),
        ];
        assert!(detect_proposal_rejection(&events).is_none());
    }

    #[test]
    fn test_sphere_concentration() {
        let mut events: Vec<Event> = (0..8)
            .map(|_| {
                let mut e = interaction();
                e.context.sphere_id = Some("governance".to_string());
                e
            })
            .collect();
        let mut outlier = interaction();
        outlier.context.sphere_id = Some("finance".to_string());
        events.push(outlier);

        let insight = detect_sphere_concentration(&events).unwrap();
        assert_eq!(insight.severity, Severity::Info);
        assert!(insight.description.contains("governance"));
        assert_eq!(insight.event_ids.len(), 8);
    }

    #[test]
    fn test_unscoped_events_dilute_concentration() {
        // 3 of 10 events share a sphere; the other 7 carry no sphere at
        // all. That is 30% concentration, not 100%.
        let mut events: Vec<Event> = (0..7).map(|_| interaction()).collect();
        for _ in 0..3 {
            let mut e = interaction();
            e.context.sphere_id = Some("governance".to_string());
            events.push(e);
        }

        assert!(detect_sphere_concentration(&events).is_none());
    }

    #[test]
    fn test_fully_unscoped_events_raise_nothing() {
        let events: Vec<Event> = (0..5).map(|_| interaction()).collect();
        assert!(detect_sphere_concentration(&events).is_none());
    }

    #[test]
    fn test_activity_spike_detected_against_mean() {
        let start = Utc::now();
        let mut events = Vec::new();
        // One event per minute for ten minutes, then a burst in minute ten
        for i in 0..10 {
            let mut e = interaction();
            e.timestamp = start + Duration::minutes(i);
            events.push(e);
        }
        for _ in 0..10 {
            let mut e = interaction();
            e.timestamp = start + Duration::minutes(10);
            events.push(e);
        }

        let insight = detect_activity_spike(&events).unwrap();
        assert_eq!(insight.kind, InsightKind::Anomaly);
        assert!(insight.event_ids.len() >= 10);
    }

    #[test]
    fn test_spike_handles_year_long_spans() {
        // Two events a year apart: the minute span is huge but the bucket
        // map only holds occupied minutes.
        let start = Utc::now();
        let mut early = interaction();
        early.timestamp = start;
        let mut late = interaction();
        late.timestamp = start + Duration::days(365);

        let insight = detect_activity_spike(&[early, late]).unwrap();
        assert_eq!(insight.event_ids.len(), 1);
    }

    #[test]
    fn test_uniform_activity_raises_nothing() {
        let start = Utc::now();
        let events: Vec<Event> = (0..10)
            .map(|i| {
                let mut e = interaction();
                e.timestamp = start + Duration::minutes(i);
                e
            })
            .collect();

        assert!(detect_activity_spike(&events).is_none());
    }

    #[test]
    fn test_navigation_thrashing() {
        let events = vec![
            enter("a"),
            enter("b"),
            enter("a"),
            enter("b"),
            enter("a"),
            enter("b"),
        ];

        // a-b-a, b-a-b, a-b-a, b-a-b: four overlapping patterns
        let insight = detect_navigation_thrashing(&events).unwrap();
        assert_eq!(insight.severity, Severity::Warning);
        assert_eq!(insight.title, "Navigation Thrashing");
    }

    #[test]
    fn test_forward_navigation_is_not_thrashing() {
        let events = vec![enter("a"), enter("b"), enter("c"), enter("a")];
        assert!(detect_navigation_thrashing(&events).is_none());
    }
}
