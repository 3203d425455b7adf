//! Timeline event model
//!
//! Defines the immutable [`Event`] record and its payload shapes. Events are
//! the only persisted unit of the timeline: every user action, agent action,
//! and system occurrence is captured as one `Event` and appended to an
//! [`EventStore`](crate::store::EventStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::store::StoreSnapshot;

/// Current schema version for events
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Producer class of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Direct human action
    User,
    /// Autonomous agent activity
    Agent,
    /// System-internal occurrence
    System,
    /// Event emitted during replay of a prior session
    Replay,
}

impl EventSource {
    /// Stable string form, used as a map key in audit summaries
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::User => "user",
            EventSource::Agent => "agent",
            EventSource::System => "system",
            EventSource::Replay => "replay",
        }
    }
}

/// Coarse event classification used for fast filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Navigation,
    Interaction,
    Decision,
    AgentActivity,
    StateChange,
    Error,
    Milestone,
    Audit,
}

impl EventCategory {
    /// Stable string form, used as a map key in snapshots and audit summaries
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Navigation => "navigation",
            EventCategory::Interaction => "interaction",
            EventCategory::Decision => "decision",
            EventCategory::AgentActivity => "agent_activity",
            EventCategory::StateChange => "state_change",
            EventCategory::Error => "error",
            EventCategory::Milestone => "milestone",
            EventCategory::Audit => "audit",
        }
    }
}

/// Snapshot of ambient situational data at emission time
///
/// `session_id` and `sequence` are assigned by the store at append time,
/// never by the producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    /// Active sphere (container/scope) identifier
    pub sphere_id: Option<String>,

    /// Active meeting (sub-item) identifier
    pub meeting_id: Option<String>,

    /// Navigation nesting depth
    pub depth: u32,

    /// Active view mode
    pub view_mode: Option<String>,

    /// Recording session this event belongs to
    pub session_id: String,

    /// Per-session monotonically increasing sequence number
    pub sequence: u64,
}

/// Cross-cutting event metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Schema version for forward compatibility
    pub schema_version: u32,

    /// Whether the event may be re-emitted during replay. Events with
    /// irreversible side effects are recorded with `replayable: false` and
    /// excluded from replay sessions by default.
    pub replayable: bool,

    /// Whether the event carries personally identifying information;
    /// used to filter exports
    pub contains_pii: bool,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            replayable: true,
            contains_pii: false,
        }
    }
}

/// Direction of a navigation transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationDirection {
    Enter,
    Exit,
}

/// Lifecycle stage of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStage {
    Created,
    Resolved,
    Deferred,
}

/// Kind of agent activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAction {
    Activated,
    Signal,
    Recommendation,
    ProposalAccepted,
    ProposalRejected,
}

/// Phase of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Start,
    End,
}

/// Navigation transition payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationPayload {
    /// Sphere being entered or exited
    pub sphere_id: String,

    /// Sphere that was active before the transition
    pub from_sphere: Option<String>,

    /// Transition direction
    pub direction: NavigationDirection,
}

/// Decision lifecycle payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPayload {
    /// Logical decision identifier shared across its lifecycle events
    pub decision_id: String,

    /// Lifecycle stage this event records
    pub stage: DecisionStage,

    /// Decision title (usually present on creation)
    pub title: Option<String>,

    /// Outcome or reason (resolution outcome, deferral reason)
    pub outcome: Option<String>,
}

/// Agent activity payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPayload {
    /// Acting agent identifier
    pub agent_id: String,

    /// Kind of activity
    pub action: AgentAction,

    /// Subject of the activity (proposal id, signal topic)
    pub subject: Option<String>,

    /// Opaque domain detail
    pub detail: Value,
}

/// Before/after state diff payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangePayload {
    /// Entity whose state changed
    pub entity: String,

    /// Changed field, if the change is field-scoped
    pub field: Option<String>,

    /// Value before the change
    pub before: Value,

    /// Value after the change
    pub after: Value,
}

/// Error descriptor payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable error code
    pub code: Option<String>,

    /// Human-readable message
    pub message: String,

    /// Whether the producer recovered from the error
    pub recoverable: bool,
}

/// Milestone descriptor payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestonePayload {
    /// Milestone name
    pub name: String,

    /// Opaque domain detail
    pub detail: Value,
}

/// Session lifecycle payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    /// Session identifier
    pub session_id: String,

    /// Start or end
    pub phase: SessionPhase,
}

/// Event payload, a closed sum type keyed by `kind`
///
/// Payloads are structurally matched to their event's declared category but
/// are otherwise opaque to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Navigation transition
    Navigation(NavigationPayload),

    /// Decision lifecycle step
    Decision(DecisionPayload),

    /// Agent activity
    Agent(AgentPayload),

    /// Before/after state diff
    StateChange(StateChangePayload),

    /// Error descriptor
    Error(ErrorPayload),

    /// Milestone descriptor
    Milestone(MilestonePayload),

    /// Session start/end marker
    Session(SessionPayload),

    /// Embedded store snapshot (audit events)
    Snapshot(StoreSnapshot),

    /// Free-form payload for interaction and extension events
    Custom {
        /// Payload name
        name: String,
        /// Payload data
        data: Value,
    },
}

impl EventPayload {
    /// The category this payload shape belongs to, if it implies one.
    ///
    /// `Custom` payloads carry no category constraint.
    pub fn expected_category(&self) -> Option<EventCategory> {
        match self {
            EventPayload::Navigation(_) => Some(EventCategory::Navigation),
            EventPayload::Decision(_) => Some(EventCategory::Decision),
            EventPayload::Agent(_) => Some(EventCategory::AgentActivity),
            EventPayload::StateChange(_) => Some(EventCategory::StateChange),
            EventPayload::Error(_) => Some(EventCategory::Error),
            EventPayload::Milestone(_) => Some(EventCategory::Milestone),
            EventPayload::Session(_) => Some(EventCategory::Milestone),
            EventPayload::Snapshot(_) => Some(EventCategory::Audit),
            EventPayload::Custom { .. } => None,
        }
    }
}

/// An immutable timeline event
///
/// Events are created once (normally through the
/// [`Recorder`](crate::recorder::Recorder)) and never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier, lexically sortable by creation time
    pub id: String,

    /// Creation instant
    pub timestamp: DateTime<Utc>,

    /// Producer class
    pub source: EventSource,

    /// Coarse classification
    pub category: EventCategory,

    /// Fine-grained event kind, e.g. `"decision.created"`
    pub event_type: String,

    /// Ambient situational data at emission time
    pub context: EventContext,

    /// Category-specific payload
    pub payload: EventPayload,

    /// Redundant one-line human rendering, kept for audit/export convenience
    pub description: String,

    /// Id of the single prior event that directly triggered this one
    pub caused_by: Option<String>,

    /// Grouping tag shared by events of one logical multi-step operation
    pub correlation_id: Option<String>,

    /// Cross-cutting metadata
    pub metadata: EventMetadata,
}

impl Event {
    /// Whether the payload shape matches the declared category.
    ///
    /// A mismatch is not fatal (the store logs and keeps the event) but the
    /// Recorder never produces one.
    pub fn payload_matches_category(&self) -> bool {
        match self.payload.expected_category() {
            Some(expected) => expected == self.category,
            None => true,
        }
    }
}

/// Generate a unique event id.
///
/// The id embeds the creation time in fixed-width hex so ids sort lexically
/// in creation order; a random suffix breaks ties between events created in
/// the same millisecond.
pub fn generate_event_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let suffix = Uuid::new_v4().simple().to_string();
    format!("evt-{millis:013x}-{}", &suffix[..8])
}
