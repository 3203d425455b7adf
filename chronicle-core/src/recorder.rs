//! Event recorder
//!
//! [`Recorder`] is the production write path for the timeline: it assigns
//! identity, timestamps, ambient context, and causal/correlation linkage to
//! new events before appending them to the shared store. Collaborators call
//! one method per event kind and get back the new event's id.
//!
//! The recorder holds ambient context (active sphere, meeting, depth, view
//! mode) updated via [`Recorder::set_context`] after navigation changes, and
//! a correlation stack so a multi-step operation can bracket itself with
//! [`Recorder::push_correlation`] / [`Recorder::pop_correlation`] and have
//! every event emitted in between tagged automatically.

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::event::{
    generate_event_id, AgentAction, AgentPayload, DecisionPayload, DecisionStage, ErrorPayload,
    Event, EventCategory, EventContext, EventMetadata, EventPayload, EventSource,
    MilestonePayload, NavigationDirection, NavigationPayload, SessionPayload, SessionPhase,
    StateChangePayload,
};
use crate::store::SharedEventStore;

/// Ambient situational state held by the recorder between calls
#[derive(Debug, Clone, Default)]
pub struct AmbientContext {
    /// Active sphere identifier
    pub sphere_id: Option<String>,

    /// Active meeting identifier
    pub meeting_id: Option<String>,

    /// Navigation nesting depth
    pub depth: u32,

    /// Active view mode
    pub view_mode: Option<String>,
}

/// Cross-cutting per-call options accepted by every `record_*` method
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    /// Explicit causal parent event id
    pub caused_by: Option<String>,

    /// Explicit correlation id (overrides the correlation stack)
    pub correlation_id: Option<String>,

    /// Override the method's default source
    pub source: Option<EventSource>,

    /// Override the ambient sphere for this event only
    pub sphere_id: Option<String>,

    /// Override the ambient meeting for this event only
    pub meeting_id: Option<String>,

    /// Override the ambient view mode for this event only
    pub view_mode: Option<String>,

    /// Override the default replayable flag
    pub replayable: Option<bool>,

    /// Mark the event as containing PII
    pub contains_pii: Option<bool>,
}

impl RecordOptions {
    /// Set the causal parent
    pub fn caused_by(mut self, parent_id: impl Into<String>) -> Self {
        self.caused_by = Some(parent_id.into());
        self
    }

    /// Set an explicit correlation id
    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the source
    pub fn from_source(mut self, source: EventSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Mark the event as not replayable (irreversible side effects)
    pub fn not_replayable(mut self) -> Self {
        self.replayable = Some(false);
        self
    }

    /// Mark the event as containing PII
    pub fn with_pii(mut self) -> Self {
        self.contains_pii = Some(true);
        self
    }
}

/// Stateful constructor of well-formed timeline events
pub struct Recorder {
    store: SharedEventStore,
    ambient: RwLock<AmbientContext>,
    correlations: RwLock<Vec<String>>,
}

impl Recorder {
    /// Create a recorder over the given shared store
    pub fn new(store: SharedEventStore) -> Self {
        Self {
            store,
            ambient: RwLock::new(AmbientContext::default()),
            correlations: RwLock::new(Vec::new()),
        }
    }

    /// Replace the held ambient context.
    ///
    /// Collaborators call this on navigation changes so subsequent events
    /// carry the correct scope without re-specifying it per call.
    pub async fn set_context(&self, context: AmbientContext) {
        *self.ambient.write().await = context;
    }

    /// Current ambient context
    pub async fn context(&self) -> AmbientContext {
        self.ambient.read().await.clone()
    }

    /// Update only the active sphere
    pub async fn set_active_sphere(&self, sphere_id: Option<String>) {
        self.ambient.write().await.sphere_id = sphere_id;
    }

    /// Update only the active meeting
    pub async fn set_active_meeting(&self, meeting_id: Option<String>) {
        self.ambient.write().await.meeting_id = meeting_id;
    }

    /// Update only the view mode
    pub async fn set_view_mode(&self, view_mode: Option<String>) {
        self.ambient.write().await.view_mode = view_mode;
    }

    /// Push a correlation id; events emitted while it is on top of the
    /// stack are tagged with it automatically.
    pub async fn push_correlation(&self, correlation_id: impl Into<String>) {
        self.correlations.write().await.push(correlation_id.into());
    }

    /// Pop the innermost correlation id
    pub async fn pop_correlation(&self) -> Option<String> {
        self.correlations.write().await.pop()
    }

    /// The correlation id that would be applied to the next event
    pub async fn current_correlation(&self) -> Option<String> {
        self.correlations.read().await.last().cloned()
    }

    async fn emit(
        &self,
        source: EventSource,
        category: EventCategory,
        event_type: &str,
        payload: EventPayload,
        description: String,
        options: RecordOptions,
    ) -> String {
        let ambient = self.ambient.read().await.clone();
        let correlation_id = match options.correlation_id {
            Some(explicit) => Some(explicit),
            None => self.correlations.read().await.last().cloned(),
        };

        let metadata = EventMetadata {
            replayable: options.replayable.unwrap_or(true),
            contains_pii: options.contains_pii.unwrap_or(false),
            ..Default::default()
        };

        let context = EventContext {
            sphere_id: options.sphere_id.or(ambient.sphere_id),
            meeting_id: options.meeting_id.or(ambient.meeting_id),
            depth: ambient.depth,
            view_mode: options.view_mode.or(ambient.view_mode),
            // Stamped by the store at append time
            session_id: String::new(),
            sequence: 0,
        };

        let id = generate_event_id();
        let event = Event {
            id: id.clone(),
            timestamp: Utc::now(),
            source: options.source.unwrap_or(source),
            category,
            event_type: event_type.to_string(),
            context,
            payload,
            description,
            caused_by: options.caused_by,
            correlation_id,
            metadata,
        };

        self.store.write().await.append(event);
        id
    }

    /// Record entry into a sphere
    pub async fn record_navigation_enter(
        &self,
        sphere_id: impl Into<String>,
        options: RecordOptions,
    ) -> String {
        let sphere_id = sphere_id.into();
        let from_sphere = self.ambient.read().await.sphere_id.clone();
        let description = format!("Entered sphere {sphere_id}");
        self.emit(
            EventSource::User,
            EventCategory::Navigation,
            "navigation.enter",
            EventPayload::Navigation(NavigationPayload {
                sphere_id,
                from_sphere,
                direction: NavigationDirection::Enter,
            }),
            description,
            options,
        )
        .await
    }

    /// Record exit from a sphere
    pub async fn record_navigation_exit(
        &self,
        sphere_id: impl Into<String>,
        options: RecordOptions,
    ) -> String {
        let sphere_id = sphere_id.into();
        let description = format!("Exited sphere {sphere_id}");
        self.emit(
            EventSource::User,
            EventCategory::Navigation,
            "navigation.exit",
            EventPayload::Navigation(NavigationPayload {
                sphere_id: sphere_id.clone(),
                from_sphere: Some(sphere_id),
                direction: NavigationDirection::Exit,
            }),
            description,
            options,
        )
        .await
    }

    /// Record a free-form user interaction
    pub async fn record_interaction(
        &self,
        name: impl Into<String>,
        data: Value,
        options: RecordOptions,
    ) -> String {
        let name = name.into();
        let description = format!("Interaction: {name}");
        self.emit(
            EventSource::User,
            EventCategory::Interaction,
            "interaction",
            EventPayload::Custom { name, data },
            description,
            options,
        )
        .await
    }

    /// Record creation of a decision
    pub async fn record_decision_created(
        &self,
        decision_id: impl Into<String>,
        title: impl Into<String>,
        options: RecordOptions,
    ) -> String {
        let decision_id = decision_id.into();
        let title = title.into();
        let description = format!("Decision {decision_id} created: {title}");
        self.emit(
            EventSource::User,
            EventCategory::Decision,
            "decision.created",
            EventPayload::Decision(DecisionPayload {
                decision_id,
                stage: DecisionStage::Created,
                title: Some(title),
                outcome: None,
            }),
            description,
            options,
        )
        .await
    }

    /// Record resolution of a decision
    pub async fn record_decision_resolved(
        &self,
        decision_id: impl Into<String>,
        outcome: impl Into<String>,
        options: RecordOptions,
    ) -> String {
        let decision_id = decision_id.into();
        let outcome = outcome.into();
        let description = format!("Decision {decision_id} resolved: {outcome}");
        self.emit(
            EventSource::User,
            EventCategory::Decision,
            "decision.resolved",
            EventPayload::Decision(DecisionPayload {
                decision_id,
                stage: DecisionStage::Resolved,
                title: None,
                outcome: Some(outcome),
            }),
            description,
            options,
        )
        .await
    }

    /// Record deferral of a decision
    pub async fn record_decision_deferred(
        &self,
        decision_id: impl Into<String>,
        reason: Option<String>,
        options: RecordOptions,
    ) -> String {
        let decision_id = decision_id.into();
        let description = format!("Decision {decision_id} deferred");
        self.emit(
            EventSource::User,
            EventCategory::Decision,
            "decision.deferred",
            EventPayload::Decision(DecisionPayload {
                decision_id,
                stage: DecisionStage::Deferred,
                title: None,
                outcome: reason,
            }),
            description,
            options,
        )
        .await
    }

    async fn emit_agent(
        &self,
        agent_id: String,
        action: AgentAction,
        event_type: &str,
        subject: Option<String>,
        detail: Value,
        description: String,
        options: RecordOptions,
    ) -> String {
        self.emit(
            EventSource::Agent,
            EventCategory::AgentActivity,
            event_type,
            EventPayload::Agent(AgentPayload {
                agent_id,
                action,
                subject,
                detail,
            }),
            description,
            options,
        )
        .await
    }

    /// Record activation of an agent
    pub async fn record_agent_activated(
        &self,
        agent_id: impl Into<String>,
        options: RecordOptions,
    ) -> String {
        let agent_id = agent_id.into();
        let description = format!("Agent {agent_id} activated");
        self.emit_agent(
            agent_id,
            AgentAction::Activated,
            "agent.activated",
            None,
            Value::Null,
            description,
            options,
        )
        .await
    }

    /// Record a signal raised by an agent
    pub async fn record_agent_signal(
        &self,
        agent_id: impl Into<String>,
        subject: impl Into<String>,
        detail: Value,
        options: RecordOptions,
    ) -> String {
        let agent_id = agent_id.into();
        let subject = subject.into();
        let description = format!("Agent {agent_id} signalled: {subject}");
        self.emit_agent(
            agent_id,
            AgentAction::Signal,
            "agent.signal",
            Some(subject),
            detail,
            description,
            options,
        )
        .await
    }

    /// Record a recommendation made by an agent
    pub async fn record_agent_recommendation(
        &self,
        agent_id: impl Into<String>,
        subject: impl Into<String>,
        detail: Value,
        options: RecordOptions,
    ) -> String {
        let agent_id = agent_id.into();
        let subject = subject.into();
        let description = format!("Agent {agent_id} recommended: {subject}");
        self.emit_agent(
            agent_id,
            AgentAction::Recommendation,
            "agent.recommendation",
            Some(subject),
            detail,
            description,
            options,
        )
        .await
    }

    /// Record acceptance of an agent proposal
    pub async fn record_proposal_accepted(
        &self,
        agent_id: impl Into<String>,
        proposal: impl Into<String>,
        options: RecordOptions,
    ) -> String {
        let agent_id = agent_id.into();
        let proposal = proposal.into();
        let description = format!("Proposal {proposal} from agent {agent_id} accepted");
        self.emit_agent(
            agent_id,
            AgentAction::ProposalAccepted,
            "agent.proposal_accepted",
            Some(proposal),
            Value::Null,
            description,
            options,
        )
        .await
    }

    /// Record rejection of an agent proposal
    pub async fn record_proposal_rejected(
        &self,
        agent_id: impl Into<String>,
        proposal: impl Into<String>,
        options: RecordOptions,
    ) -> String {
        let agent_id = agent_id.into();
        let proposal = proposal.into();
        let description = format!("Proposal {proposal} from agent {agent_id} rejected");
        self.emit_agent(
            agent_id,
            AgentAction::ProposalRejected,
            "agent.proposal_rejected",
            Some(proposal),
            Value::Null,
            description,
            options,
        )
        .await
    }

    /// Record a before/after state change
    pub async fn record_state_change(
        &self,
        entity: impl Into<String>,
        field: Option<String>,
        before: Value,
        after: Value,
        options: RecordOptions,
    ) -> String {
        let entity = entity.into();
        let description = match &field {
            Some(field) => format!("State change on {entity}.{field}"),
            None => format!("State change on {entity}"),
        };
        self.emit(
            EventSource::System,
            EventCategory::StateChange,
            "state.change",
            EventPayload::StateChange(StateChangePayload {
                entity,
                field,
                before,
                after,
            }),
            description,
            options,
        )
        .await
    }

    /// Record an error
    pub async fn record_error(
        &self,
        message: impl Into<String>,
        code: Option<String>,
        recoverable: bool,
        options: RecordOptions,
    ) -> String {
        let message = message.into();
        let description = format!("Error: {message}");
        self.emit(
            EventSource::System,
            EventCategory::Error,
            "error",
            EventPayload::Error(ErrorPayload {
                code,
                message,
                recoverable,
            }),
            description,
            options,
        )
        .await
    }

    /// Record a milestone
    pub async fn record_milestone(
        &self,
        name: impl Into<String>,
        detail: Value,
        options: RecordOptions,
    ) -> String {
        let name = name.into();
        let description = format!("Milestone: {name}");
        self.emit(
            EventSource::System,
            EventCategory::Milestone,
            "milestone",
            EventPayload::Milestone(MilestonePayload { name, detail }),
            description,
            options,
        )
        .await
    }

    /// Record the start of the recording session
    pub async fn record_session_start(&self) -> String {
        let session_id = self.store.read().await.session_id().to_string();
        tracing::info!(session_id = %session_id, "Recording session started");
        let description = format!("Session {session_id} started");
        self.emit(
            EventSource::System,
            EventCategory::Milestone,
            "session.start",
            EventPayload::Session(SessionPayload {
                session_id,
                phase: SessionPhase::Start,
            }),
            description,
            RecordOptions::default(),
        )
        .await
    }

    /// Record the end of the recording session
    pub async fn record_session_end(&self) -> String {
        let session_id = self.store.read().await.session_id().to_string();
        tracing::info!(session_id = %session_id, "Recording session ended");
        let description = format!("Session {session_id} ended");
        self.emit(
            EventSource::System,
            EventCategory::Milestone,
            "session.end",
            EventPayload::Session(SessionPayload {
                session_id,
                phase: SessionPhase::End,
            }),
            description,
            RecordOptions::default(),
        )
        .await
    }

    /// Record a self-referential snapshot of the store's current contents
    pub async fn record_snapshot(&self, options: RecordOptions) -> String {
        let snapshot = self.store.read().await.snapshot();
        let description = format!(
            "Snapshot: {} events in session {}",
            snapshot.total_events, snapshot.session_id
        );
        self.emit(
            EventSource::System,
            EventCategory::Audit,
            "audit.snapshot",
            EventPayload::Snapshot(snapshot),
            description,
            options,
        )
        .await
    }
}
