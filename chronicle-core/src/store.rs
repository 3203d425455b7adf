//! Append-only event store
//!
//! [`EventStore`] is the single source of truth for one recording session's
//! ordered event log. Events are immutable once appended; append order
//! defines the total order within a session. The store assigns each event
//! its session id and a strictly increasing sequence number, notifies
//! registered subscribers, and supports filtered querying, causal-chain
//! traversal, snapshotting, and lossless serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{BufRead, BufReader, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ChronicleError, Result};
use crate::event::{Event, EventCategory, EventSource, EVENT_SCHEMA_VERSION};

/// Shared handle to an event store.
///
/// The store itself is a plain synchronous structure; concurrent hosts share
/// it behind a single reader-writer lock, which serializes the one mutable
/// path (append plus sequence assignment).
pub type SharedEventStore = Arc<RwLock<EventStore>>;

/// Token returned by [`EventStore::subscribe`], used to unsubscribe
pub type SubscriberId = Uuid;

type Subscriber = Box<dyn Fn(&Event) + Send + Sync>;

/// Filter for [`EventStore::query`]
///
/// All criteria are optional and combine conjunctively.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Inclusive lower timestamp bound
    pub from: Option<DateTime<Utc>>,

    /// Inclusive upper timestamp bound
    pub to: Option<DateTime<Utc>>,

    /// Category allow-list
    pub categories: Option<Vec<EventCategory>>,

    /// Source allow-list
    pub sources: Option<Vec<EventSource>>,

    /// Match events whose context carries this sphere
    pub sphere_id: Option<String>,

    /// Match events whose context carries this meeting
    pub meeting_id: Option<String>,

    /// Match events tagged with this correlation id
    pub correlation_id: Option<String>,

    /// Only events whose metadata allows replay
    pub replayable_only: bool,

    /// Number of matching events to skip
    pub offset: usize,

    /// Hard cap on result count
    pub limit: Option<usize>,
}

impl EventFilter {
    /// Restrict to the given categories
    pub fn with_categories(mut self, categories: Vec<EventCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    /// Restrict to the given sources
    pub fn with_sources(mut self, sources: Vec<EventSource>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Restrict to the given time range
    pub fn with_time_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Restrict to events in the given sphere
    pub fn with_sphere(mut self, sphere_id: impl Into<String>) -> Self {
        self.sphere_id = Some(sphere_id.into());
        self
    }

    /// Cap the result count
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &Event) -> bool {
        if let Some(from) = self.from {
            if event.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.timestamp > to {
                return false;
            }
        }
        if let Some(ref categories) = self.categories {
            if !categories.contains(&event.category) {
                return false;
            }
        }
        if let Some(ref sources) = self.sources {
            if !sources.contains(&event.source) {
                return false;
            }
        }
        if let Some(ref sphere) = self.sphere_id {
            if event.context.sphere_id.as_deref() != Some(sphere.as_str()) {
                return false;
            }
        }
        if let Some(ref meeting) = self.meeting_id {
            if event.context.meeting_id.as_deref() != Some(meeting.as_str()) {
                return false;
            }
        }
        if let Some(ref correlation) = self.correlation_id {
            if event.correlation_id.as_deref() != Some(correlation.as_str()) {
                return false;
            }
        }
        if self.replayable_only && !event.metadata.replayable {
            return false;
        }
        true
    }
}

/// Compact structural summary of a store's current contents
///
/// Suitable for embedding into a self-referential `audit.snapshot` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Session the snapshot describes
    pub session_id: String,

    /// Total events at snapshot time
    pub total_events: usize,

    /// Timestamp of the first event
    pub first_timestamp: Option<DateTime<Utc>>,

    /// Timestamp of the last event
    pub last_timestamp: Option<DateTime<Utc>>,

    /// Event counts keyed by category
    pub events_by_category: BTreeMap<String, usize>,
}

/// Options for [`EventStore::export_with`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Include events flagged as containing PII
    pub include_pii: bool,
}

/// Self-describing serialized form of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedSession {
    /// Schema version of the contained events
    pub schema_version: u32,

    /// Session identifier
    pub session_id: String,

    /// When the export was produced
    pub exported_at: DateTime<Utc>,

    /// The full ordered event log
    pub events: Vec<Event>,
}

/// Append-only, in-memory ordered log of immutable events for one session
pub struct EventStore {
    session_id: String,
    events: Vec<Event>,
    index: HashMap<String, usize>,
    next_sequence: u64,
    subscribers: Vec<(SubscriberId, Subscriber)>,
}

impl EventStore {
    /// Create a store for the given session
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            events: Vec::new(),
            index: HashMap::new(),
            next_sequence: 1,
            subscribers: Vec::new(),
        }
    }

    /// Create a store with a generated session id
    pub fn with_generated_session() -> Self {
        Self::new(format!("session-{}", Uuid::new_v4().simple()))
    }

    /// Wrap the store in a shared handle
    pub fn into_shared(self) -> SharedEventStore {
        Arc::new(RwLock::new(self))
    }

    /// The session this store records
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Number of events in the log
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append an event to the tail of the log.
    ///
    /// The store stamps the event with the session id and the next sequence
    /// number; the caller's values for those fields are ignored. Returns
    /// `true` if the event was accepted, `false` if an event with the same
    /// id is already present (the log is unchanged). Duplicate rejection is
    /// the only rejection; everything else is accepted, with degraded
    /// conditions logged.
    pub fn append(&mut self, mut event: Event) -> bool {
        if self.index.contains_key(&event.id) {
            tracing::debug!(event_id = %event.id, "Duplicate event id, append ignored");
            return false;
        }

        if !event.payload_matches_category() {
            tracing::warn!(
                event_id = %event.id,
                category = event.category.as_str(),
                "Payload shape does not match declared category"
            );
        }

        if let Some(ref parent) = event.caused_by {
            if !self.index.contains_key(parent) {
                tracing::warn!(
                    event_id = %event.id,
                    parent_id = %parent,
                    "Causal parent not present in store, chain will be broken"
                );
            }
        }

        event.context.session_id = self.session_id.clone();
        event.context.sequence = self.next_sequence;
        self.next_sequence += 1;

        self.index.insert(event.id.clone(), self.events.len());
        self.events.push(event);

        // Safe to index: just pushed
        let appended = &self.events[self.events.len() - 1];
        self.notify(appended);
        true
    }

    /// Register a subscriber invoked synchronously on every accepted append.
    ///
    /// Subscribers receive a shared reference and cannot mutate the log. A
    /// panicking subscriber is isolated: the panic is caught, logged, and
    /// remaining subscribers still run.
    pub fn subscribe(&mut self, handler: impl Fn(&Event) + Send + Sync + 'static) -> SubscriberId {
        let id = Uuid::new_v4();
        self.subscribers.push((id, Box::new(handler)));
        id
    }

    /// Remove a subscriber. Returns `false` if the token is unknown.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    fn notify(&self, event: &Event) {
        for (id, handler) in &self.subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)));
            if outcome.is_err() {
                tracing::warn!(
                    subscriber_id = %id,
                    event_id = %event.id,
                    "Subscriber panicked during notification, continuing"
                );
            }
        }
    }

    /// Look up an event by id
    pub fn get(&self, id: &str) -> Option<&Event> {
        self.index.get(id).map(|&pos| &self.events[pos])
    }

    /// The full ordered log as a defensive copy
    pub fn all_events(&self) -> Vec<Event> {
        self.events.clone()
    }

    /// Query the log with the given filter.
    ///
    /// Returns a new ordered array in append order, never a live view.
    pub fn query(&self, filter: &EventFilter) -> Vec<Event> {
        let matched = self.events.iter().filter(|e| filter.matches(e));
        let offset = matched.skip(filter.offset);
        match filter.limit {
            Some(limit) => offset.take(limit).cloned().collect(),
            None => offset.cloned().collect(),
        }
    }

    /// Walk `caused_by` links backward from the given event to the root.
    ///
    /// Returns the chain oldest-first, ending at an event with no parent or
    /// with a parent absent from the store. A visited set guards against
    /// cycles, so traversal always terminates.
    pub fn causality_chain(&self, event_id: &str) -> Vec<Event> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.get(event_id);

        while let Some(event) = current {
            if !visited.insert(event.id.clone()) {
                tracing::warn!(event_id = %event.id, "Causality cycle detected, stopping traversal");
                break;
            }
            chain.push(event.clone());
            current = event.caused_by.as_deref().and_then(|parent| self.get(parent));
        }

        chain.reverse();
        chain
    }

    /// All events sharing the given correlation id, in append order
    pub fn events_for_correlation(&self, correlation_id: &str) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.correlation_id.as_deref() == Some(correlation_id))
            .cloned()
            .collect()
    }

    /// Produce a compact structural summary of the current log
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut events_by_category = BTreeMap::new();
        for event in &self.events {
            *events_by_category
                .entry(event.category.as_str().to_string())
                .or_insert(0) += 1;
        }

        StoreSnapshot {
            session_id: self.session_id.clone(),
            total_events: self.events.len(),
            first_timestamp: self.events.first().map(|e| e.timestamp),
            last_timestamp: self.events.last().map(|e| e.timestamp),
            events_by_category,
        }
    }

    /// Serialize the entire log plus session id to a JSON document
    pub fn export(&self) -> Result<String> {
        self.export_with(&ExportOptions { include_pii: true })
    }

    /// Serialize the log, honoring the PII export policy.
    ///
    /// With `include_pii: false`, events flagged `contains_pii` are dropped
    /// from the document.
    pub fn export_with(&self, options: &ExportOptions) -> Result<String> {
        let events = if options.include_pii {
            self.events.clone()
        } else {
            self.events
                .iter()
                .filter(|e| !e.metadata.contains_pii)
                .cloned()
                .collect()
        };

        let document = ExportedSession {
            schema_version: EVENT_SCHEMA_VERSION,
            session_id: self.session_id.clone(),
            exported_at: Utc::now(),
            events,
        };

        Ok(serde_json::to_string(&document)?)
    }

    /// Reconstruct a store from a document produced by [`export`].
    ///
    /// The result has the same length, session id, and event contents (in
    /// the same order) as the exported store.
    ///
    /// [`export`]: EventStore::export
    pub fn import(serialized: &str) -> Result<Self> {
        let document: ExportedSession = serde_json::from_str(serialized)
            .map_err(|e| ChronicleError::Import(format!("Malformed session document: {e}")))?;

        if document.schema_version > EVENT_SCHEMA_VERSION {
            return Err(ChronicleError::Import(format!(
                "Unsupported schema version {}",
                document.schema_version
            )));
        }

        Ok(Self::from_parts(document.session_id, document.events))
    }

    fn from_parts(session_id: String, events: Vec<Event>) -> Self {
        let index = events
            .iter()
            .enumerate()
            .map(|(pos, e)| (e.id.clone(), pos))
            .collect();
        let next_sequence = events
            .iter()
            .map(|e| e.context.sequence)
            .max()
            .map(|max| max + 1)
            .unwrap_or(1);

        Self {
            session_id,
            events,
            index,
            next_sequence,
            subscribers: Vec::new(),
        }
    }

    /// Save the log to a JSON-lines file: a header line followed by one
    /// event per line.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);

        let header = serde_json::json!({
            "type": "header",
            "schema_version": EVENT_SCHEMA_VERSION,
            "session_id": self.session_id,
            "exported_at": Utc::now(),
        });
        writeln!(writer, "{}", serde_json::to_string(&header)?)?;

        for event in &self.events {
            writeln!(writer, "{}", serde_json::to_string(event)?)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load a log from a JSON-lines file written by [`save`].
    ///
    /// [`save`]: EventStore::save
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| ChronicleError::Import("Empty session file".to_string()))??;
        let header: serde_json::Value = serde_json::from_str(&header_line)
            .map_err(|e| ChronicleError::Import(format!("Malformed header line: {e}")))?;

        let session_id = header["session_id"]
            .as_str()
            .ok_or_else(|| ChronicleError::Import("Header missing session_id".to_string()))?
            .to_string();

        let mut events = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .map_err(|e| ChronicleError::Import(format!("Malformed event line: {e}")))?;
            events.push(event);
        }

        Ok(Self::from_parts(session_id, events))
    }

    /// Discard all events and restart sequence numbering.
    ///
    /// Intended for export-then-reset flows; subscribers stay registered.
    pub fn reset(&mut self) {
        self.events.clear();
        self.index.clear();
        self.next_sequence = 1;
        tracing::info!(session_id = %self.session_id, "Event store reset");
    }
}
