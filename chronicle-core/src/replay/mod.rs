//! Deterministic replay of recorded event sequences
//!
//! [`ReplayEngine`] plays a previously recorded (or externally supplied)
//! event sequence back one event at a time, either stepped manually or
//! scheduled automatically at a configurable speed multiplier derived from
//! the original inter-event timing. The engine operates on a private,
//! possibly filtered copy of the source sequence and never mutates the
//! source store.
//!
//! Auto-play requires a Tokio runtime: scheduling runs on a spawned task
//! holding a cancellation token (the single pending-timer handle), so
//! `pause()`/`stop()` can cancel a pending emission at any time and tests
//! can drive playback under Tokio's paused clock.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::ReplayTimingConfig;
use crate::event::{Event, EventCategory};
use crate::store::SharedEventStore;


type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;
type SessionCallback = Arc<dyn Fn() + Send + Sync>;

/// Playback state of a replay session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    /// No session loaded
    Idle,
    /// Session loaded, playback suspended
    Paused,
    /// Auto-play in progress
    Playing,
    /// Cursor reached the end of the session
    Completed,
}

/// Cursor position within a replay session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayProgress {
    /// Events emitted so far
    pub current: usize,
    /// Total events in the session
    pub total: usize,
    /// Whole-percent completion
    pub percentage: f64,
}

/// Options for building a replay session
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Speed multiplier; defaults to the engine's configured default
    pub speed: Option<f64>,

    /// Start playback at this event id (inclusive)
    pub start_event_id: Option<String>,

    /// End playback after this event id (inclusive)
    pub end_event_id: Option<String>,

    /// Category allow-list
    pub categories: Option<Vec<EventCategory>>,

    /// Drop error-category events from the session
    pub skip_errors: bool,

    /// Include events recorded as non-replayable (excluded by default)
    pub include_non_replayable: bool,
}

impl ReplayOptions {
    /// Set the speed multiplier
    pub fn at_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Restrict to the given categories
    pub fn with_categories(mut self, categories: Vec<EventCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    /// Drop error-category events
    pub fn skipping_errors(mut self) -> Self {
        self.skip_errors = true;
        self
    }
}

/// An ephemeral playback session: a private ordered copy of events plus a
/// cursor, speed, and status. Never affects the source log.
struct ReplaySession {
    session_id: String,
    events: Vec<Event>,
    cursor: usize,
    speed: f64,
    status: ReplayStatus,
    completed_fired: bool,
}

impl ReplaySession {
    /// Transition to `Completed`; returns whether the completion callback
    /// should fire (it fires exactly once per session).
    fn mark_completed(&mut self) -> bool {
        self.status = ReplayStatus::Completed;
        if self.completed_fired {
            false
        } else {
            self.completed_fired = true;
            true
        }
    }
}

#[derive(Default)]
struct ReplayCallbacks {
    on_event: Mutex<Option<EventCallback>>,
    on_complete: Mutex<Option<SessionCallback>>,
    on_pause: Mutex<Option<SessionCallback>>,
}

impl ReplayCallbacks {
    fn fire_event(&self, event: &Event) {
        let callback = lock(&self.on_event).clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn fire_complete(&self) {
        let callback = lock(&self.on_complete).clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn fire_pause(&self) {
        let callback = lock(&self.on_pause).clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Compute the scheduling delay between two adjacent events.
///
/// The original inter-event gap is divided by the speed multiplier and
/// clamped so that sessions with very dense or very sparse original timing
/// remain watchable.
pub(crate) fn scaled_delay(
    current: &Event,
    next: &Event,
    speed: f64,
    timing: &ReplayTimingConfig,
) -> Duration {
    let gap = (next.timestamp - current.timestamp)
        .to_std()
        .unwrap_or(Duration::ZERO);
    let speed = if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    };
    gap.div_f64(speed)
        .clamp(timing.min_step_delay, timing.max_step_delay)
}

/// Deterministic, controllable playback engine
pub struct ReplayEngine {
    session: Arc<Mutex<Option<ReplaySession>>>,
    pending: Mutex<Option<CancellationToken>>,
    callbacks: Arc<ReplayCallbacks>,
    timing: ReplayTimingConfig,
}

impl ReplayEngine {
    /// Create an engine with default timing
    pub fn new() -> Self {
        Self::with_timing(ReplayTimingConfig::default())
    }

    /// Create an engine with the given timing configuration
    pub fn with_timing(timing: ReplayTimingConfig) -> Self {
        Self {
            session: Arc::new(Mutex::new(None)),
            pending: Mutex::new(None),
            callbacks: Arc::new(ReplayCallbacks::default()),
            timing,
        }
    }

    /// Set the per-event callback
    pub fn on_event(&self, callback: impl Fn(&Event) + Send + Sync + 'static) {
        *lock(&self.callbacks.on_event) = Some(Arc::new(callback));
    }

    /// Set the completion callback (fires exactly once per session)
    pub fn on_complete(&self, callback: impl Fn() + Send + Sync + 'static) {
        *lock(&self.callbacks.on_complete) = Some(Arc::new(callback));
    }

    /// Set the pause callback
    pub fn on_pause(&self, callback: impl Fn() + Send + Sync + 'static) {
        *lock(&self.callbacks.on_pause) = Some(Arc::new(callback));
    }

    /// Build a paused session from the full contents of a store.
    ///
    /// The engine takes a defensive copy; the source store is never touched
    /// again. Returns the number of events loaded after filtering.
    pub async fn load_from_store(
        &self,
        store: &SharedEventStore,
        options: ReplayOptions,
    ) -> usize {
        let (events, session_id) = {
            let guard = store.read().await;
            (guard.all_events(), guard.session_id().to_string())
        };
        self.load_from_events(events, session_id, options)
    }

    /// Build a paused session from a raw event sequence.
    ///
    /// Filtering removes events but never reorders the remainder. Returns
    /// the number of events loaded.
    pub fn load_from_events(
        &self,
        events: Vec<Event>,
        session_id: impl Into<String>,
        options: ReplayOptions,
    ) -> usize {
        self.cancel_pending();

        let mut events = events;

        if let Some(ref start_id) = options.start_event_id {
            match events.iter().position(|e| &e.id == start_id) {
                Some(pos) => {
                    events.drain(..pos);
                }
                None => {
                    tracing::warn!(event_id = %start_id, "Start event not found, replaying from the beginning");
                }
            }
        }
        if let Some(ref end_id) = options.end_event_id {
            if let Some(pos) = events.iter().position(|e| &e.id == end_id) {
                events.truncate(pos + 1);
            }
        }

        events.retain(|e| {
            if let Some(ref categories) = options.categories {
                if !categories.contains(&e.category) {
                    return false;
                }
            }
            if options.skip_errors && e.category == EventCategory::Error {
                return false;
            }
            if !options.include_non_replayable && !e.metadata.replayable {
                return false;
            }
            true
        });

        let speed = match options.speed {
            Some(speed) if speed.is_finite() && speed > 0.0 => speed,
            Some(invalid) => {
                tracing::warn!(speed = invalid, "Invalid speed multiplier, using default");
                self.timing.default_speed
            }
            None => self.timing.default_speed,
        };

        let count = events.len();
        let session_id = session_id.into();
        tracing::debug!(session_id = %session_id, events = count, "Replay session loaded");

        *lock(&self.session) = Some(ReplaySession {
            session_id,
            events,
            cursor: 0,
            speed,
            status: ReplayStatus::Paused,
            completed_fired: false,
        });

        count
    }

    /// Session id of the loaded session, if any
    pub fn session_id(&self) -> Option<String> {
        lock(&self.session).as_ref().map(|s| s.session_id.clone())
    }

    /// Current playback status ([`ReplayStatus::Idle`] when nothing is
    /// loaded)
    pub fn status(&self) -> ReplayStatus {
        lock(&self.session)
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(ReplayStatus::Idle)
    }

    /// Cursor position within the loaded session.
    ///
    /// With no session loaded the percentage is zero; a loaded-but-empty
    /// session reads as fully complete, since it completes immediately.
    pub fn progress(&self) -> ReplayProgress {
        let guard = lock(&self.session);
        let Some(s) = guard.as_ref() else {
            return ReplayProgress {
                current: 0,
                total: 0,
                percentage: 0.0,
            };
        };

        let (current, total) = (s.cursor, s.events.len());
        let percentage = if total == 0 {
            100.0
        } else {
            ((current * 100) / total) as f64
        };
        ReplayProgress {
            current,
            total,
            percentage,
        }
    }

    /// The next event the session would emit, if any
    pub fn current_event(&self) -> Option<Event> {
        let guard = lock(&self.session);
        guard.as_ref().and_then(|s| s.events.get(s.cursor).cloned())
    }

    /// Begin or resume scheduled auto-play.
    ///
    /// No-op while already playing, after completion, or with no session
    /// loaded. Must be called within a Tokio runtime.
    pub fn play(&self) {
        let started = {
            let mut guard = lock(&self.session);
            match guard.as_mut() {
                None => return,
                Some(s) => match s.status {
                    ReplayStatus::Playing | ReplayStatus::Completed => return,
                    _ => {
                        if s.cursor >= s.events.len() {
                            if s.mark_completed() {
                                drop(guard);
                                self.callbacks.fire_complete();
                            }
                            return;
                        }
                        s.status = ReplayStatus::Playing;
                        true
                    }
                },
            }
        };

        if started {
            let cancel = CancellationToken::new();
            *lock(&self.pending) = Some(cancel.clone());

            let session = self.session.clone();
            let callbacks = self.callbacks.clone();
            let timing = self.timing.clone();
            tokio::spawn(async move {
                run_playback(session, callbacks, timing, cancel).await;
            });
        }
    }

    /// Suspend auto-play and cancel the pending emission.
    ///
    /// No-op unless playing.
    pub fn pause(&self) {
        let was_playing = {
            let mut guard = lock(&self.session);
            match guard.as_mut() {
                Some(s) if s.status == ReplayStatus::Playing => {
                    s.status = ReplayStatus::Paused;
                    true
                }
                _ => false,
            }
        };

        if was_playing {
            self.cancel_pending();
            self.callbacks.fire_pause();
        }
    }

    /// Pause and rewind the cursor to the beginning
    pub fn stop(&self) {
        let was_playing = {
            let mut guard = lock(&self.session);
            match guard.as_mut() {
                None => return,
                Some(s) => {
                    let was_playing = s.status == ReplayStatus::Playing;
                    s.status = ReplayStatus::Paused;
                    s.cursor = 0;
                    was_playing
                }
            }
        };

        self.cancel_pending();
        if was_playing {
            self.callbacks.fire_pause();
        }
    }

    /// Manually emit the next event and advance the cursor.
    ///
    /// Stepping past the last event completes the session (the completion
    /// callback fires exactly once). Returns the emitted event, or `None`
    /// at the end of the session.
    pub fn step(&self) -> Option<Event> {
        let (event, complete) = {
            let mut guard = lock(&self.session);
            let s = guard.as_mut()?;
            if s.cursor >= s.events.len() {
                (None, s.mark_completed())
            } else {
                let event = s.events[s.cursor].clone();
                s.cursor += 1;
                let complete = if s.cursor == s.events.len() {
                    s.mark_completed()
                } else {
                    false
                };
                (Some(event), complete)
            }
        };

        if let Some(ref event) = event {
            self.callbacks.fire_event(event);
        }
        if complete {
            self.callbacks.fire_complete();
        }
        event
    }

    /// Move the cursor back one event and return the event now at the
    /// cursor. Retreating from a completed session re-opens it as paused.
    pub fn step_back(&self) -> Option<Event> {
        let mut guard = lock(&self.session);
        let s = guard.as_mut()?;
        if s.cursor == 0 {
            return None;
        }
        s.cursor -= 1;
        if s.status == ReplayStatus::Completed {
            s.status = ReplayStatus::Paused;
        }
        Some(s.events[s.cursor].clone())
    }

    /// Jump the cursor to the given index; out-of-range indices are
    /// clamped, not rejected.
    pub fn seek_to(&self, index: usize) {
        let mut guard = lock(&self.session);
        if let Some(s) = guard.as_mut() {
            s.cursor = index.min(s.events.len());
            if s.cursor < s.events.len() && s.status == ReplayStatus::Completed {
                s.status = ReplayStatus::Paused;
            }
        }
    }

    /// Jump the cursor to the event with the given id.
    ///
    /// Returns `false` if the id is not in the session.
    pub fn seek_to_event(&self, event_id: &str) -> bool {
        let mut guard = lock(&self.session);
        let Some(s) = guard.as_mut() else {
            return false;
        };
        match s.events.iter().position(|e| e.id == event_id) {
            Some(pos) => {
                s.cursor = pos;
                if s.status == ReplayStatus::Completed {
                    s.status = ReplayStatus::Paused;
                }
                true
            }
            None => false,
        }
    }

    /// Adjust the speed multiplier, live. Affects only future scheduling
    /// decisions; non-positive or non-finite multipliers are ignored.
    pub fn set_speed(&self, multiplier: f64) {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            tracing::warn!(speed = multiplier, "Ignoring invalid speed multiplier");
            return;
        }
        if let Some(s) = lock(&self.session).as_mut() {
            s.speed = multiplier;
        }
    }

    fn cancel_pending(&self) {
        if let Some(token) = lock(&self.pending).take() {
            token.cancel();
        }
    }
}

impl Default for ReplayEngine {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_playback(
    session: Arc<Mutex<Option<ReplaySession>>>,
    callbacks: Arc<ReplayCallbacks>,
    timing: ReplayTimingConfig,
    cancel: CancellationToken,
) {
    loop {
        // Re-check status under the lock before every emission so a
        // pause that raced the timer drops the scheduled event.
        let (event, delay) = {
            let mut guard = lock(&session);
            let Some(s) = guard.as_mut() else { return };
            if s.status != ReplayStatus::Playing {
                return;
            }
            if s.cursor >= s.events.len() {
                let fire = s.mark_completed();
                drop(guard);
                if fire {
                    callbacks.fire_complete();
                }
                return;
            }

            let event = s.events[s.cursor].clone();
            let delay = s
                .events
                .get(s.cursor + 1)
                .map(|next| scaled_delay(&event, next, s.speed, &timing));
            s.cursor += 1;
            (event, delay)
        };

        callbacks.fire_event(&event);

        match delay {
            None => {
                let fire = {
                    let mut guard = lock(&session);
                    match guard.as_mut() {
                        Some(s) => s.mark_completed(),
                        None => false,
                    }
                };
                if fire {
                    callbacks.fire_complete();
                }
                return;
            }
            Some(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
