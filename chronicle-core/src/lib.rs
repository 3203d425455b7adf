//! # Chronicle - Timeline Recording, Replay, and Audit
//!
//! Chronicle captures everything that happens in a governance session as an
//! append-only log of immutable events, and answers three questions about
//! it:
//! - **What happened?** Filtered queries, causal-chain traversal, and
//!   lossless session export/import ([`store::EventStore`])
//! - **What did it look like?** Deterministic, speed-controlled playback of
//!   a recorded sequence ([`replay::ReplayEngine`])
//! - **What does it mean?** Summary reports, per-agent performance, and
//!   heuristic pattern/anomaly detection ([`audit::AuditEngine`])
//!
//! Events enter through one write path, the [`recorder::Recorder`], which
//! stamps identity, ambient context, and causal/correlation linkage before
//! appending. Replay and audit are strictly read-only over the store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chronicle_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = TimelineContext::new(ChronicleConfig::default());
//!
//!     // Record what happens
//!     ctx.recorder()
//!         .record_decision_created("dec_1", "Adopt charter", RecordOptions::default())
//!         .await;
//!
//!     // Analyze it
//!     let report = ctx.audit().generate_report(&EventFilter::default()).await;
//!     println!("{}", ReportExporter::to_markdown(&report));
//!
//!     // Play it back
//!     let replay = ctx.new_replay();
//!     replay.load_from_store(ctx.store(), ReplayOptions::default()).await;
//!     while replay.step().is_some() {}
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod recorder;
pub mod replay;
pub mod store;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::audit::{
        AuditEngine, AuditReport, Insight, InsightKind, ReportExporter, ReportFormat, Severity,
    };
    pub use crate::config::ChronicleConfig;
    pub use crate::context::TimelineContext;
    pub use crate::error::{ChronicleError, Result};
    pub use crate::event::{Event, EventCategory, EventPayload, EventSource};
    pub use crate::recorder::{AmbientContext, RecordOptions, Recorder};
    pub use crate::replay::{ReplayEngine, ReplayOptions, ReplayProgress, ReplayStatus};
    pub use crate::store::{
        EventFilter, EventStore, ExportOptions, SharedEventStore, StoreSnapshot, SubscriberId,
    };
}
