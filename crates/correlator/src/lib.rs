//! Klaatu Experiment-Event Correlator
//!
//! Answers "has this experiment event shown up in the collected telemetry
//! yet?" for test drivers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  fetch_pings  ┌─────────────┐  normalize  ┌──────────────┐
//! │ PingSource   │ ────────────▶ │ Correlator  │ ──────────▶ │ EventRecord  │
//! │ (PingClient) │               │ poll loop   │             │ per shape    │
//! └──────────────┘               └─────┬───────┘             └──────┬───────┘
//!                                      │ miss                       │
//!                                      ▼                            ▼
//!                                MissHandler                 EventPredicate
//!                          (re-evaluate recipes)            (EventMatcher, Fn)
//! ```

pub mod client;
pub mod correlator;
pub mod error;
pub mod normalize;
pub mod predicate;

pub use client::{PingClient, PingSource};
pub use correlator::{find_match, Correlation, Correlator, MatchedEvent, MissHandler, NoReevaluate};
pub use error::{CorrelationError, CorrelationResult};
pub use normalize::{detect_shapes, normalize, EventRecord, PingShape};
pub use predicate::{EventKind, EventMatcher, EventPredicate, ValueMatch};
