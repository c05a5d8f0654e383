//! Adaptive endpoint health & selection scheduler.
//!
//! A [`Scheduler`] runs at most one round at a time. Each round probes the
//! pool through a [`ProbeRunner`], drops candidates that fail repeatedly,
//! decides whether the pool needs fresh candidates from the
//! [`CandidateSource`], and publishes the chosen endpoint through an
//! [`EndpointActivator`]. The pool itself is owned by a [`PoolActor`].

pub mod actor;
pub mod clock;
pub mod metrics;
pub mod runner;
pub mod state;
pub mod status;
pub mod traits;
pub mod types;

pub use actor::{PoolActor, PoolCommand, PoolHandle, ResultSink};
pub use clock::TriggerCadence;
pub use metrics::SchedulerMetrics;
pub use runner::Scheduler;
pub use state::{RoundState, RunningGuard};
pub use status::{Notice, NoticeLevel, StatusBoard};
pub use traits::{CandidateSource, EndpointActivator, ProbeRunner, SchedulerError};
pub use types::{
    format_hms, PassReport, RoundOutcome, RoundReport, SchedulerConfig, SchedulerStatus,
    TriggerOutcome, TriggerSource,
};
