use async_trait::async_trait;
use autoproxy_core::{Candidate, CoreError, ProbeKind};

use super::actor::ResultSink;

/// Error type for scheduler rounds and their collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Probe runner error: {0}")]
    Probe(String),
    #[error("Candidate source error: {0}")]
    Source(String),
    #[error("Activation failed: {0}")]
    Activation(String),
    #[error("Pool actor is no longer running")]
    PoolClosed,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Measures candidates and streams results back through a [`ResultSink`].
///
/// `start` should return once the pass is under way; results keep arriving
/// asynchronously until the pass finishes or `stop` is called.
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    async fn start(
        &self,
        kind: ProbeKind,
        targets: Vec<Candidate>,
        sink: ResultSink,
    ) -> Result<(), SchedulerError>;

    /// Best-effort cancellation of the current pass.
    async fn stop(&self);
}

/// Supplies the full candidate list from subscriptions or other upstreams.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;

    async fn refresh_all(&self) -> Result<Vec<Candidate>, SchedulerError>;
}

/// Applies a newly selected active candidate to the outside world.
#[async_trait]
pub trait EndpointActivator: Send + Sync {
    async fn activate(&self, candidate: &Candidate) -> Result<(), SchedulerError>;
}
