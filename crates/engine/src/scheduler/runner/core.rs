use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::scheduler::actor::PoolHandle;
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::state::RoundState;
use crate::scheduler::status::{Notice, NoticeLevel, StatusBoard};
use crate::scheduler::traits::{CandidateSource, EndpointActivator, ProbeRunner};
use crate::scheduler::types::{SchedulerConfig, SchedulerStatus};

/// The round scheduler. Decides when to probe, what to drop, when to
/// refresh from the source and which candidate is active.
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    pub(super) pool: PoolHandle,
    pub(super) runner: Arc<dyn ProbeRunner>,
    pub(super) source: Arc<dyn CandidateSource>,
    pub(super) activator: Arc<dyn EndpointActivator>,
    /// Enabled/running flags, failure windows and loop count.
    pub(super) state: Arc<RoundState>,
    pub(super) status: StatusBoard,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    /// Shutdown signal.
    pub(super) shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        pool: PoolHandle,
        runner: Arc<dyn ProbeRunner>,
        source: Arc<dyn CandidateSource>,
        activator: Arc<dyn EndpointActivator>,
    ) -> Self {
        let state = Arc::new(RoundState::new(config.start_enabled, config.failure_windows));
        let status = StatusBoard::new(config.start_enabled);
        info!(
            "Scheduler created (runner: {}, source: {}, enabled: {})",
            runner.name(),
            source.name(),
            config.start_enabled
        );
        Self {
            config,
            pool,
            runner,
            source,
            activator,
            state,
            status,
            metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    pub fn round_state(&self) -> Arc<RoundState> {
        Arc::clone(&self.state)
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Operator toggle. Disabling makes a running round wind down at its next check.
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.state.set_enabled(enabled);
        self.status.set_enabled(enabled);
        if previous != enabled {
            let message = if enabled {
                "Auto speed test enabled"
            } else {
                "Auto speed test disabled"
            };
            self.status.notice(NoticeLevel::Info, message);
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.status.notices()
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics
            .read()
            .map(|m| m.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Signal the timer and any running round to stop.
    pub fn shutdown(&self) {
        info!("Scheduler shutdown requested");
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Whether long waits and loops should keep going.
    pub(super) fn should_continue(&self) -> bool {
        self.state.is_enabled() && !self.is_shutting_down()
    }

    pub(super) fn update_metrics(&self, f: impl FnOnce(&mut SchedulerMetrics)) {
        if let Ok(mut m) = self.metrics.write() {
            f(&mut m);
        }
    }
}
