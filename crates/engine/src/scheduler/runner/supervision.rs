use std::time::Duration;

use autoproxy_core::{Candidate, CandidateKey, CandidateView, ProbeKind};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::pool::SelectionStage;
use crate::scheduler::status::NoticeLevel;
use crate::scheduler::traits::SchedulerError;
use crate::scheduler::types::PassReport;

use super::Scheduler;

impl Scheduler {
    /// Sleep for `total`, re-checking the enabled flag every poll interval.
    ///
    /// Returns `false` if the wait was cut short.
    pub(super) async fn wait_while_enabled(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        let slice = self.config.poll_interval();
        loop {
            if !self.should_continue() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(slice)).await;
        }
    }

    /// Run one probe pass over `targets` and watch it until it finishes or stalls.
    ///
    /// Progress is the number of targets still pending in the pass's primary
    /// field. The pass ends when progress hits zero, stops moving between two
    /// samples, or the scheduler is disabled. Readings still pending at the
    /// end are expired.
    pub async fn supervise_pass(
        &self,
        kind: ProbeKind,
        targets: Vec<Candidate>,
        intermediate_select: bool,
    ) -> Result<PassReport, SchedulerError> {
        let mut report = PassReport::empty(kind, targets.len());

        self.runner.stop().await;
        self.wait_while_enabled(self.config.settle()).await;
        if !self.should_continue() || targets.is_empty() {
            return Ok(report);
        }

        let keys: Vec<CandidateKey> = targets.iter().map(|c| c.key.clone()).collect();
        self.pool.mark_pending(kind, keys).await?;
        debug!(%kind, targets = report.targets, "starting probe pass");
        if let Err(e) = self.runner.start(kind, targets, self.pool.sink()).await {
            warn!("Probe runner {} failed to start: {}", self.runner.name(), e);
            report.stalled_pending = self.pool.expire_pending().await?;
            return Ok(report);
        }

        loop {
            let before = self.pool.pending_count(kind).await?;
            self.wait_while_enabled(self.config.sample()).await;
            let after = self.pool.pending_count(kind).await?;
            report.samples += 1;
            debug!(%kind, before, after, "pass progress");

            if after == 0 {
                break;
            }
            if after == before {
                info!("Probe pass stalled with {} pending", after);
                break;
            }
            if !self.should_continue() {
                break;
            }
            if intermediate_select {
                self.publish_selection(SelectionStage::Intermediate).await?;
            }
        }

        self.runner.stop().await;
        self.wait_while_enabled(self.config.settle()).await;
        report.stalled_pending = self.pool.expire_pending().await?;
        self.update_metrics(|m| m.record_pass(report.stalled_pending));
        Ok(report)
    }

    /// Run selection and, if the active candidate changed, activate it.
    pub(super) async fn publish_selection(
        &self,
        stage: SelectionStage,
    ) -> Result<Option<Candidate>, SchedulerError> {
        let picked = self
            .pool
            .select_active(self.config.selection.clone(), stage)
            .await?;
        if let Some(candidate) = &picked {
            self.announce_active(candidate).await;
        }
        Ok(picked)
    }

    /// Push a newly active candidate to the activator and the status board.
    pub(super) async fn announce_active(&self, candidate: &Candidate) {
        if let Err(e) = self.activator.activate(candidate).await {
            warn!("Activating {} failed: {}", candidate.address(), e);
        }
        self.update_metrics(|m| m.active_switches += 1);
        self.status.set_active(Some(CandidateView::new(candidate, true)));
        self.status.notice(
            NoticeLevel::Info,
            format!(
                "Active endpoint switched to {} {} ({} ms, {} MB/s)",
                candidate.address(),
                candidate.label,
                candidate.delay_label(),
                candidate.throughput_label()
            ),
        );
    }
}
