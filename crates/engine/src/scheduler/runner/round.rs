use autoproxy_core::{Candidate, CandidateView, ProbeKind};
use tracing::{debug, info, warn};

use crate::pool::{SelectionStage, SortColumn};
use crate::scheduler::status::NoticeLevel;
use crate::scheduler::traits::SchedulerError;

use super::Scheduler;

impl Scheduler {
    /// Repeat round cycles while enabled, up to `max_cycles` if set.
    pub(super) async fn run_round(&self) -> Result<u32, SchedulerError> {
        let mut cycles = 0;
        while self.should_continue() {
            if self.config.max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            cycles += 1;
            debug!(cycle = cycles, "starting round cycle");
            self.run_cycle().await?;
        }
        Ok(cycles)
    }

    async fn run_cycle(&self) -> Result<(), SchedulerError> {
        self.status
            .step(1, "probing latency and throughput of all candidates");
        let targets = self.pool.snapshot().await?;
        if targets.is_empty() {
            self.status
                .notice(NoticeLevel::Warn, "Candidate pool is empty, refreshing from source");
            return self.escalate().await;
        }
        self.supervise_pass(ProbeKind::Combined, targets, true).await?;
        if !self.should_continue() {
            return Ok(());
        }

        self.status.step(2, "dropping candidates that keep failing");
        self.filter_repeated_failures().await?;

        self.status.step(3, "sorting by throughput");
        self.pool.sort_checked(SortColumn::Throughput, false).await?;

        self.status.step(4, "selecting the active endpoint");
        self.publish_selection(SelectionStage::Final).await?;
        if !self.should_continue() {
            return Ok(());
        }

        self.status.step(5, "checking pool health");
        let verdict = self
            .pool
            .assess_health(self.config.health.clone())
            .await?;
        self.state.set_loop_count(verdict.loop_count);
        info!(
            pool_size = verdict.pool_size,
            good = verdict.good_count,
            needs_refresh = verdict.needs_refresh,
            "pool health assessed"
        );

        if verdict.needs_refresh {
            self.escalate().await
        } else {
            self.tight_loop().await
        }
    }

    /// Drop candidates whose throughput failed in every failure window.
    pub(super) async fn filter_repeated_failures(&self) -> Result<usize, SchedulerError> {
        let failures = self.pool.throughput_failures().await?;
        let doomed = self.state.observe_failures(failures);
        if doomed.is_empty() {
            return Ok(0);
        }

        let active_before = self.pool.active().await?.map(|c| c.key);
        let removed = self.pool.remove_many(doomed).await?;
        self.update_metrics(|m| m.hysteresis_removals += removed as u64);
        self.status.notice(
            NoticeLevel::Info,
            format!("Removed {removed} candidates that failed repeatedly"),
        );

        if active_before.is_some() && self.pool.active().await?.is_none() {
            self.status.set_active(None);
        }
        Ok(removed)
    }

    /// Drop failure strikes held by candidates no longer in the pool, so a key
    /// that comes back later starts with a clean record.
    async fn forget_departed(&self) -> Result<(), SchedulerError> {
        let live = self.pool.keys().await?;
        let dropped = self.state.retain_failures(&live);
        if dropped > 0 {
            debug!(dropped, "forgot failure strikes of departed candidates");
        }
        Ok(())
    }

    /// Refresh from the candidate source, then rebuild the pool around latency.
    pub(super) async fn escalate(&self) -> Result<(), SchedulerError> {
        self.status.step(6, "refreshing candidates from source");
        self.refresh_from_source().await?;
        if !self.should_continue() {
            return Ok(());
        }
        if self.pool.len().await? == 0 {
            self.status.notice(
                NoticeLevel::Warn,
                "Candidate pool is still empty, retrying the source later",
            );
            self.wait_while_enabled(self.config.sample()).await;
            return Ok(());
        }

        self.status.step(7, "removing duplicate candidates");
        let dedup = self.pool.dedup().await?;
        if dedup.total() > 0 {
            self.forget_departed().await?;
            self.update_metrics(|m| m.dedup_removals += dedup.total() as u64);
            self.status.notice(
                NoticeLevel::Info,
                format!(
                    "Removed {} duplicates ({} exact, {} same endpoint)",
                    dedup.total(),
                    dedup.exact,
                    dedup.near
                ),
            );
        }

        self.status.step(8, "probing latency of all candidates");
        let targets = self.pool.snapshot().await?;
        self.supervise_pass(ProbeKind::Delay, targets, false).await?;
        if !self.should_continue() {
            return Ok(());
        }

        self.status.step(9, "removing candidates without a latency result");
        self.pool.normalize_untested_delay().await?;
        let removed = self.pool.remove_invalid().await?;
        self.update_metrics(|m| m.invalid_delay_removals += removed as u64);
        if removed > 0 {
            self.forget_departed().await?;
            self.status.notice(
                NoticeLevel::Info,
                format!("Removed {removed} candidates with invalid latency"),
            );
        }
        self.pool.sort_checked(SortColumn::Delay, true).await?;

        if self.pool.active().await?.is_none() {
            self.status.set_active(None);
            self.publish_selection(SelectionStage::Final).await?;
        }
        Ok(())
    }

    /// Pull the full candidate list and merge it. Failures leave the pool as it was.
    pub(super) async fn refresh_from_source(&self) -> Result<(), SchedulerError> {
        let candidates = match self.source.refresh_all().await {
            Ok(candidates) if !candidates.is_empty() => candidates,
            Ok(_) => {
                self.update_metrics(|m| m.refresh_failures += 1);
                self.status.notice(
                    NoticeLevel::Warn,
                    format!("Source {} returned no candidates", self.source.name()),
                );
                return Ok(());
            }
            Err(e) => {
                self.update_metrics(|m| m.refresh_failures += 1);
                self.status.notice(
                    NoticeLevel::Warn,
                    format!("Refreshing from {} failed: {}", self.source.name(), e),
                );
                return Ok(());
            }
        };

        let merge = self.pool.merge_from_source(candidates).await?;
        if merge.removed > 0 {
            self.forget_departed().await?;
        }
        self.update_metrics(|m| m.refreshes += 1);
        self.status.notice(
            NoticeLevel::Info,
            format!(
                "Refreshed candidates: {} updated, {} added, {} removed",
                merge.updated, merge.added, merge.removed
            ),
        );

        if merge.active_changed() {
            match self.pool.active().await? {
                Some(active) => self.announce_active(&active).await,
                None => self.status.set_active(None),
            }
        }
        Ok(())
    }

    /// Re-verify only the top candidates, one at a time, while they keep up.
    pub(super) async fn tight_loop(&self) -> Result<(), SchedulerError> {
        let mut passes = 0;
        while self.should_continue() {
            if self.config.tight_loop_passes.is_some_and(|max| passes >= max) {
                break;
            }
            passes += 1;

            let count = self.state.loop_count();
            self.status.step(
                10,
                &format!("verifying throughput of the top {count} candidates (pass {passes})"),
            );
            let top = self.pool.top(count).await?;
            if top.is_empty() {
                break;
            }

            let mut qualifying = Vec::new();
            for candidate in top {
                if !self.should_continue() {
                    return Ok(());
                }
                if let Some(probed) = self.probe_alone(candidate).await? {
                    if probed.throughput_value() > self.config.health.good_throughput {
                        qualifying.push(probed.key);
                    }
                }
            }
            if !self.should_continue() {
                return Ok(());
            }

            if qualifying.len() < self.config.health.min_good_count {
                info!(
                    "Only {} candidates kept up, re-probing the whole pool",
                    qualifying.len()
                );
                break;
            }

            let active = self.pool.active().await?.map(|c| c.key);
            if active.as_ref().is_some_and(|k| qualifying.contains(k)) {
                debug!("active candidate still qualifies, keeping it");
                continue;
            }

            self.pool.sort_checked(SortColumn::Throughput, false).await?;
            self.publish_selection(SelectionStage::Final).await?;
        }
        Ok(())
    }

    /// Throughput-probe a single candidate for one sampling interval.
    ///
    /// Returns the candidate as it looks afterwards, or `None` if it left the pool.
    async fn probe_alone(&self, candidate: Candidate) -> Result<Option<Candidate>, SchedulerError> {
        let key = candidate.key.clone();
        self.pool
            .mark_pending(ProbeKind::Throughput, vec![key.clone()])
            .await?;
        if let Err(e) = self
            .runner
            .start(ProbeKind::Throughput, vec![candidate], self.pool.sink())
            .await
        {
            warn!("Probe runner {} failed to start: {}", self.runner.name(), e);
        } else {
            self.wait_while_enabled(self.config.sample()).await;
        }
        self.runner.stop().await;
        self.wait_while_enabled(self.config.settle()).await;
        let stalled = self.pool.expire_pending().await?;
        self.update_metrics(|m| m.record_pass(stalled));

        let probed = self.pool.get(key).await?;
        if let Some(c) = &probed {
            let is_active = self.pool.active().await?.is_some_and(|a| a.key == c.key);
            if is_active {
                self.status.set_active(Some(CandidateView::new(c, true)));
            }
        }
        Ok(probed)
    }
}
