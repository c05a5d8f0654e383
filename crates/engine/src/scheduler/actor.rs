//! Single-writer ownership of the candidate pool.
//!
//! The pool lives inside one task. Probe results and every other mutation
//! arrive as [`PoolCommand`]s over a bounded channel, so the pool itself
//! needs no lock.

use std::collections::BTreeSet;

use autoproxy_core::{Candidate, CandidateKey, CandidateView, ProbeKind, ProbeReport};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::pool::ranking::SortReport;
use crate::pool::selection::assess_health;
use crate::pool::{
    CandidatePool, DedupReport, HealthThresholds, HealthVerdict, MergeReport, SelectionPolicy,
    SelectionStage, SortColumn,
};

use super::traits::SchedulerError;

type PoolFn = Box<dyn FnOnce(&mut CandidatePool) + Send>;

pub enum PoolCommand {
    /// One probe result. Unknown keys are dropped.
    Report(ProbeReport),
    /// Run a closure against the pool on the actor task.
    Apply(PoolFn),
}

impl std::fmt::Debug for PoolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolCommand::Report(report) => f.debug_tuple("Report").field(report).finish(),
            PoolCommand::Apply(_) => f.write_str("Apply(..)"),
        }
    }
}

pub struct PoolActor {
    pool: CandidatePool,
    rx: mpsc::Receiver<PoolCommand>,
}

impl PoolActor {
    /// Spawn the actor. It stops once every handle and sink is dropped.
    pub fn spawn(pool: CandidatePool, capacity: usize) -> (PoolHandle, JoinHandle<CandidatePool>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let actor = Self { pool, rx };
        (PoolHandle { tx }, tokio::spawn(actor.run()))
    }

    async fn run(mut self) -> CandidatePool {
        let mut ingested: u64 = 0;
        let mut ignored: u64 = 0;
        while let Some(command) = self.rx.recv().await {
            match command {
                PoolCommand::Report(report) => {
                    if self.pool.apply_report(&report) {
                        ingested += 1;
                    } else {
                        ignored += 1;
                        trace!(key = %report.key, "dropping result for unknown candidate");
                    }
                }
                PoolCommand::Apply(f) => f(&mut self.pool),
            }
        }
        debug!(ingested, ignored, "pool actor stopped");
        self.pool
    }
}

/// Write-only handle for probe runners.
#[derive(Debug, Clone)]
pub struct ResultSink {
    tx: mpsc::Sender<PoolCommand>,
}

impl ResultSink {
    pub async fn send(&self, report: ProbeReport) -> Result<(), SchedulerError> {
        self.tx
            .send(PoolCommand::Report(report))
            .await
            .map_err(|_| SchedulerError::PoolClosed)
    }
}

/// Cloneable handle for everything that reads or reshapes the pool.
#[derive(Debug, Clone)]
pub struct PoolHandle {
    tx: mpsc::Sender<PoolCommand>,
}

impl PoolHandle {
    pub fn sink(&self) -> ResultSink {
        ResultSink {
            tx: self.tx.clone(),
        }
    }

    /// Run `f` on the actor task and wait for its result.
    ///
    /// Commands are handled in order, so every result sent before this call
    /// is visible to `f`.
    pub async fn with<T, F>(&self, f: F) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut CandidatePool) -> T + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let command = PoolCommand::Apply(Box::new(move |pool| {
            let _ = reply.send(f(pool));
        }));
        self.tx
            .send(command)
            .await
            .map_err(|_| SchedulerError::PoolClosed)?;
        rx.await.map_err(|_| SchedulerError::PoolClosed)
    }

    pub async fn len(&self) -> Result<usize, SchedulerError> {
        self.with(|pool| pool.len()).await
    }

    pub async fn keys(&self) -> Result<BTreeSet<CandidateKey>, SchedulerError> {
        self.with(|pool| pool.keys().cloned().collect()).await
    }

    pub async fn snapshot(&self) -> Result<Vec<Candidate>, SchedulerError> {
        self.with(|pool| pool.snapshot()).await
    }

    pub async fn views(&self) -> Result<Vec<CandidateView>, SchedulerError> {
        self.with(|pool| pool.views()).await
    }

    pub async fn top(&self, n: usize) -> Result<Vec<Candidate>, SchedulerError> {
        self.with(move |pool| pool.top(n)).await
    }

    pub async fn get(&self, key: CandidateKey) -> Result<Option<Candidate>, SchedulerError> {
        self.with(move |pool| pool.get(&key).cloned()).await
    }

    pub async fn active(&self) -> Result<Option<Candidate>, SchedulerError> {
        self.with(|pool| pool.active_candidate().cloned()).await
    }

    pub async fn set_active(&self, key: CandidateKey) -> Result<bool, SchedulerError> {
        Ok(self.with(move |pool| pool.set_active(&key)).await??)
    }

    pub async fn mark_pending(
        &self,
        kind: ProbeKind,
        keys: Vec<CandidateKey>,
    ) -> Result<usize, SchedulerError> {
        self.with(move |pool| pool.mark_pending(kind, &keys)).await
    }

    pub async fn pending_count(&self, kind: ProbeKind) -> Result<usize, SchedulerError> {
        self.with(move |pool| pool.pending_count(kind)).await
    }

    pub async fn expire_pending(&self) -> Result<usize, SchedulerError> {
        self.with(|pool| pool.expire_pending()).await
    }

    /// Sort with the leading-order recheck.
    pub async fn sort_checked(
        &self,
        column: SortColumn,
        ascending: bool,
    ) -> Result<SortReport, SchedulerError> {
        self.with(move |pool| pool.sort_checked(column, ascending)).await
    }

    pub async fn dedup(&self) -> Result<DedupReport, SchedulerError> {
        self.with(|pool| pool.dedup()).await
    }

    pub async fn remove_many(&self, keys: Vec<CandidateKey>) -> Result<usize, SchedulerError> {
        self.with(move |pool| pool.remove_many(&keys)).await
    }

    pub async fn remove_invalid(&self) -> Result<usize, SchedulerError> {
        self.with(|pool| pool.remove_invalid()).await
    }

    pub async fn normalize_untested_delay(&self) -> Result<usize, SchedulerError> {
        self.with(|pool| pool.normalize_untested_delay()).await
    }

    pub async fn merge_from_source(
        &self,
        candidates: Vec<Candidate>,
    ) -> Result<MergeReport, SchedulerError> {
        self.with(move |pool| pool.merge_from_source(candidates)).await
    }

    pub async fn throughput_failures(&self) -> Result<BTreeSet<CandidateKey>, SchedulerError> {
        self.with(|pool| pool.throughput_failures()).await
    }

    pub async fn assess_health(
        &self,
        thresholds: HealthThresholds,
    ) -> Result<HealthVerdict, SchedulerError> {
        self.with(move |pool| assess_health(pool, &thresholds)).await
    }

    /// Run selection on the actor. Returns the candidate only if it became active.
    pub async fn select_active(
        &self,
        policy: SelectionPolicy,
        stage: SelectionStage,
    ) -> Result<Option<Candidate>, SchedulerError> {
        self.with(move |pool| {
            pool.select_active(&policy, stage)
                .and_then(|key| pool.get(&key).cloned())
        })
        .await
    }
}
