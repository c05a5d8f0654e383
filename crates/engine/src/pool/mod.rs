//! The candidate pool and the pure algorithms that run over it.
//!
//! Nothing in here is async or shared: the pool is owned by a single actor
//! (see [`crate::scheduler::actor`]) and every function takes it by reference.

pub mod dedup;
pub mod hysteresis;
pub mod ranking;
pub mod selection;

use autoproxy_core::{Candidate, CandidateKey, CandidateView, CoreError, ProbeKind, ProbeReport, Reading};
use indexmap::IndexMap;
use serde::Serialize;

pub use dedup::DedupReport;
pub use hysteresis::FailureWindows;
pub use ranking::SortColumn;
pub use selection::{HealthThresholds, HealthVerdict, SelectionPolicy, SelectionStage};

/// Ordered collection of candidates with unique keys and at most one active entry.
#[derive(Debug, Default, Clone)]
pub struct CandidatePool {
    candidates: IndexMap<CandidateKey, Candidate>,
    active: Option<CandidateKey>,
}

/// Outcome of replacing the pool contents with a fresh source listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub updated: usize,
    pub added: usize,
    pub removed: usize,
    pub active_before: Option<CandidateKey>,
    pub active_after: Option<CandidateKey>,
}

impl MergeReport {
    pub fn active_changed(&self) -> bool {
        self.active_before != self.active_after
    }
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool in the given order. Later entries with a duplicate key are dropped.
    pub fn from_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let mut pool = Self::new();
        for candidate in candidates {
            pool.candidates.entry(candidate.key.clone()).or_insert(candidate);
        }
        pool.renumber();
        pool
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, key: &CandidateKey) -> Option<&Candidate> {
        self.candidates.get(key)
    }

    /// Candidates in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CandidateKey> {
        self.candidates.keys()
    }

    pub fn position(&self, key: &CandidateKey) -> Option<usize> {
        self.candidates.get_index_of(key)
    }

    pub fn active(&self) -> Option<&CandidateKey> {
        self.active.as_ref()
    }

    pub fn active_candidate(&self) -> Option<&Candidate> {
        self.active.as_ref().and_then(|k| self.candidates.get(k))
    }

    pub fn is_active(&self, key: &CandidateKey) -> bool {
        self.active.as_ref() == Some(key)
    }

    /// Cloned candidates in order.
    pub fn snapshot(&self) -> Vec<Candidate> {
        self.candidates.values().cloned().collect()
    }

    /// The first `n` candidates in order.
    pub fn top(&self, n: usize) -> Vec<Candidate> {
        self.candidates.values().take(n).cloned().collect()
    }

    pub fn views(&self) -> Vec<CandidateView> {
        self.candidates
            .values()
            .map(|c| CandidateView::new(c, self.is_active(&c.key)))
            .collect()
    }

    /// Merge one probe result. Returns `false` if the key is not in the pool.
    pub fn apply_report(&mut self, report: &ProbeReport) -> bool {
        let Some(candidate) = self.candidates.get_mut(&report.key) else {
            return false;
        };
        if let Some(delay) = &report.delay {
            candidate.delay = delay.clone();
        }
        if let Some(throughput) = &report.throughput {
            candidate.throughput = throughput.clone();
        }
        true
    }

    /// Mark the fields measured by `kind` as in flight for the given keys.
    pub fn mark_pending(&mut self, kind: ProbeKind, keys: &[CandidateKey]) -> usize {
        let mut marked = 0;
        for key in keys {
            if let Some(candidate) = self.candidates.get_mut(key) {
                if kind.measures_delay() {
                    candidate.delay = Reading::Pending;
                }
                if kind.measures_throughput() {
                    candidate.throughput = Reading::Pending;
                }
                marked += 1;
            }
        }
        marked
    }

    /// Candidates still waiting on the primary field of `kind`.
    ///
    /// Throughput is primary for combined passes since it is measured last.
    pub fn pending_count(&self, kind: ProbeKind) -> usize {
        self.candidates
            .values()
            .filter(|c| match kind {
                ProbeKind::Delay => c.delay.is_pending(),
                ProbeKind::Throughput | ProbeKind::Combined => c.throughput.is_pending(),
            })
            .count()
    }

    /// Turn every leftover `Pending` reading into `Failed("stalled")`.
    pub fn expire_pending(&mut self) -> usize {
        let mut expired = 0;
        for candidate in self.candidates.values_mut() {
            if candidate.delay.is_pending() {
                candidate.delay = Reading::Failed("stalled".to_string());
                expired += 1;
            }
            if candidate.throughput.is_pending() {
                candidate.throughput = Reading::Failed("stalled".to_string());
                expired += 1;
            }
        }
        expired
    }

    /// Make `key` the active candidate. Returns whether the active key changed.
    pub fn set_active(&mut self, key: &CandidateKey) -> Result<bool, CoreError> {
        if !self.candidates.contains_key(key) {
            return Err(CoreError::CandidateNotFound(key.to_string()));
        }
        if self.is_active(key) {
            return Ok(false);
        }
        self.active = Some(key.clone());
        Ok(true)
    }

    /// Remove the given keys. Clears `active` if it was among them.
    pub fn remove_many(&mut self, keys: &[CandidateKey]) -> usize {
        let before = self.candidates.len();
        for key in keys {
            self.candidates.shift_remove(key);
        }
        self.after_removal();
        before - self.candidates.len()
    }

    /// Remove candidates whose latency probe failed: measured `<= 0`, failed or skipped.
    pub fn remove_invalid(&mut self) -> usize {
        let before = self.candidates.len();
        self.candidates.retain(|_, c| {
            !matches!(
                c.delay,
                Reading::Measured(ms) if ms <= 0
            ) && !matches!(c.delay, Reading::Failed(_) | Reading::Skipped)
        });
        self.after_removal();
        before - self.candidates.len()
    }

    /// Treat "never measured" the same as "measured and failed" (`-1`).
    pub fn normalize_untested_delay(&mut self) -> usize {
        let mut normalized = 0;
        for candidate in self.candidates.values_mut() {
            if candidate.delay.is_untested() {
                candidate.delay = Reading::Measured(-1);
                normalized += 1;
            }
        }
        normalized
    }

    /// Replace the contents with a fresh listing from the candidate source.
    ///
    /// Surviving keys keep their measurements and relative order; new keys are
    /// appended. If the active key disappears, the first remaining candidate
    /// becomes active.
    pub fn merge_from_source(&mut self, incoming: Vec<Candidate>) -> MergeReport {
        let active_before = self.active.clone();
        let mut fresh: IndexMap<CandidateKey, Candidate> = IndexMap::with_capacity(incoming.len());
        for candidate in incoming {
            fresh.entry(candidate.key.clone()).or_insert(candidate);
        }

        let mut report = MergeReport {
            active_before: active_before.clone(),
            ..MergeReport::default()
        };

        let before = self.candidates.len();
        self.candidates.retain(|key, _| fresh.contains_key(key));
        report.removed = before - self.candidates.len();

        for (key, candidate) in fresh {
            match self.candidates.get_mut(&key) {
                Some(existing) => {
                    existing.scheme = candidate.scheme;
                    existing.host = candidate.host;
                    existing.port = candidate.port;
                    existing.label = candidate.label;
                    report.updated += 1;
                }
                None => {
                    self.candidates.insert(key, candidate);
                    report.added += 1;
                }
            }
        }

        self.after_removal();
        if self.active.is_none() && active_before.is_some() {
            self.active = self.candidates.keys().next().cloned();
        }
        report.active_after = self.active.clone();
        report
    }

    fn after_removal(&mut self) {
        if let Some(active) = &self.active {
            if !self.candidates.contains_key(active) {
                self.active = None;
            }
        }
        self.renumber();
    }

    /// Rewrite `sort_key` to match the current order. Returns how many changed.
    pub(crate) fn renumber(&mut self) -> usize {
        let mut changed = 0;
        for (index, candidate) in self.candidates.values_mut().enumerate() {
            let index = index as u64;
            if candidate.sort_key != index {
                candidate.sort_key = index;
                changed += 1;
            }
        }
        changed
    }

    pub(crate) fn entries_mut(&mut self) -> &mut IndexMap<CandidateKey, Candidate> {
        &mut self.candidates
    }
}
