use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use autoproxy_core::CandidateKey;

use crate::pool::FailureWindows;

/// Mutable round bookkeeping shared between the trigger paths and the round task.
#[derive(Debug)]
pub struct RoundState {
    enabled: AtomicBool,
    running: AtomicBool,
    failures: Mutex<FailureWindows>,
    loop_count: AtomicUsize,
}

impl RoundState {
    pub fn new(enabled: bool, failure_windows: usize) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            running: AtomicBool::new(false),
            failures: Mutex::new(FailureWindows::new(failure_windows)),
            loop_count: AtomicUsize::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Returns the previous value.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the running flag. `None` if a round already holds it.
    pub fn try_begin(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunningGuard { state: self })
    }

    /// Feed the current failure set into the windows, returning keys to drop.
    pub fn observe_failures(&self, current: BTreeSet<CandidateKey>) -> Vec<CandidateKey> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .observe(current)
    }

    /// Forget strikes for candidates that have left the pool.
    pub fn retain_failures(&self, live: &BTreeSet<CandidateKey>) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain_live(live)
    }

    pub fn loop_count(&self) -> usize {
        self.loop_count.load(Ordering::SeqCst)
    }

    pub fn set_loop_count(&self, count: usize) {
        self.loop_count.store(count, Ordering::SeqCst);
    }
}

/// Holds the running flag; clears it on drop, including during unwinding.
#[derive(Debug)]
pub struct RunningGuard<'a> {
    state: &'a RoundState,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::SeqCst);
    }
}
