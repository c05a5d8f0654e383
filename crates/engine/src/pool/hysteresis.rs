use std::collections::{BTreeSet, VecDeque};

use autoproxy_core::{CandidateKey, Reading};

use super::CandidatePool;

/// Rolling failure observations across consecutive passes.
///
/// A candidate is only removed after failing in every one of the last
/// `window_count` observations.
#[derive(Debug, Clone)]
pub struct FailureWindows {
    window_count: usize,
    windows: VecDeque<BTreeSet<CandidateKey>>,
}

impl FailureWindows {
    pub fn new(window_count: usize) -> Self {
        let window_count = window_count.max(1);
        Self {
            window_count,
            windows: VecDeque::with_capacity(window_count),
        }
    }

    /// Record the current failure set and return the keys that failed in every window.
    ///
    /// Returned keys are purged from all windows.
    pub fn observe(&mut self, current: BTreeSet<CandidateKey>) -> Vec<CandidateKey> {
        if self.windows.len() == self.window_count {
            self.windows.pop_front();
        }
        self.windows.push_back(current);
        if self.windows.len() < self.window_count {
            return Vec::new();
        }

        let mut iter = self.windows.iter();
        let Some(first) = iter.next() else {
            return Vec::new();
        };
        let mut strikes = first.clone();
        for window in iter {
            strikes.retain(|k| window.contains(k));
        }

        for window in self.windows.iter_mut() {
            window.retain(|k| !strikes.contains(k));
        }
        strikes.into_iter().collect()
    }

    /// Drop strikes held by keys that are no longer in `live`.
    ///
    /// Returns how many strikes were dropped.
    pub fn retain_live(&mut self, live: &BTreeSet<CandidateKey>) -> usize {
        let mut dropped = 0;
        for window in self.windows.iter_mut() {
            let before = window.len();
            window.retain(|k| live.contains(k));
            dropped += before - window.len();
        }
        dropped
    }
}

impl Default for FailureWindows {
    fn default() -> Self {
        Self::new(3)
    }
}

impl CandidatePool {
    /// Keys whose throughput reading is not a measurement.
    pub fn throughput_failures(&self) -> BTreeSet<CandidateKey> {
        self.iter()
            .filter(|c| !matches!(c.throughput, Reading::Measured(_)))
            .map(|c| c.key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::key;
    use super::*;

    fn set(keys: &[&str]) -> BTreeSet<CandidateKey> {
        keys.iter().map(|k| key(k)).collect()
    }

    #[test]
    fn fail_fail_succeed_survives() {
        let mut windows = FailureWindows::new(3);
        assert!(windows.observe(set(&["x"])).is_empty());
        assert!(windows.observe(set(&["x"])).is_empty());
        assert!(windows.observe(set(&[])).is_empty());
        // Third strike after a success is not enough.
        assert!(windows.observe(set(&["x"])).is_empty());
    }

    #[test]
    fn three_failures_remove_exactly_once() {
        let mut windows = FailureWindows::new(3);
        windows.observe(set(&["x", "y"]));
        windows.observe(set(&["x"]));
        assert_eq!(windows.observe(set(&["x"])), vec![key("x")]);
        assert!(windows.observe(set(&["x"])).is_empty());
    }

    #[test]
    fn two_strike_variant() {
        let mut windows = FailureWindows::new(2);
        assert!(windows.observe(set(&["a"])).is_empty());
        assert_eq!(windows.observe(set(&["a", "b"])), vec![key("a")]);
        assert_eq!(windows.observe(set(&["b"])), vec![key("b")]);
    }

    #[test]
    fn window_depth_is_bounded() {
        let mut windows = FailureWindows::default();
        for _ in 0..5 {
            windows.observe(set(&[]));
        }
        assert_eq!(windows.windows.len(), 3);
    }

    #[test]
    fn departed_keys_start_over() {
        let mut windows = FailureWindows::new(3);
        windows.observe(set(&["x", "y"]));
        windows.observe(set(&["x", "y"]));

        // x left the pool; y is still there.
        assert_eq!(windows.retain_live(&set(&["y"])), 2);

        assert_eq!(windows.observe(set(&["x", "y"])), vec![key("y")]);
        assert!(windows.observe(set(&["x"])).is_empty());
        assert_eq!(windows.observe(set(&["x"])), vec![key("x")]);
    }

    #[test]
    fn failures_include_every_unmeasured_state() {
        use super::super::test_support::candidate;
        let mut pending = candidate("p", None, None, "");
        pending.throughput = Reading::Pending;
        let pool = CandidatePool::from_candidates(vec![
            candidate("ok", None, Some(0.5), ""),
            candidate("untested", None, None, ""),
            pending,
        ]);
        assert_eq!(pool.throughput_failures(), set(&["p", "untested"]));
    }
}
