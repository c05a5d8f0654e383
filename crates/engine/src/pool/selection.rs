//! Active-endpoint selection and the pool health verdict.
//!
//! Selection walks an ordered list of predicates over the pool in its
//! current order. The first predicate with any match wins and its first
//! matching candidate is picked, so the result depends on how the pool was
//! sorted just before.

use autoproxy_core::{Candidate, CandidateKey};
use serde::{Deserialize, Serialize};

use super::CandidatePool;

/// Where in a round selection is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStage {
    /// Mid-pass, results still arriving. May pick nothing.
    Intermediate,
    /// After filtering and sorting. Falls back to the top candidate.
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Exclusive upper latency bound in ms.
    pub delay_bound_ms: i64,
    /// Throughput a region-preferred candidate must exceed.
    pub region_min_throughput: f64,
    /// Label hints. ASCII hints match whole tokens, others match as substrings.
    pub preferred_regions: Vec<String>,
    /// Descending throughput tiers tried in order.
    pub throughput_tiers: Vec<f64>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            delay_bound_ms: 500,
            region_min_throughput: 1.0,
            preferred_regions: vec!["us".to_string(), "美国".to_string()],
            throughput_tiers: vec![30.0, 10.0, 5.0, 1.0],
        }
    }
}

impl SelectionPolicy {
    pub fn matches_region(&self, label: &str) -> bool {
        self.preferred_regions.iter().any(|hint| label_has_hint(label, hint))
    }

    fn regional(&self, c: &Candidate) -> bool {
        c.delay_within(self.delay_bound_ms)
            && c.throughput_value() > self.region_min_throughput
            && self.matches_region(&c.label)
    }

    /// Pick a candidate from the pool as currently ordered.
    pub fn select<'a>(&self, pool: &'a CandidatePool, stage: SelectionStage) -> Option<&'a Candidate> {
        if let Some(c) = first_match(pool, |c| self.regional(c)) {
            return Some(c);
        }
        for tier in &self.throughput_tiers {
            let hit = first_match(pool, |c| {
                c.delay_within(self.delay_bound_ms) && c.throughput_value() > *tier
            });
            if hit.is_some() {
                return hit;
            }
        }

        match stage {
            SelectionStage::Intermediate => {
                for tier in &self.throughput_tiers {
                    let hit = first_match(pool, |c| c.throughput_value() > *tier);
                    if hit.is_some() {
                        return hit;
                    }
                }
                first_match(pool, |c| c.throughput_value() > 0.0)
            }
            SelectionStage::Final => pool.iter().next(),
        }
    }
}

fn first_match<'a>(
    pool: &'a CandidatePool,
    pred: impl Fn(&Candidate) -> bool,
) -> Option<&'a Candidate> {
    pool.iter().find(|&c| pred(c))
}

fn label_has_hint(label: &str, hint: &str) -> bool {
    if hint.is_empty() {
        return false;
    }
    if hint.is_ascii() {
        label
            .split(|ch: char| !ch.is_alphanumeric())
            .any(|token| token.eq_ignore_ascii_case(hint))
    } else {
        label.contains(hint)
    }
}

/// Thresholds deciding whether the pool needs fresh candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub min_pool_size: usize,
    pub min_good_count: usize,
    pub delay_bound_ms: i64,
    pub good_throughput: f64,
    /// Upper bound on candidates re-verified in the tight loop.
    pub loop_cap: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_pool_size: 20,
            min_good_count: 5,
            delay_bound_ms: 500,
            good_throughput: 5.0,
            loop_cap: 10,
        }
    }
}

impl HealthThresholds {
    pub fn is_good(&self, c: &Candidate) -> bool {
        c.delay_within(self.delay_bound_ms) && c.throughput_value() > self.good_throughput
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthVerdict {
    pub pool_size: usize,
    pub good_count: usize,
    pub needs_refresh: bool,
    /// Candidates the tight loop re-verifies.
    pub loop_count: usize,
}

pub fn assess_health(pool: &CandidatePool, thresholds: &HealthThresholds) -> HealthVerdict {
    let pool_size = pool.len();
    let good_count = pool.iter().filter(|c| thresholds.is_good(c)).count();
    HealthVerdict {
        pool_size,
        good_count,
        needs_refresh: pool_size < thresholds.min_pool_size
            || good_count < thresholds.min_good_count,
        loop_count: good_count.min(thresholds.loop_cap),
    }
}

impl CandidatePool {
    /// Run selection and make the result active.
    ///
    /// Returns the newly active key, or `None` if nothing was picked or the
    /// pick was already active.
    pub fn select_active(
        &mut self,
        policy: &SelectionPolicy,
        stage: SelectionStage,
    ) -> Option<CandidateKey> {
        let picked = policy.select(self, stage)?.key.clone();
        match self.set_active(&picked) {
            Ok(true) => Some(picked),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{candidate, key};
    use super::super::SortColumn;
    use super::*;

    #[test]
    fn region_preference_beats_raw_speed() {
        let pool = CandidatePool::from_candidates(vec![
            candidate("b", Some(80), Some(40.0), "EU"),
            candidate("a", Some(120), Some(2.0), "US-East"),
        ]);
        let picked = SelectionPolicy::default().select(&pool, SelectionStage::Final);
        assert_eq!(picked.map(|c| c.key.clone()), Some(key("a")));
    }

    #[test]
    fn region_hints() {
        let policy = SelectionPolicy::default();
        assert!(policy.matches_region("US-East 01"));
        assert!(policy.matches_region("[us] node"));
        assert!(policy.matches_region("美国 洛杉矶"));
        assert!(!policy.matches_region("Russia"));
        assert!(!policy.matches_region("AUS"));
    }

    #[test]
    fn tiers_walk_down() {
        let pool = CandidatePool::from_candidates(vec![
            candidate("slow-net", Some(50), Some(6.0), "DE"),
            candidate("fast-net", Some(50), Some(12.0), "DE"),
            candidate("laggy", Some(900), Some(80.0), "DE"),
        ]);
        let picked = SelectionPolicy::default().select(&pool, SelectionStage::Final);
        assert_eq!(picked.map(|c| c.key.clone()), Some(key("fast-net")));
    }

    #[test]
    fn intermediate_ignores_latency_and_may_pick_nothing() {
        let laggy = CandidatePool::from_candidates(vec![
            candidate("x", None, Some(0.0), ""),
            candidate("laggy", Some(900), Some(0.4), ""),
        ]);
        let policy = SelectionPolicy::default();
        let picked = policy.select(&laggy, SelectionStage::Intermediate);
        assert_eq!(picked.map(|c| c.key.clone()), Some(key("laggy")));

        let dead = CandidatePool::from_candidates(vec![candidate("x", None, None, "")]);
        assert!(policy.select(&dead, SelectionStage::Intermediate).is_none());
        assert_eq!(
            policy.select(&dead, SelectionStage::Final).map(|c| c.key.clone()),
            Some(key("x"))
        );
        assert!(policy.select(&CandidatePool::new(), SelectionStage::Final).is_none());
    }

    #[test]
    fn sort_then_select_is_idempotent() {
        let mut pool = CandidatePool::from_candidates(vec![
            candidate("a", Some(100), Some(3.0), ""),
            candidate("b", Some(200), Some(11.0), ""),
            candidate("c", Some(300), Some(11.0), ""),
        ]);
        let policy = SelectionPolicy::default();
        pool.sort_by(SortColumn::Throughput, false);
        assert_eq!(pool.select_active(&policy, SelectionStage::Final), Some(key("b")));

        pool.sort_by(SortColumn::Throughput, false);
        assert_eq!(pool.select_active(&policy, SelectionStage::Final), None);
        assert_eq!(pool.active(), Some(&key("b")));
    }

    fn pool_of(total: usize, good: usize) -> CandidatePool {
        CandidatePool::from_candidates((0..total).map(|i| {
            let name = format!("n{i}");
            if i < good {
                candidate(&name, Some(100), Some(8.0), "")
            } else {
                candidate(&name, Some(100), Some(1.0), "")
            }
        }))
    }

    #[test]
    fn healthy_pool_keeps_tight_loop() {
        let verdict = assess_health(&pool_of(25, 6), &HealthThresholds::default());
        assert!(!verdict.needs_refresh);
        assert_eq!(verdict.good_count, 6);
        assert_eq!(verdict.loop_count, 6);
    }

    #[test]
    fn small_or_weak_pool_needs_refresh() {
        let thresholds = HealthThresholds::default();
        assert!(assess_health(&pool_of(15, 15), &thresholds).needs_refresh);
        assert!(assess_health(&pool_of(30, 4), &thresholds).needs_refresh);
        assert_eq!(assess_health(&pool_of(30, 14), &thresholds).loop_count, 10);
    }
}
