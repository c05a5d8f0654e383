use std::cmp::Ordering;

use autoproxy_core::Candidate;
use serde::{Deserialize, Serialize};

use super::CandidatePool;

/// Column a pool can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Delay,
    Throughput,
    Label,
    SortKey,
}

impl std::fmt::Display for SortColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortColumn::Delay => write!(f, "delay"),
            SortColumn::Throughput => write!(f, "throughput"),
            SortColumn::Label => write!(f, "label"),
            SortColumn::SortKey => write!(f, "sort_key"),
        }
    }
}

/// Result of a sort followed by the leading-order check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SortReport {
    /// Candidates whose position changed (summed over both sorts when re-issued).
    pub moved: usize,
    pub resorted: bool,
}

/// Positive latency, or `None` for anything that cannot rank.
fn rankable_delay(c: &Candidate) -> Option<i64> {
    c.delay_ms().filter(|ms| *ms > 0)
}

fn directed(ordering: Ordering, ascending: bool) -> Ordering {
    if ascending {
        ordering
    } else {
        ordering.reverse()
    }
}

/// Ordering used by [`CandidatePool::sort_by`].
///
/// Unusable delays always sort last regardless of direction. Unmeasured
/// throughput counts as zero.
pub fn compare(a: &Candidate, b: &Candidate, column: SortColumn, ascending: bool) -> Ordering {
    match column {
        SortColumn::Delay => match (rankable_delay(a), rankable_delay(b)) {
            (Some(x), Some(y)) => directed(x.cmp(&y), ascending),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortColumn::Throughput => {
            directed(a.throughput_value().total_cmp(&b.throughput_value()), ascending)
        }
        SortColumn::Label => directed(a.label.cmp(&b.label), ascending),
        SortColumn::SortKey => directed(a.sort_key.cmp(&b.sort_key), ascending),
    }
}

impl CandidatePool {
    /// Stable sort, then renumber `sort_key`. Returns how many candidates moved.
    pub fn sort_by(&mut self, column: SortColumn, ascending: bool) -> usize {
        let before: Vec<_> = self.keys().cloned().collect();
        self.entries_mut()
            .sort_by(|_, a, _, b| compare(a, b, column, ascending));
        self.renumber();
        before
            .iter()
            .zip(self.keys())
            .filter(|(old, new)| old != new)
            .count()
    }

    /// Compare the first candidate with the first later one that differs on
    /// `column`. True if that pair runs against the requested direction.
    pub fn leading_order_violated(&self, column: SortColumn, ascending: bool) -> bool {
        let mut iter = self.iter();
        let Some(first) = iter.next() else {
            return false;
        };
        iter.map(|other| compare(first, other, column, ascending))
            .find(|o| *o != Ordering::Equal)
            .is_some_and(|o| o == Ordering::Greater)
    }

    /// Sort, and re-issue the sort once if the leading order looks wrong.
    pub fn sort_checked(&mut self, column: SortColumn, ascending: bool) -> SortReport {
        let mut report = SortReport {
            moved: self.sort_by(column, ascending),
            resorted: false,
        };
        if matches!(column, SortColumn::Delay | SortColumn::Throughput)
            && self.leading_order_violated(column, ascending)
        {
            tracing::debug!(%column, ascending, "leading order violated, sorting again");
            report.moved += self.sort_by(column, ascending);
            report.resorted = true;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{candidate, key};
    use super::*;

    fn keys(pool: &CandidatePool) -> Vec<String> {
        pool.keys().map(|k| k.to_string()).collect()
    }

    #[test]
    fn delay_ascending_puts_invalid_last() {
        let mut pool = CandidatePool::from_candidates(vec![
            candidate("dead", Some(-1), None, ""),
            candidate("slow", Some(300), None, ""),
            candidate("none", None, None, ""),
            candidate("fast", Some(40), None, ""),
        ]);
        let moved = pool.sort_by(SortColumn::Delay, true);
        assert_eq!(keys(&pool), vec!["fast", "slow", "dead", "none"]);
        assert_eq!(moved, 3);
        let ordinals: Vec<u64> = pool.iter().map(|c| c.sort_key).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
    }

    #[test]
    fn delay_descending_still_puts_invalid_last() {
        let mut pool = CandidatePool::from_candidates(vec![
            candidate("dead", Some(0), None, ""),
            candidate("fast", Some(40), None, ""),
            candidate("slow", Some(300), None, ""),
        ]);
        pool.sort_by(SortColumn::Delay, false);
        assert_eq!(keys(&pool), vec!["slow", "fast", "dead"]);
    }

    #[test]
    fn throughput_descending_is_stable() {
        let mut pool = CandidatePool::from_candidates(vec![
            candidate("a", None, Some(5.0), ""),
            candidate("b", None, None, ""),
            candidate("c", None, Some(9.0), ""),
            candidate("d", None, Some(5.0), ""),
        ]);
        pool.sort_by(SortColumn::Throughput, false);
        assert_eq!(keys(&pool), vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn sorting_sorted_pool_moves_nothing() {
        let mut pool = CandidatePool::from_candidates(vec![
            candidate("a", Some(10), None, ""),
            candidate("b", Some(20), None, ""),
        ]);
        assert_eq!(pool.sort_by(SortColumn::Delay, true), 0);
        let report = pool.sort_checked(SortColumn::Delay, true);
        assert_eq!(report, SortReport { moved: 0, resorted: false });
    }

    #[test]
    fn leading_order_check_skips_equal_values() {
        let pool = CandidatePool::from_candidates(vec![
            candidate("a", None, Some(1.0), ""),
            candidate("b", None, Some(1.0), ""),
            candidate("c", None, Some(4.0), ""),
        ]);
        assert!(pool.leading_order_violated(SortColumn::Throughput, false));
        assert!(!pool.leading_order_violated(SortColumn::Throughput, true));
        assert!(!CandidatePool::new().leading_order_violated(SortColumn::Delay, true));
    }

    #[test]
    fn active_survives_sort() {
        let mut pool = CandidatePool::from_candidates(vec![
            candidate("a", None, Some(1.0), ""),
            candidate("b", None, Some(8.0), ""),
        ]);
        pool.set_active(&key("a")).unwrap();
        pool.sort_by(SortColumn::Throughput, false);
        assert_eq!(pool.active(), Some(&key("a")));
        assert_eq!(pool.position(&key("a")), Some(1));
    }
}
