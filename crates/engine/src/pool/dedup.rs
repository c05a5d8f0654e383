use std::collections::HashMap;

use autoproxy_core::{Candidate, CandidateKey};
use serde::Serialize;

use super::CandidatePool;

/// Counts of candidates removed by [`CandidatePool::dedup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    /// Same scheme, host, port and label as the survivor.
    pub exact: usize,
    /// Same scheme, host and port, different label.
    pub near: usize,
}

impl DedupReport {
    pub fn total(&self) -> usize {
        self.exact + self.near
    }
}

fn endpoint_of(c: &Candidate) -> (String, String, u16) {
    (c.scheme.clone(), c.host.to_ascii_lowercase(), c.port)
}

impl CandidatePool {
    /// Collapse candidates that point at the same endpoint.
    ///
    /// Within each group the active candidate survives, otherwise the earliest.
    pub fn dedup(&mut self) -> DedupReport {
        let mut survivors: HashMap<(String, String, u16), CandidateKey> = HashMap::new();
        for candidate in self.iter() {
            let endpoint = endpoint_of(candidate);
            let is_active = self.is_active(&candidate.key);
            survivors
                .entry(endpoint)
                .and_modify(|kept| {
                    if is_active {
                        *kept = candidate.key.clone();
                    }
                })
                .or_insert_with(|| candidate.key.clone());
        }

        let mut report = DedupReport::default();
        let mut doomed = Vec::new();
        for candidate in self.iter() {
            let Some(kept) = survivors.get(&endpoint_of(candidate)) else {
                continue;
            };
            if *kept == candidate.key {
                continue;
            }
            let same_label = self.get(kept).is_some_and(|k| k.label == candidate.label);
            if same_label {
                report.exact += 1;
            } else {
                report.near += 1;
            }
            doomed.push(candidate.key.clone());
        }

        if !doomed.is_empty() {
            self.remove_many(&doomed);
            tracing::debug!(exact = report.exact, near = report.near, "deduplicated pool");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::key;
    use super::*;

    fn at(key: &str, host: &str, port: u16, label: &str) -> Candidate {
        Candidate::with_key(key, host, port, label)
    }

    #[test]
    fn counts_exact_and_near() {
        let mut pool = CandidatePool::from_candidates(vec![
            at("a", "Node.example", 443, "HK"),
            at("b", "node.example", 443, "HK"),
            at("c", "node.example", 443, "HK 2"),
            at("d", "node.example", 8443, "HK"),
        ]);
        let report = pool.dedup();
        assert_eq!(report, DedupReport { exact: 1, near: 1 });
        assert_eq!(report.total(), 2);
        let left: Vec<_> = pool.keys().cloned().collect();
        assert_eq!(left, vec![key("a"), key("d")]);
    }

    #[test]
    fn active_member_survives_its_group() {
        let mut pool = CandidatePool::from_candidates(vec![
            at("a", "h", 1, "x"),
            at("b", "h", 1, "y"),
        ]);
        pool.set_active(&key("b")).unwrap();
        let report = pool.dedup();
        assert_eq!(report.near, 1);
        assert_eq!(pool.active(), Some(&key("b")));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn unique_pool_is_untouched() {
        let mut pool = CandidatePool::from_candidates(vec![at("a", "h", 1, ""), at("b", "h", 2, "")]);
        assert_eq!(pool.dedup().total(), 0);
        assert_eq!(pool.len(), 2);
    }
}
