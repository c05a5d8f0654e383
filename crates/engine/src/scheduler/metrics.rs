use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{RoundOutcome, TriggerSource};

/// Scheduler operational counters exposed to operators.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    pub rounds_started: u64,
    pub rounds_succeeded: u64,
    pub rounds_interrupted: u64,
    pub rounds_failed: u64,
    /// Timer triggers dropped because a round was running.
    pub ignored_timer_triggers: u64,
    /// Manual triggers dropped because a round was running.
    pub ignored_manual_triggers: u64,
    pub last_round_duration: Option<Duration>,
    /// Mean duration over all finished rounds.
    pub avg_round_duration: Duration,
    pub last_round_at: Option<DateTime<Utc>>,
    pub passes_run: u64,
    /// Passes that ended with readings still pending.
    pub stalls: u64,
    pub hysteresis_removals: u64,
    pub invalid_delay_removals: u64,
    pub dedup_removals: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub active_switches: u64,
}

impl SchedulerMetrics {
    pub fn rounds_finished(&self) -> u64 {
        self.rounds_succeeded + self.rounds_interrupted + self.rounds_failed
    }

    /// Record a finished round.
    pub fn record_round(&mut self, outcome: &RoundOutcome, duration: Duration) {
        match outcome {
            RoundOutcome::Succeeded => self.rounds_succeeded += 1,
            RoundOutcome::Interrupted => self.rounds_interrupted += 1,
            RoundOutcome::Failed(_) => self.rounds_failed += 1,
        }
        self.last_round_duration = Some(duration);
        self.last_round_at = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.rounds_finished();
        self.avg_round_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_round_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn record_ignored(&mut self, source: TriggerSource) {
        match source {
            TriggerSource::Timer => self.ignored_timer_triggers += 1,
            TriggerSource::Manual => self.ignored_manual_triggers += 1,
        }
    }

    pub fn record_pass(&mut self, stalled_pending: usize) {
        self.passes_run += 1;
        if stalled_pending > 0 {
            self.stalls += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_round() {
        let mut m = SchedulerMetrics::default();
        m.record_round(&RoundOutcome::Succeeded, Duration::from_millis(100));

        assert_eq!(m.rounds_succeeded, 1);
        assert!(m.last_round_at.is_some());
        assert_eq!(m.avg_round_duration, Duration::from_millis(100));
    }

    #[test]
    fn record_multiple_rounds_averages() {
        let mut m = SchedulerMetrics::default();
        m.record_round(&RoundOutcome::Succeeded, Duration::from_millis(100));
        m.record_round(&RoundOutcome::Failed("boom".into()), Duration::from_millis(200));

        assert_eq!(m.rounds_finished(), 2);
        assert_eq!(m.rounds_failed, 1);
        let avg = m.avg_round_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
        assert_eq!(m.last_round_duration, Some(Duration::from_millis(200)));
    }

    #[test]
    fn ignored_triggers_per_source() {
        let mut m = SchedulerMetrics::default();
        m.record_ignored(TriggerSource::Timer);
        m.record_ignored(TriggerSource::Manual);
        m.record_ignored(TriggerSource::Manual);
        assert_eq!(m.ignored_timer_triggers, 1);
        assert_eq!(m.ignored_manual_triggers, 2);
    }

    #[test]
    fn stalled_passes_counted() {
        let mut m = SchedulerMetrics::default();
        m.record_pass(0);
        m.record_pass(3);
        assert_eq!(m.passes_run, 2);
        assert_eq!(m.stalls, 1);
    }

    #[test]
    fn serializes_for_operators() {
        let mut m = SchedulerMetrics::default();
        m.record_ignored(TriggerSource::Manual);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["ignored_manual_triggers"], 1);
        assert!(json["last_round_at"].is_null());
        assert_eq!(json["avg_round_duration"]["secs"], 0);
    }
}
