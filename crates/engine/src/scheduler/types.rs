use std::fmt;
use std::path::Path;
use std::time::Duration;

use autoproxy_core::{CandidateView, ProbeKind};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::pool::{HealthThresholds, SelectionPolicy};

use super::clock::TriggerCadence;
use super::traits::SchedulerError;

/// What asked for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Timer,
    Manual,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Timer => write!(f, "timer"),
            TriggerSource::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum RoundOutcome {
    Succeeded,
    /// Disabled (or shut down) before the round finished on its own.
    Interrupted,
    Failed(String),
}

/// Summary of one finished round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub source: TriggerSource,
    /// Monotonic start, used for ordering rounds against each other.
    #[serde(skip)]
    pub started: tokio::time::Instant,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
    pub cycles: u32,
    pub outcome: RoundOutcome,
}

impl RoundReport {
    pub fn finished(&self) -> tokio::time::Instant {
        self.started + self.elapsed
    }
}

/// Result of [`Scheduler::trigger`](super::Scheduler::trigger).
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Disabled,
    AlreadyRunning(TriggerSource),
    Finished(RoundReport),
}

/// What one supervised probe pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub kind: ProbeKind,
    pub targets: usize,
    /// Progress samples taken before the pass ended.
    pub samples: u32,
    /// Readings still pending at the end, expired to `Failed("stalled")`.
    pub stalled_pending: usize,
}

impl PassReport {
    pub(crate) fn empty(kind: ProbeKind, targets: usize) -> Self {
        Self {
            kind,
            targets,
            samples: 0,
            stalled_pending: 0,
        }
    }
}

/// Current scheduler state as shown to operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub message: String,
    /// Round step currently executing (1-10).
    pub step: Option<u8>,
    /// Duration of the last finished round, `HH:MM:SS`.
    pub last_duration: Option<String>,
    /// Countdown to the next timer trigger, `HH:MM:SS`.
    pub time_to_next: Option<String>,
    pub active: Option<CandidateView>,
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether automatic rounds are enabled at startup.
    #[serde(default)]
    pub start_enabled: bool,
    /// Wall-clock boundary that fires the timer trigger.
    #[serde(default = "default_cadence")]
    pub cadence: TriggerCadence,
    /// Wait after stopping the probe runner before reading results.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Interval between progress samples during a pass.
    #[serde(default = "default_sample_secs")]
    pub sample_secs: u64,
    /// How often long waits re-check the enabled flag.
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,
    /// Capacity of the pool actor's command channel.
    #[serde(default = "default_ingest_capacity")]
    pub ingest_capacity: usize,
    /// Consecutive failed observations before a candidate is dropped.
    #[serde(default = "default_failure_windows")]
    pub failure_windows: usize,
    /// Stop the round after this many cycles. Unset = run while enabled.
    #[serde(default)]
    pub max_cycles: Option<u32>,
    /// Stop the tight loop after this many passes. Unset = run while enabled.
    #[serde(default)]
    pub tight_loop_passes: Option<u32>,
    #[serde(default)]
    pub selection: SelectionPolicy,
    #[serde(default)]
    pub health: HealthThresholds,
}

/// Longest single wait a config may ask for (one day).
const MAX_WAIT_SECS: u64 = 86_400;

fn default_cadence() -> TriggerCadence { TriggerCadence::TopOfHour }
fn default_settle_secs() -> u64 { 10 }
fn default_sample_secs() -> u64 { 60 }
fn default_poll_interval_millis() -> u64 { 500 }
fn default_ingest_capacity() -> usize { 1024 }
fn default_failure_windows() -> usize { 3 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            start_enabled: false,
            cadence: default_cadence(),
            settle_secs: default_settle_secs(),
            sample_secs: default_sample_secs(),
            poll_interval_millis: default_poll_interval_millis(),
            ingest_capacity: default_ingest_capacity(),
            failure_windows: default_failure_windows(),
            max_cycles: None,
            tight_loop_passes: None,
            selection: SelectionPolicy::default(),
            health: HealthThresholds::default(),
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| SchedulerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Reject settings the round cannot run with.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let fail = |msg: &str| Err(SchedulerError::Config(msg.to_string()));
        if !(1..=MAX_WAIT_SECS).contains(&self.sample_secs) {
            return fail("sample_secs must be between 1 and 86400");
        }
        if !(1..=MAX_WAIT_SECS).contains(&self.settle_secs) {
            return fail("settle_secs must be between 1 and 86400");
        }
        if self.poll_interval_millis == 0 || self.poll_interval_millis > MAX_WAIT_SECS * 1000 {
            return fail("poll_interval_millis must be between 1 and 86400000");
        }
        if self.ingest_capacity == 0 {
            return fail("ingest_capacity must be greater than zero");
        }
        if self.failure_windows == 0 {
            return fail("failure_windows must be at least 1");
        }
        if !(1..=10).contains(&self.health.loop_cap) {
            return fail("health.loop_cap must be between 1 and 10");
        }
        if self.selection.delay_bound_ms <= 0 || self.health.delay_bound_ms <= 0 {
            return fail("delay bounds must be positive");
        }
        if self.max_cycles == Some(0) || self.tight_loop_passes == Some(0) {
            return fail("max_cycles and tight_loop_passes must be unset or positive");
        }
        Ok(())
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn sample(&self) -> Duration {
        Duration::from_secs(self.sample_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }
}

/// Format a duration as `HH:MM:SS`. Hours do not wrap.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert!(!config.start_enabled);
        assert_eq!(config.cadence, TriggerCadence::TopOfHour);
        assert_eq!(config.settle(), Duration::from_secs(10));
        assert_eq!(config.sample(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.failure_windows, 3);
        assert_eq!(config.health.min_pool_size, 20);
        assert_eq!(config.health.min_good_count, 5);
        assert_eq!(config.health.loop_cap, 10);
        assert!(config.max_cycles.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SchedulerConfig::from_toml(
            r#"
            start_enabled = true
            cadence = "even_hour"
            failure_windows = 2

            [health]
            min_pool_size = 8
            "#,
        )
        .unwrap();
        assert!(config.start_enabled);
        assert_eq!(config.cadence, TriggerCadence::EvenHour);
        assert_eq!(config.failure_windows, 2);
        assert_eq!(config.health.min_pool_size, 8);
        assert_eq!(config.health.min_good_count, 5);
        assert_eq!(config.selection.throughput_tiers, vec![30.0, 10.0, 5.0, 1.0]);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(SchedulerConfig::from_toml("sample_secs = 0").is_err());
        assert!(SchedulerConfig::from_toml("max_cycles = 0").is_err());
        assert!(SchedulerConfig::from_toml("[health]\nloop_cap = 11").is_err());
        assert!(SchedulerConfig::from_toml("cadence = \"weekly\"").is_err());
    }

    #[test]
    fn wait_lengths_are_bounded() {
        assert!(SchedulerConfig::from_toml("settle_secs = 0").is_err());
        assert!(SchedulerConfig::from_toml("settle_secs = 86401").is_err());
        assert!(SchedulerConfig::from_toml("sample_secs = 18446744073709551615").is_err());
        assert!(SchedulerConfig::from_toml("poll_interval_millis = 0").is_err());

        let err = SchedulerConfig {
            sample_secs: u64::MAX,
            ..SchedulerConfig::default()
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("sample_secs"));

        let longest = SchedulerConfig {
            settle_secs: 86_400,
            sample_secs: 86_400,
            ..SchedulerConfig::default()
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.toml");
        std::fs::write(&path, "settle_secs = 3\n").unwrap();
        let config = SchedulerConfig::from_file(&path).unwrap();
        assert_eq!(config.settle_secs, 3);
        assert!(SchedulerConfig::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn hms_formatting() {
        assert_eq!(format_hms(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_hms(Duration::from_secs(3723)), "01:02:03");
        assert_eq!(format_hms(Duration::from_secs(100 * 3600)), "100:00:00");
    }
}
