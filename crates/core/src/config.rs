use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Comma-separated list, empty entries dropped.
fn profiled_env_list(profile: &str, key: &str) -> Vec<String> {
    profiled_env_opt(profile, key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

// ── Top-level config ──────────────────────────────────────────

/// Environment-driven settings for the collaborators around the scheduler.
///
/// Scheduling policy itself lives in the engine's `SchedulerConfig` (TOML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub source: SourceConfig,
    pub probe: ProbeConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `AUTOPROXY_PROFILE`. When set (e.g. `HOME`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("AUTOPROXY_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            source: SourceConfig::from_env_profiled(p),
            probe: ProbeConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  source:  urls={}, file={}, timeout={}s",
            self.source.subscription_urls.len(),
            self.source
                .list_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string()),
            self.source.fetch_timeout_secs
        );
        tracing::info!(
            "  probe:   connect_timeout={}ms, concurrency={}, throughput_url={}",
            self.probe.connect_timeout_millis,
            self.probe.concurrency,
            self.probe.throughput_url
        );
    }
}

// ── Candidate source ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Subscription URLs returning one candidate per line.
    pub subscription_urls: Vec<String>,
    /// Local candidate list, used when no URLs are configured.
    pub list_file: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
}

impl SourceConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            subscription_urls: profiled_env_list(p, "AUTOPROXY_SUBSCRIPTION_URLS"),
            list_file: profiled_env_opt(p, "AUTOPROXY_LIST_FILE").map(PathBuf::from),
            fetch_timeout_secs: profiled_env_u64(p, "AUTOPROXY_FETCH_TIMEOUT_SECS", 30),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.subscription_urls.is_empty() || self.list_file.is_some()
    }
}

// ── Probe runner ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub connect_timeout_millis: u64,
    /// Maximum candidates probed at once.
    pub concurrency: usize,
    /// URL downloaded through each candidate to measure throughput.
    pub throughput_url: String,
    pub download_timeout_secs: u64,
    /// Stop reading after this many bytes.
    pub download_limit_bytes: u64,
}

impl ProbeConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            connect_timeout_millis: profiled_env_u64(p, "AUTOPROXY_CONNECT_TIMEOUT_MS", 3000),
            concurrency: profiled_env_usize(p, "AUTOPROXY_PROBE_CONCURRENCY", 8).max(1),
            throughput_url: profiled_env_or(
                p,
                "AUTOPROXY_THROUGHPUT_URL",
                "http://speed.cloudflare.com/__down?bytes=10000000",
            ),
            download_timeout_secs: profiled_env_u64(p, "AUTOPROXY_DOWNLOAD_TIMEOUT_SECS", 10),
            download_limit_bytes: profiled_env_u64(p, "AUTOPROXY_DOWNLOAD_LIMIT_BYTES", 10_000_000),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::from_env_profiled("")
    }
}
