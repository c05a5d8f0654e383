use std::path::PathBuf;

use autoproxy_core::config::SourceConfig;
use clap::Parser;

/// Adaptive proxy endpoint scheduler.
///
/// Probes candidate endpoints on a wall-clock cadence, drops the ones that
/// keep failing and keeps the best one active.
#[derive(Parser, Debug)]
#[command(name = "autoproxy", about = "Adaptive proxy endpoint scheduler")]
pub struct CliArgs {
    /// Path to the scheduler config file (default: ~/.config/autoproxy/config.toml)
    #[arg(long, env = "AUTOPROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable automatic rounds at startup, overriding `start_enabled`
    #[arg(long)]
    pub enable: bool,

    /// Trigger a round right away instead of waiting for the timer
    #[arg(long)]
    pub now: bool,

    /// Run a single round cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Local candidate list, overrides AUTOPROXY_LIST_FILE
    #[arg(long)]
    pub source_file: Option<PathBuf>,

    /// Subscription URL, repeatable; overrides AUTOPROXY_SUBSCRIPTION_URLS
    #[arg(long = "source-url")]
    pub source_urls: Vec<String>,

    /// Write the active candidate here as JSON whenever it changes
    #[arg(long, env = "AUTOPROXY_ACTIVE_FILE")]
    pub active_file: Option<PathBuf>,
}

impl CliArgs {
    /// Command-line sources replace whatever the environment configured.
    pub fn apply_source_overrides(&self, source: &mut SourceConfig) {
        if !self.source_urls.is_empty() {
            source.subscription_urls = self.source_urls.clone();
            source.list_file = None;
        }
        if let Some(path) = &self.source_file {
            source.list_file = Some(path.clone());
            if self.source_urls.is_empty() {
                source.subscription_urls.clear();
            }
        }
    }
}
