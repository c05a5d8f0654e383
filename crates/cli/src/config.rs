use anyhow::{Context, Result};
use autoproxy_engine::SchedulerConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Return the default config directory path: ~/.config/autoproxy/
pub fn default_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("could not determine user config directory")?
        .join("autoproxy");
    Ok(config_dir)
}

/// Return the default config file path.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(default_config_dir()?.join("config.toml"))
}

/// Load scheduler config from the given path, or the default path.
///
/// A missing file yields the defaults, which are written out so the operator
/// has something to edit. An unreadable or invalid file is an error.
pub fn load(path: Option<&Path>) -> Result<SchedulerConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if config_path.exists() {
        debug!(?config_path, "Loading config");
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config: {}", config_path.display()))?;
        let config = SchedulerConfig::from_toml(&content)
            .with_context(|| format!("failed to parse config: {}", config_path.display()))?;
        Ok(config)
    } else {
        debug!(?config_path, "Config file not found, using defaults");
        let config = SchedulerConfig::default();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let toml_str =
            toml::to_string_pretty(&config).context("failed to serialize default config")?;
        std::fs::write(&config_path, toml_str).ok();
        Ok(config)
    }
}

/// `--once` runs exactly one cycle with at most one tight-loop pass.
pub fn apply_once(config: &mut SchedulerConfig) {
    config.start_enabled = true;
    config.max_cycles = Some(1);
    config.tight_loop_passes.get_or_insert(1);
}
