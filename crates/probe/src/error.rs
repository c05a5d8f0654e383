use autoproxy_engine::SchedulerError;

/// Errors raised while probing candidates or fetching candidate lists.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Unsupported proxy scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ProbeError> for SchedulerError {
    fn from(e: ProbeError) -> Self {
        match e {
            ProbeError::Config(msg) => SchedulerError::Config(msg),
            other => SchedulerError::Source(other.to_string()),
        }
    }
}
