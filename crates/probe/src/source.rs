use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use autoproxy_core::config::SourceConfig;
use autoproxy_core::{Candidate, CoreError};
use autoproxy_engine::{CandidateSource, SchedulerError};
use tracing::{debug, info, warn};

use crate::error::ProbeError;

/// Parse a candidate list, one `[scheme://]host:port[#label]` per line.
///
/// Blank lines and `#` comments are skipped. Lines that fail to parse are
/// returned alongside the candidates rather than aborting the whole list.
pub fn parse_list(text: &str) -> (Vec<Candidate>, Vec<CoreError>) {
    let mut candidates = Vec::new();
    let mut errors = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Candidate::parse_line(line) {
            Ok(c) => candidates.push(c),
            Err(e) => errors.push(e),
        }
    }
    (candidates, errors)
}

fn log_rejects(origin: &str, errors: &[CoreError]) {
    if errors.is_empty() {
        return;
    }
    warn!(origin, rejected = errors.len(), "skipped unparseable candidate lines");
    for e in errors {
        debug!(origin, "{}", e);
    }
}

// ── Subscription URLs ─────────────────────────────────────────

/// Fetches every subscription URL and concatenates what they return.
pub struct HttpListSource {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl HttpListSource {
    pub fn new(urls: Vec<String>, fetch_timeout: Duration) -> Result<Self, ProbeError> {
        if urls.is_empty() {
            return Err(ProbeError::Config("no subscription URLs configured".into()));
        }
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self { client, urls })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, ProbeError> {
        Self::new(
            config.subscription_urls.clone(),
            Duration::from_secs(config.fetch_timeout_secs),
        )
    }

    async fn fetch(&self, url: &str) -> Result<String, ProbeError> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl CandidateSource for HttpListSource {
    fn name(&self) -> &str {
        "subscription"
    }

    async fn refresh_all(&self) -> Result<Vec<Candidate>, SchedulerError> {
        let mut all = Vec::new();
        let mut failures = Vec::new();

        for url in &self.urls {
            match self.fetch(url).await {
                Ok(body) => {
                    let (candidates, errors) = parse_list(&body);
                    log_rejects(url, &errors);
                    info!(url = %url, count = candidates.len(), "fetched subscription");
                    all.extend(candidates);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "subscription fetch failed");
                    failures.push(format!("{url}: {e}"));
                }
            }
        }

        if failures.len() == self.urls.len() {
            return Err(SchedulerError::Source(failures.join("; ")));
        }
        Ok(all)
    }
}

// ── Local file ────────────────────────────────────────────────

/// Re-reads a local candidate list on every refresh.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn refresh_all(&self) -> Result<Vec<Candidate>, SchedulerError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SchedulerError::Source(format!("reading {}: {}", self.path.display(), e))
        })?;
        let (candidates, errors) = parse_list(&text);
        log_rejects(&self.path.display().to_string(), &errors);
        Ok(candidates)
    }
}
