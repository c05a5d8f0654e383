use std::path::PathBuf;

use async_trait::async_trait;
use autoproxy_core::Candidate;
use autoproxy_engine::{EndpointActivator, SchedulerError};
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

/// Publishes the active candidate for whatever routes traffic.
///
/// With a path the candidate is written there as JSON (via a temp file and
/// rename, so readers never see a half-written file). Without one it is only
/// logged.
pub struct FileActivator {
    path: Option<PathBuf>,
}

#[derive(Serialize)]
struct ActiveRecord<'a> {
    activated_at: DateTime<Local>,
    key: &'a str,
    scheme: &'a str,
    address: String,
    label: &'a str,
    delay: String,
    throughput: String,
}

impl FileActivator {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl EndpointActivator for FileActivator {
    async fn activate(&self, candidate: &Candidate) -> Result<(), SchedulerError> {
        info!(
            key = %candidate.key,
            address = %candidate.address(),
            label = %candidate.label,
            "active endpoint"
        );
        let Some(path) = &self.path else {
            return Ok(());
        };

        let record = ActiveRecord {
            activated_at: Local::now(),
            key: candidate.key.as_str(),
            scheme: &candidate.scheme,
            address: candidate.address(),
            label: &candidate.label,
            delay: candidate.delay_label(),
            throughput: candidate.throughput_label(),
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| SchedulerError::Activation(e.to_string()))?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_active_candidate_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("active.json");
        let activator = FileActivator::new(Some(path.clone()));

        let candidate = Candidate::parse_line("http://10.0.0.7:8080#US 7").unwrap();
        activator.activate(&candidate).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["address"], "10.0.0.7:8080");
        assert_eq!(written["label"], "US 7");
        assert_eq!(written["key"], candidate.key.as_str());
        assert!(!dir.path().join("active.tmp").exists());
    }

    #[tokio::test]
    async fn without_path_only_logs() {
        let activator = FileActivator::new(None);
        let candidate = Candidate::parse_line("10.0.0.7:443").unwrap();
        assert!(activator.activate(&candidate).await.is_ok());
    }
}
