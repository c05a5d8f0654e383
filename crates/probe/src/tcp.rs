//! Probe runner measuring TCP connect latency and HTTP download throughput.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autoproxy_core::config::ProbeConfig;
use autoproxy_core::{Candidate, ProbeKind, ProbeReport, Reading};
use autoproxy_engine::{ProbeRunner, ResultSink, SchedulerError};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::ProbeError;

/// Latency is the time to open a TCP connection to the candidate.
/// Throughput is a bounded download of `throughput_url` using the candidate
/// as an HTTP proxy.
pub struct TcpProbeRunner {
    config: Arc<ProbeConfig>,
    /// The pass currently running. Aborting it aborts every probe it spawned.
    current: Mutex<Option<JoinHandle<()>>>,
}

impl TcpProbeRunner {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config: Arc::new(config),
            current: Mutex::new(None),
        }
    }

    fn replace_current(&self, next: Option<JoinHandle<()>>) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = current.take() {
            previous.abort();
        }
        *current = next;
    }
}

#[async_trait]
impl ProbeRunner for TcpProbeRunner {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn start(
        &self,
        kind: ProbeKind,
        targets: Vec<Candidate>,
        sink: ResultSink,
    ) -> Result<(), SchedulerError> {
        let config = Arc::clone(&self.config);
        debug!(%kind, targets = targets.len(), "starting tcp probe pass");
        let pass = tokio::spawn(run_pass(config, kind, targets, sink));
        self.replace_current(Some(pass));
        Ok(())
    }

    async fn stop(&self) {
        self.replace_current(None);
    }
}

async fn run_pass(config: Arc<ProbeConfig>, kind: ProbeKind, targets: Vec<Candidate>, sink: ResultSink) {
    let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut probes = JoinSet::new();

    for candidate in targets {
        let config = Arc::clone(&config);
        let permits = Arc::clone(&permits);
        let sink = sink.clone();
        probes.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            probe_one(&config, kind, &candidate, &sink).await;
        });
    }

    while probes.join_next().await.is_some() {}
    debug!(%kind, "tcp probe pass finished");
}

async fn probe_one(config: &ProbeConfig, kind: ProbeKind, candidate: &Candidate, sink: &ResultSink) {
    let mut reachable = true;
    if kind.measures_delay() {
        let delay = measure_delay(config, candidate).await;
        reachable = matches!(delay, Reading::Measured(ms) if ms > 0);
        if sink
            .send(ProbeReport::delay(candidate.key.clone(), delay))
            .await
            .is_err()
        {
            return;
        }
    }

    if kind.measures_throughput() {
        let throughput = if kind == ProbeKind::Combined && !reachable {
            Reading::Skipped
        } else {
            let _ = sink
                .send(ProbeReport::throughput(candidate.key.clone(), Reading::Pending))
                .await;
            measure_throughput(config, candidate).await
        };
        let _ = sink
            .send(ProbeReport::throughput(candidate.key.clone(), throughput))
            .await;
    }
}

/// Time to establish a TCP connection, in whole milliseconds (at least 1).
pub async fn measure_delay(config: &ProbeConfig, candidate: &Candidate) -> Reading<i64> {
    let started = Instant::now();
    let connect = TcpStream::connect((candidate.host.as_str(), candidate.port));
    match timeout(Duration::from_millis(config.connect_timeout_millis), connect).await {
        Ok(Ok(_stream)) => Reading::Measured(started.elapsed().as_millis().max(1) as i64),
        Ok(Err(e)) => {
            debug!(address = %candidate.address(), error = %e, "connect failed");
            Reading::Failed(e.kind().to_string())
        }
        Err(_) => Reading::Failed(ProbeError::Timeout(config.connect_timeout_millis).to_string()),
    }
}

/// Download throughput through the candidate, in MB/s.
pub async fn measure_throughput(config: &ProbeConfig, candidate: &Candidate) -> Reading<f64> {
    match download(config, candidate).await {
        Ok(mbps) => Reading::Measured(mbps),
        Err(e) => {
            debug!(address = %candidate.address(), error = %e, "download failed");
            Reading::Failed(e.to_string())
        }
    }
}

fn proxy_url(candidate: &Candidate) -> Result<String, ProbeError> {
    match candidate.scheme.as_str() {
        "tcp" | "http" => Ok(format!("http://{}", candidate.address())),
        "https" => Ok(format!("https://{}", candidate.address())),
        other => Err(ProbeError::UnsupportedScheme(other.to_string())),
    }
}

async fn download(config: &ProbeConfig, candidate: &Candidate) -> Result<f64, ProbeError> {
    let proxy = reqwest::Proxy::all(proxy_url(candidate)?)?;
    let window = Duration::from_secs(config.download_timeout_secs);
    let client = reqwest::Client::builder()
        .proxy(proxy)
        .connect_timeout(Duration::from_millis(config.connect_timeout_millis))
        .build()?;

    let started = Instant::now();
    let deadline = started + window;
    let mut response = timeout_at(deadline, client.get(&config.throughput_url).send())
        .await
        .map_err(|_| ProbeError::Timeout(window.as_millis() as u64))??
        .error_for_status()?;

    let mut received: u64 = 0;
    loop {
        match timeout_at(deadline, response.chunk()).await {
            Ok(Ok(Some(chunk))) => {
                received += chunk.len() as u64;
                if received >= config.download_limit_bytes {
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(e)) if received == 0 => return Err(e.into()),
            Ok(Err(e)) => {
                warn!(address = %candidate.address(), error = %e, "download cut short");
                break;
            }
            // Partial downloads still measure something.
            Err(_) if received > 0 => break,
            Err(_) => return Err(ProbeError::Timeout(window.as_millis() as u64)),
        }
    }

    let secs = started.elapsed().as_secs_f64().max(0.001);
    Ok(received as f64 / 1_000_000.0 / secs)
}
