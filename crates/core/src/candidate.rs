use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CoreError;
use crate::reading::Reading;

/// Stable identity of a candidate endpoint. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateKey(String);

impl CandidateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a key from the canonical address line: first 16 hex chars of its SHA-256.
    pub fn derive(canonical: &str) -> Self {
        let digest = Sha256::digest(canonical.as_bytes());
        let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        Self(hex)
    }
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which measurements a probe pass collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Latency only.
    Delay,
    /// Throughput only.
    Throughput,
    /// Latency, then throughput.
    Combined,
}

impl ProbeKind {
    pub fn measures_delay(self) -> bool {
        matches!(self, ProbeKind::Delay | ProbeKind::Combined)
    }

    pub fn measures_throughput(self) -> bool {
        matches!(self, ProbeKind::Throughput | ProbeKind::Combined)
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Delay => write!(f, "delay"),
            ProbeKind::Throughput => write!(f, "throughput"),
            ProbeKind::Combined => write!(f, "combined"),
        }
    }
}

/// One proxy server under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub key: CandidateKey,
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Free-text display label, may carry region hints ("US", "美国").
    pub label: String,
    /// Display ordinal, rewritten to the position after sorts and removals.
    pub sort_key: u64,
    #[serde(default)]
    pub delay: Reading<i64>,
    #[serde(default)]
    pub throughput: Reading<f64>,
}

impl Candidate {
    /// Build a candidate whose key is derived from its address and label.
    pub fn new(scheme: &str, host: &str, port: u16, label: &str) -> Self {
        let mut candidate = Self {
            key: CandidateKey::new(String::new()),
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_string(),
            port,
            label: label.to_string(),
            sort_key: 0,
            delay: Reading::Untested,
            throughput: Reading::Untested,
        };
        candidate.key = CandidateKey::derive(&candidate.canonical());
        candidate
    }

    /// Same as [`Candidate::new`] with an explicit key.
    pub fn with_key(key: impl Into<CandidateKey>, host: &str, port: u16, label: &str) -> Self {
        let mut candidate = Self::new("tcp", host, port, label);
        candidate.key = key.into();
        candidate
    }

    /// Parse `[scheme://]host:port[#label]`. IPv6 hosts go in brackets.
    pub fn parse_line(line: &str) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidCandidate {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty line"));
        }

        let (address, label) = match trimmed.split_once('#') {
            Some((addr, label)) => (addr.trim(), label.trim()),
            None => (trimmed, ""),
        };

        let (scheme, rest) = match address.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() => (scheme, rest),
            Some(_) => return Err(invalid("empty scheme")),
            None => ("tcp", address),
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = if let Some(stripped) = rest.strip_prefix('[') {
            let (host, tail) = stripped
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 bracket"))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| invalid("missing port"))?;
            (host, port)
        } else {
            rest.rsplit_once(':').ok_or_else(|| invalid("missing port"))?
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
        if port == 0 {
            return Err(invalid("port must be non-zero"));
        }

        Ok(Self::new(scheme, host, port, label))
    }

    /// `scheme://host:port#label`, the input to key derivation.
    pub fn canonical(&self) -> String {
        format!("{}://{}#{}", self.scheme, self.address(), self.label)
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Measured latency in ms, if any (may be non-positive = failed).
    pub fn delay_ms(&self) -> Option<i64> {
        self.delay.value()
    }

    /// Measured throughput; anything unmeasured counts as 0 for ranking.
    pub fn throughput_value(&self) -> f64 {
        self.throughput.value().unwrap_or(0.0)
    }

    pub fn delay_label(&self) -> String {
        self.delay.to_string()
    }

    pub fn throughput_label(&self) -> String {
        self.throughput.to_string()
    }

    /// Latency strictly inside `(0, bound_ms)`.
    pub fn delay_within(&self, bound_ms: i64) -> bool {
        matches!(self.delay_ms(), Some(ms) if ms > 0 && ms < bound_ms)
    }
}

/// Serializable row for presentation: a candidate plus its active flag and labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateView {
    pub key: CandidateKey,
    pub address: String,
    pub label: String,
    pub sort_key: u64,
    pub delay: String,
    pub throughput: String,
    pub is_active: bool,
}

impl CandidateView {
    pub fn new(candidate: &Candidate, is_active: bool) -> Self {
        Self {
            key: candidate.key.clone(),
            address: candidate.address(),
            label: candidate.label.clone(),
            sort_key: candidate.sort_key,
            delay: candidate.delay_label(),
            throughput: candidate.throughput_label(),
            is_active,
        }
    }
}

/// One probe result for one candidate. Fields left `None` are not touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub key: CandidateKey,
    pub delay: Option<Reading<i64>>,
    pub throughput: Option<Reading<f64>>,
}

impl ProbeReport {
    pub fn delay(key: CandidateKey, reading: Reading<i64>) -> Self {
        Self {
            key,
            delay: Some(reading),
            throughput: None,
        }
    }

    pub fn throughput(key: CandidateKey, reading: Reading<f64>) -> Self {
        Self {
            key,
            delay: None,
            throughput: Some(reading),
        }
    }
}
