use std::fmt;

use serde::{Deserialize, Serialize};

/// State of one measurement field on a candidate.
///
/// Probe runners report readings; the pool stores the latest one per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Reading<T> {
    /// Never measured (blank in the display).
    #[default]
    Untested,
    /// A probe for this field is in flight.
    Pending,
    /// A measured value. For delays, values `<= 0` mean the probe failed.
    Measured(T),
    /// The probe ran and failed; carries the runner's message.
    Failed(String),
    /// The runner declined to measure this field.
    Skipped,
}

impl<T: Copy> Reading<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Reading::Measured(v) => Some(*v),
            _ => None,
        }
    }
}

impl<T> Reading<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Reading::Pending)
    }

    pub fn is_untested(&self) -> bool {
        matches!(self, Reading::Untested)
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, Reading::Measured(_))
    }
}

impl fmt::Display for Reading<i64> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Untested => Ok(()),
            Reading::Pending => write!(f, "testing"),
            Reading::Measured(ms) => write!(f, "{ms}"),
            Reading::Failed(msg) => write!(f, "{msg}"),
            Reading::Skipped => write!(f, "skipped"),
        }
    }
}

impl fmt::Display for Reading<f64> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Untested => Ok(()),
            Reading::Pending => write!(f, "waiting"),
            Reading::Measured(mbps) => write!(f, "{mbps:.2}"),
            Reading::Failed(msg) => write!(f, "{msg}"),
            Reading::Skipped => write!(f, "skipped"),
        }
    }
}
