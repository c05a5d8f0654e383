use std::time::Duration;

use autoproxy_core::CandidateView;
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use super::types::{format_hms, SchedulerStatus};

/// Number of steps in one round cycle.
pub const ROUND_STEPS: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// A status message broadcast to every listener.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub at: DateTime<Local>,
    pub level: NoticeLevel,
    pub message: String,
}

/// Single place where scheduler status is written.
///
/// Listeners either watch the latest [`SchedulerStatus`] or subscribe to
/// the stream of [`Notice`]s.
#[derive(Debug)]
pub struct StatusBoard {
    status: watch::Sender<SchedulerStatus>,
    notices: broadcast::Sender<Notice>,
}

impl StatusBoard {
    pub fn new(enabled: bool) -> Self {
        let (status, _) = watch::channel(SchedulerStatus {
            enabled,
            ..SchedulerStatus::default()
        });
        let (notices, _) = broadcast::channel(64);
        Self { status, notices }
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn current(&self) -> SchedulerStatus {
        self.status.borrow().clone()
    }

    /// Log `message`, make it the current status line and broadcast it.
    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Info => tracing::info!("{}", message),
            NoticeLevel::Warn => tracing::warn!("{}", message),
            NoticeLevel::Error => tracing::error!("{}", message),
        }
        self.status.send_modify(|s| s.message = message.clone());
        // No subscribers is fine.
        let _ = self.notices.send(Notice {
            at: Local::now(),
            level,
            message,
        });
    }

    /// Enter round step `step` and announce it.
    pub fn step(&self, step: u8, description: &str) {
        self.status.send_modify(|s| s.step = Some(step));
        self.notice(
            NoticeLevel::Info,
            format!("Step {step} of {ROUND_STEPS} : {description}"),
        );
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.status.send_modify(|s| s.enabled = enabled);
    }

    pub fn set_running(&self, running: bool) {
        self.status.send_modify(|s| {
            s.running = running;
            if !running {
                s.step = None;
            }
        });
    }

    pub fn set_last_duration(&self, duration: Duration) {
        self.status
            .send_modify(|s| s.last_duration = Some(format_hms(duration)));
    }

    /// Update the countdown. Only wakes watchers when the rendered value changes.
    pub fn set_time_to_next(&self, left: Duration) {
        let rendered = format_hms(left);
        self.status.send_if_modified(|s| {
            if s.time_to_next.as_deref() == Some(rendered.as_str()) {
                false
            } else {
                s.time_to_next = Some(rendered.clone());
                true
            }
        });
    }

    pub fn set_active(&self, active: Option<CandidateView>) {
        self.status.send_modify(|s| s.active = active);
    }
}
