use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::FutureExt;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::scheduler::clock::TriggerCadence;
use crate::scheduler::status::NoticeLevel;
use crate::scheduler::types::{
    format_hms, RoundOutcome, RoundReport, TriggerOutcome, TriggerSource,
};

use super::Scheduler;

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "round panicked".to_string()
    }
}

impl Scheduler {
    /// Start a round unless disabled or one is already running.
    ///
    /// Ignored triggers are never queued. Resolves when the started round ends.
    pub async fn trigger(&self, source: TriggerSource) -> TriggerOutcome {
        if !self.state.is_enabled() {
            self.status.notice(
                NoticeLevel::Info,
                "Auto speed test is not enabled, please enable it first",
            );
            return TriggerOutcome::Disabled;
        }

        let Some(guard) = self.state.try_begin() else {
            let message = match source {
                TriggerSource::Timer => "Timer fired while a round is still running, skipping",
                TriggerSource::Manual => "A round is already running, please wait for it to finish",
            };
            self.status.notice(NoticeLevel::Warn, message);
            self.update_metrics(|m| m.record_ignored(source));
            return TriggerOutcome::AlreadyRunning(source);
        };

        let started = Instant::now();
        let started_at = Local::now();
        self.status.set_running(true);
        self.update_metrics(|m| m.rounds_started += 1);
        self.status
            .notice(NoticeLevel::Info, format!("Auto speed test started ({source})"));

        let result = AssertUnwindSafe(self.run_round()).catch_unwind().await;
        let elapsed = started.elapsed();

        let (outcome, cycles) = match result {
            Ok(Ok(cycles)) if !self.should_continue() => (RoundOutcome::Interrupted, cycles),
            Ok(Ok(cycles)) => (RoundOutcome::Succeeded, cycles),
            Ok(Err(e)) => {
                error!("Round failed: {}", e);
                (RoundOutcome::Failed(e.to_string()), 0)
            }
            Err(payload) => {
                let message = panic_message(payload);
                error!("Round panicked: {}", message);
                (RoundOutcome::Failed(message), 0)
            }
        };

        self.update_metrics(|m| m.record_round(&outcome, elapsed));
        self.status.set_last_duration(elapsed);
        let took = format_hms(elapsed);
        match &outcome {
            RoundOutcome::Succeeded => self
                .status
                .notice(NoticeLevel::Info, format!("Auto speed test finished in {took}")),
            RoundOutcome::Interrupted => self.status.notice(
                NoticeLevel::Warn,
                format!("Auto speed test interrupted after {took}"),
            ),
            RoundOutcome::Failed(e) => self
                .status
                .notice(NoticeLevel::Error, format!("Auto speed test failed after {took}: {e}")),
        }

        drop(guard);
        self.status.set_running(false);

        TriggerOutcome::Finished(RoundReport {
            source,
            started,
            started_at,
            elapsed,
            cycles,
            outcome,
        })
    }

    /// Fire timer triggers on `cadence` boundaries until shutdown.
    ///
    /// Ticks once per second to refresh the countdown. Rounds are spawned so a
    /// long round never delays the countdown or later boundaries.
    pub async fn run_timer(self: Arc<Self>, cadence: TriggerCadence) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next = cadence.next_after(&Local::now());
        info!("Timer started ({:?})", cadence);

        while !self.is_shutting_down() {
            ticker.tick().await;
            let now = Local::now();
            match next {
                Some(at) if now >= at => {
                    debug!("Timer boundary reached at {}", at);
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        scheduler.trigger(TriggerSource::Timer).await;
                    });
                    next = cadence.next_after(&now);
                }
                None => next = cadence.next_after(&now),
                _ => {}
            }
            self.status.set_time_to_next(cadence.until_next(&now));
        }
        info!("Timer stopped");
    }
}
