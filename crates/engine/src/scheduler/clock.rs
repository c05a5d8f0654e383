use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// Wall-clock boundary on which the timer trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCadence {
    EveryMinute,
    TopOfHour,
    /// 00:00, 02:00, 04:00, ...
    EvenHour,
}

impl TriggerCadence {
    /// First boundary strictly after `now`.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let minute = now.with_nanosecond(0)?.with_second(0)?;
        match self {
            TriggerCadence::EveryMinute => Some(minute + ChronoDuration::minutes(1)),
            TriggerCadence::TopOfHour => Some(minute.with_minute(0)? + ChronoDuration::hours(1)),
            TriggerCadence::EvenHour => {
                let next = minute.with_minute(0)? + ChronoDuration::hours(1);
                if next.hour() % 2 == 1 {
                    Some(next + ChronoDuration::hours(1))
                } else {
                    Some(next)
                }
            }
        }
    }

    /// Time left until the next boundary.
    pub fn until_next<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Duration {
        self.next_after(now)
            .and_then(|next| (next - now.clone()).to_std().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, h, m, s).unwrap()
    }

    #[test]
    fn every_minute() {
        let next = TriggerCadence::EveryMinute.next_after(&at(10, 15, 42)).unwrap();
        assert_eq!(next, at(10, 16, 0));
        let next = TriggerCadence::EveryMinute.next_after(&at(10, 16, 0)).unwrap();
        assert_eq!(next, at(10, 17, 0));
    }

    #[test]
    fn top_of_hour() {
        assert_eq!(
            TriggerCadence::TopOfHour.next_after(&at(10, 0, 0)).unwrap(),
            at(11, 0, 0)
        );
        assert_eq!(
            TriggerCadence::TopOfHour.next_after(&at(23, 59, 59)).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn even_hour_skips_odd() {
        assert_eq!(
            TriggerCadence::EvenHour.next_after(&at(10, 5, 0)).unwrap(),
            at(12, 0, 0)
        );
        assert_eq!(
            TriggerCadence::EvenHour.next_after(&at(11, 5, 0)).unwrap(),
            at(12, 0, 0)
        );
    }

    #[test]
    fn countdown() {
        let left = TriggerCadence::TopOfHour.until_next(&at(10, 59, 30));
        assert_eq!(left, Duration::from_secs(30));
    }
}
