use std::str::FromStr;

use chrono::{NaiveTime, Utc};
use chrono_tz::Tz;
use resources::objects::policy::{Schedule, TimeWindow, Weekday};
use tokio::time::{interval, Interval};

/// Drives one reconciliation tick per `resizeInterval` (spec.md §4.1). Ticks
/// are produced by a plain `tokio::time::interval`; cancellation is the
/// caller's concern (the reconciler stops awaiting `tick()` and lets any
/// in-flight apply finish, per spec.md §5 "on cancellation... in-flight
/// calls are awaited but not rolled back").
pub struct Clock {
    ticker: Interval,
}

impl Clock {
    pub fn new(period_seconds: u64) -> Self {
        Clock {
            ticker: interval(std::time::Duration::from_secs(period_seconds.max(1))),
        }
    }

    pub async fn tick(&mut self) {
        self.ticker.tick().await;
    }
}

/// Whether a policy's schedule currently admits reconciliation. `interval`
/// on the policy only affects *cadence*, never eligibility, so it plays no
/// part here — only `cron`/`timeWindows` gate whether the policy applies
/// this tick (spec.md §9 open question, resolved: interval drives the tick,
/// cron/timeWindows are eligibility filters layered on top).
pub fn is_schedule_active(schedule: &Schedule) -> bool {
    if schedule.time_windows.is_empty() && schedule.cron.is_none() {
        return true;
    }
    let now_matches_windows = schedule.time_windows.is_empty()
        || schedule.time_windows.iter().any(window_is_active_now);
    let now_matches_cron = match &schedule.cron {
        Some(expr) => cron_matches_now(expr),
        None => true,
    };
    now_matches_windows && now_matches_cron
}

fn window_is_active_now(window: &TimeWindow) -> bool {
    let tz: Tz = match window.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = %window.timezone, "unrecognized schedule timezone, treating window as inactive");
            return false;
        },
    };
    let now = Utc::now().with_timezone(&tz);
    let weekday: Weekday = now.weekday().into();
    if !window.days.contains(&weekday) {
        return false;
    }
    let t = now.time();
    time_in_range(t, window.start, window.end)
}

fn time_in_range(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        t >= start && t < end
    } else {
        // window wraps past midnight
        t >= start || t < end
    }
}

fn cron_matches_now(expr: &str) -> bool {
    match cron::Schedule::from_str(expr) {
        Ok(schedule) => {
            let now = Utc::now();
            // A cron schedule "matches now" if the previous scheduled fire
            // time is within the last minute, since cron granularity is
            // one minute and ticks run far more often than that.
            schedule
                .after(&(now - chrono::Duration::minutes(1)))
                .take(1)
                .any(|fire| fire <= now)
        },
        Err(e) => {
            tracing::warn!(cron = %expr, error = %e, "invalid cron expression, treating window as inactive");
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_schedule_is_always_active() {
        assert!(is_schedule_active(&Schedule::default()));
    }

    #[test]
    fn time_in_range_handles_midnight_wrap() {
        let start = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        assert!(time_in_range(NaiveTime::from_hms_opt(23, 0, 0).unwrap(), start, end));
        assert!(time_in_range(NaiveTime::from_hms_opt(1, 0, 0).unwrap(), start, end));
        assert!(!time_in_range(NaiveTime::from_hms_opt(12, 0, 0).unwrap(), start, end));
    }
}
