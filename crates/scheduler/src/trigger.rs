//! Trigger validation and next-run arithmetic.

use chrono::{DateTime, Duration, Utc};
use deskhand_core::error::SchedulerError;
use deskhand_core::schedule::Trigger;

use crate::cron::CronExpr;

/// Validate `trigger` and return its first firing time.
///
/// Past dates, zero intervals and cron expressions that do not parse (or
/// never fire) are rejected.
pub fn first_run(trigger: &Trigger, now: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
    match trigger {
        Trigger::Date { run_at } => {
            if *run_at <= now {
                return Err(SchedulerError::InvalidTrigger(format!(
                    "run date {} is in the past",
                    run_at.to_rfc3339()
                )));
            }
            Ok(*run_at)
        }
        Trigger::Interval { seconds } => {
            if *seconds == 0 {
                return Err(SchedulerError::InvalidTrigger(
                    "interval must be greater than 0 seconds".into(),
                ));
            }
            interval_after(*seconds, now)
        }
        Trigger::Cron { expression } => {
            let expr = CronExpr::parse(expression)
                .map_err(|e| SchedulerError::InvalidTrigger(format!("cron '{expression}': {e}")))?;
            expr.next_after(&now).ok_or_else(|| {
                SchedulerError::InvalidTrigger(format!("cron '{expression}' never fires"))
            })
        }
    }
}

/// When a recurring trigger fires next after firing at `fired_at`.
/// `None` for one-off triggers.
pub fn next_run(trigger: &Trigger, fired_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match trigger {
        Trigger::Date { .. } => None,
        Trigger::Interval { seconds } => interval_after(*seconds, fired_at).ok(),
        Trigger::Cron { expression } => CronExpr::parse(expression).ok()?.next_after(&fired_at),
    }
}

fn interval_after(seconds: u64, from: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|d| from.checked_add_signed(d))
        .ok_or_else(|| SchedulerError::InvalidTrigger(format!("interval of {seconds}s is too large")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn date_must_be_in_future() {
        let past = Trigger::Date { run_at: noon() - Duration::minutes(1) };
        assert!(matches!(first_run(&past, noon()), Err(SchedulerError::InvalidTrigger(_))));

        let future = Trigger::Date { run_at: noon() + Duration::hours(2) };
        assert_eq!(first_run(&future, noon()).unwrap(), noon() + Duration::hours(2));
        assert_eq!(next_run(&future, noon()), None);
    }

    #[test]
    fn interval_arithmetic() {
        let t = Trigger::Interval { seconds: 90 };
        assert_eq!(first_run(&t, noon()).unwrap(), noon() + Duration::seconds(90));
        assert_eq!(next_run(&t, noon()), Some(noon() + Duration::seconds(90)));
        assert!(first_run(&Trigger::Interval { seconds: 0 }, noon()).is_err());
        assert!(first_run(&Trigger::Interval { seconds: u64::MAX }, noon()).is_err());
    }

    #[test]
    fn cron_validation() {
        let t = Trigger::Cron { expression: "0 13 * * *".into() };
        assert_eq!(
            first_run(&t, noon()).unwrap(),
            Utc.with_ymd_and_hms(2026, 4, 1, 13, 0, 0).unwrap()
        );
        let bad = Trigger::Cron { expression: "every tuesday".into() };
        assert!(first_run(&bad, noon()).is_err());
        let never = Trigger::Cron { expression: "0 0 30 2 *".into() };
        assert!(first_run(&never, noon()).unwrap_err().to_string().contains("never fires"));
    }
}
