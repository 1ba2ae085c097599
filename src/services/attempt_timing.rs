use time::PrimitiveDateTime;

use crate::core::time::seconds_between;
use crate::db::types::AttemptStatus;

/// Wall-clock seconds accrued since the clock was last started. The clock
/// reference is reset on resume, so this is only meaningful while the
/// attempt is in progress.
pub(crate) fn accrued_seconds(
    started_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> i64 {
    started_at.map(|started| seconds_between(started, now)).unwrap_or(0)
}

/// Cumulative time spent after folding in the running clock. Pause and
/// submit both finalize through this; a paused clock contributes nothing.
pub(crate) fn finalized_time_spent(
    status: AttemptStatus,
    time_spent: i32,
    started_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> i32 {
    match status {
        AttemptStatus::InProgress => {
            let elapsed = accrued_seconds(started_at, now);
            time_spent.saturating_add(elapsed.min(i32::MAX as i64) as i32)
        }
        _ => time_spent,
    }
}

/// `remaining = max(0, duration − elapsed − time_spent)`. Zero while the
/// attempt is in progress means the attempt must be timed out by the
/// caller; terminal attempts always report zero.
pub(crate) fn remaining_seconds(
    status: AttemptStatus,
    duration_minutes: i32,
    time_spent: i32,
    started_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> i64 {
    let duration = i64::from(duration_minutes) * 60;
    match status {
        AttemptStatus::InProgress => {
            let elapsed = accrued_seconds(started_at, now);
            (duration - elapsed - i64::from(time_spent)).max(0)
        }
        AttemptStatus::Paused => (duration - i64::from(time_spent)).max(0),
        _ => 0,
    }
}

/// Advisory flag only: hitting the warning limit never transitions the
/// attempt, the caller decides whether to force a submit.
pub(crate) fn should_auto_submit(cheating_warnings: i32, max_cheating_warnings: i32) -> bool {
    cheating_warnings >= max_cheating_warnings
}

pub(crate) fn remaining_warnings(cheating_warnings: i32, max_cheating_warnings: i32) -> i32 {
    (max_cheating_warnings - cheating_warnings).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Time};

    fn at(hour: u8, minute: u8, second: u8) -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, time::Month::March, 10).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(hour, minute, second).unwrap())
    }

    #[test]
    fn pause_folds_running_clock_into_time_spent() {
        let spent = finalized_time_spent(AttemptStatus::InProgress, 120, Some(at(10, 0, 0)), at(10, 5, 0));
        assert_eq!(spent, 120 + 300);
    }

    #[test]
    fn paused_clock_contributes_nothing_on_submit() {
        let spent = finalized_time_spent(AttemptStatus::Paused, 420, Some(at(10, 0, 0)), at(11, 0, 0));
        assert_eq!(spent, 420);
    }

    #[test]
    fn pause_resume_submit_accumulates_only_running_intervals() {
        // 10:00 start, 10:04 pause, 10:30 resume, 10:41 submit.
        let after_pause =
            finalized_time_spent(AttemptStatus::InProgress, 0, Some(at(10, 0, 0)), at(10, 4, 0));
        assert_eq!(after_pause, 240);

        // Resume resets the clock reference to 10:30.
        let total =
            finalized_time_spent(AttemptStatus::InProgress, after_pause, Some(at(10, 30, 0)), at(10, 41, 0));
        assert_eq!(total, 240 + 660);
    }

    #[test]
    fn remaining_counts_elapsed_and_accumulated_time() {
        // 60 minute exam, 10 minutes already banked, clock running 5 minutes.
        let remaining = remaining_seconds(
            AttemptStatus::InProgress,
            60,
            600,
            Some(at(9, 0, 0)),
            at(9, 5, 0),
        );
        assert_eq!(remaining, 60 * 60 - 600 - 300);
    }

    #[test]
    fn remaining_clamps_at_zero_when_overrun() {
        let remaining = remaining_seconds(
            AttemptStatus::InProgress,
            30,
            25 * 60,
            Some(at(9, 0, 0)),
            at(9, 10, 0),
        );
        assert_eq!(remaining, 0);
    }

    #[test]
    fn remaining_is_zero_for_terminal_attempts() {
        assert_eq!(remaining_seconds(AttemptStatus::Submitted, 60, 0, None, at(9, 0, 0)), 0);
        assert_eq!(remaining_seconds(AttemptStatus::TimedOut, 60, 0, None, at(9, 0, 0)), 0);
    }

    #[test]
    fn paused_attempt_does_not_accrue_elapsed() {
        let remaining =
            remaining_seconds(AttemptStatus::Paused, 60, 600, Some(at(8, 0, 0)), at(9, 0, 0));
        assert_eq!(remaining, 60 * 60 - 600);
    }

    #[test]
    fn warning_threshold_flags_auto_submit_exactly_at_max() {
        assert!(!should_auto_submit(2, 3));
        assert!(should_auto_submit(3, 3));
        assert!(should_auto_submit(4, 3));
        assert_eq!(remaining_warnings(2, 3), 1);
        assert_eq!(remaining_warnings(5, 3), 0);
    }
}
