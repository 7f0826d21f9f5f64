//! Alarm alignment arithmetic.
//!
//! The next wake is aligned to the next multiple of the configured interval
//! within the hour. On overflow past minute 59 the alarm wraps to minute 0 of
//! the next hour rather than carrying the true remainder. That shortens or
//! lengthens one period at the hour boundary for intervals that do not divide
//! 60, and is the inherited behavior this planner preserves.

use crate::time::CivilTime;

/// A planned RTC alarm, expressed as an absolute minute-of-hour trigger.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AlarmPlan {
    /// Minute of the hour the alarm fires at.
    pub minute_of_hour: u8,
    /// Whether the aligned minute overflowed into the next hour.
    pub wrapped: bool,
}

/// Computes the next aligned wake instant after `now`.
///
/// `interval_minutes` must be 1..=59 (enforced at the session boundary).
/// The result is strictly later than `now`: the aligned minute is always at
/// least one minute ahead, and a wrap lands on the next hour's top.
#[must_use]
pub fn next_aligned(now: &CivilTime, interval_minutes: u8) -> AlarmPlan {
    let interval = interval_minutes.max(1);
    let remainder = now.minute % interval;
    let step = if remainder == 0 {
        interval
    } else {
        interval - remainder
    };
    let candidate = now.minute + step;

    if candidate >= 60 {
        AlarmPlan {
            minute_of_hour: 0,
            wrapped: true,
        }
    } else {
        AlarmPlan {
            minute_of_hour: candidate,
            wrapped: false,
        }
    }
}

/// Whole minutes from `now` until the planned alarm fires. Always at least 1.
#[must_use]
pub fn minutes_until(now: &CivilTime, plan: &AlarmPlan) -> u32 {
    if plan.wrapped {
        u32::from(60 - now.minute)
    } else {
        u32::from(plan.minute_of_hour - now.minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_minute(minute: u8) -> CivilTime {
        CivilTime::new(2024, 6, 3, 10, minute, 0)
    }

    #[test]
    fn quarter_hour_alignment_scenarios() {
        assert_eq!(
            next_aligned(&at_minute(7), 15),
            AlarmPlan {
                minute_of_hour: 15,
                wrapped: false
            }
        );
        // Remainder 0 advances a full interval, never re-firing on the
        // current minute.
        assert_eq!(
            next_aligned(&at_minute(15), 15),
            AlarmPlan {
                minute_of_hour: 30,
                wrapped: false
            }
        );
        assert_eq!(
            next_aligned(&at_minute(50), 15),
            AlarmPlan {
                minute_of_hour: 0,
                wrapped: true
            }
        );
    }

    #[test]
    fn wrap_resets_to_top_of_hour() {
        // 10:55 with a 7-minute interval would align to minute 63; the
        // planner wraps to :00 instead of carrying the remainder to :03.
        let plan = next_aligned(&at_minute(55), 7);
        assert_eq!(plan.minute_of_hour, 0);
        assert!(plan.wrapped);
    }

    #[test]
    fn planned_wake_is_strictly_later_for_all_intervals() {
        for interval in 1..=59u8 {
            for minute in 0..60u8 {
                let now = at_minute(minute);
                let plan = next_aligned(&now, interval);
                assert!(
                    minutes_until(&now, &plan) >= 1,
                    "interval {interval} at minute {minute} did not advance"
                );
                if !plan.wrapped {
                    assert_eq!(plan.minute_of_hour % interval, 0);
                }
            }
        }
    }

    #[test]
    fn repeated_application_never_repeats_an_instant() {
        // Interval 7 does not divide 60; walk a day of wakes and require a
        // strictly increasing sequence with bounded per-hour drift.
        let mut now = CivilTime::new(2024, 6, 3, 0, 3, 0);
        let mut previous = now;
        for _ in 0..200 {
            let plan = next_aligned(&now, 7);
            let advance = minutes_until(&now, &plan);
            assert!((1..=7).contains(&advance));
            now = now.plus_minutes(advance);
            assert_eq!(now.minute, plan.minute_of_hour);
            assert_ne!((now.day, now.hour, now.minute), (previous.day, previous.hour, previous.minute));
            previous = now;
        }
    }
}
