//! Wall-clock data model and the time-driver seam.
//!
//! The core never talks to RTC or SNTP hardware directly; it consumes a
//! [`TimeKeeper`] provided by the firmware or the emulator. `CivilTime` is a
//! plain calendar carrier with just enough arithmetic to advance across minute,
//! hour, and day boundaries so the alarm planner and the host simulation can
//! reason about consecutive wake instants.

use core::fmt::{self, Write};

use heapless::String;

/// Maximum rendered timestamp length (`dd/mm/yy,HH:MM:SS`).
pub const TIMESTAMP_LEN: usize = 17;

/// Rendered timestamp buffer.
pub type Timestamp = String<TIMESTAMP_LEN>;

/// Calendar wall-clock instant as reported by the RTC.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CivilTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl CivilTime {
    /// Creates a new instant. Fields are taken at face value; the RTC is the
    /// authority on calendar validity.
    #[must_use]
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Renders the log-row timestamp (`dd/mm/yy,HH:MM:SS`).
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        let mut out = Timestamp::new();
        let _ = write!(
            out,
            "{:02}/{:02}/{:02},{:02}:{:02}:{:02}",
            self.day,
            self.month,
            self.year % 100,
            self.hour,
            self.minute,
            self.second
        );
        out
    }

    /// Returns this instant advanced by whole minutes, with seconds reset to
    /// zero. Used by the host simulation to jump to the next wake instant.
    #[must_use]
    pub fn plus_minutes(mut self, minutes: u32) -> Self {
        self.second = 0;
        let total = u32::from(self.minute) + minutes;
        self.minute = (total % 60) as u8;

        let mut carry_hours = total / 60;
        while carry_hours > 0 {
            self.hour += 1;
            if self.hour == 24 {
                self.hour = 0;
                self.advance_day();
            }
            carry_hours -= 1;
        }
        self
    }

    fn advance_day(&mut self) {
        if self.day < days_in_month(self.year, self.month) {
            self.day += 1;
            return;
        }
        self.day = 1;
        if self.month < 12 {
            self.month += 1;
        } else {
            self.month = 1;
            self.year += 1;
        }
    }
}

impl fmt::Display for CivilTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}/{:02}/{:02},{:02}:{:02}:{:02}",
            self.day,
            self.month,
            self.year % 100,
            self.hour,
            self.minute,
            self.second
        )
    }
}

const fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

const fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        _ => 28,
    }
}

/// Abstraction over the RTC/network time service.
///
/// `resync` is best-effort: an unreachable time source leaves the wall clock
/// as-is and reports `false`; callers retry on a later boot rather than
/// treating it as fatal.
pub trait TimeKeeper {
    /// Attempts to resynchronize the wall clock from its backing source.
    fn resync(&mut self) -> bool;

    /// Reads the current wall-clock time.
    fn now(&self) -> CivilTime;

    /// Programs the single absolute minute-of-hour alarm.
    fn set_alarm(&mut self, minute_of_hour: u8);

    /// Clears the alarm and any periodic interrupt mode, so only an
    /// explicitly armed alarm can fire.
    fn clear_alarm(&mut self);
}
