//! Retained session record surviving deep sleep.
//!
//! The device loses all working RAM between active periods; this record lives
//! in the retained region (RTC backup domain on the reference hardware) and
//! is the only application state that crosses the sleep/wake boundary. It is
//! valid only when the boot was not a cold boot. The firmware decides that
//! by validating its retained-word codec, the emulator by keeping the record
//! across simulated cycles.
//!
//! Ownership rule: only the boot/button context mutates `SessionState`.
//! Concurrent acquisition tasks receive a [`SessionSnapshot`] copy, so no
//! locking is needed around the retained record.

use core::fmt::Write;

use heapless::String;

use crate::power;
use crate::time::CivilTime;

/// Recording interval applied on cold boot.
pub const DEFAULT_INTERVAL_MINUTES: u8 = 15;

/// Rendered log path length (`/log-XXXXXXXX.csv`).
pub const LOG_PATH_LEN: usize = 17;

/// Rendered log path buffer.
pub type LogPath = String<LOG_PATH_LEN>;

/// Errors raised when mutating the session record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionError {
    /// Interval outside 1..=59 minutes.
    IntervalOutOfRange { minutes: u8 },
    /// Interval changes are refused while a recording is active.
    RecordingActive,
}

/// Compact opaque identifier of the active append target.
///
/// Packs the recording start instant plus the session's start counter, so
/// every start/stop/start round trip yields a distinct identifier and the
/// value fits a single retained 32-bit word. The counter rather than the
/// boot counter disambiguates toggles landing in the same boot and the same
/// minute. The month field keeps the packed value non-zero, which the
/// retained-memory codec relies on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LogId(u32);

impl LogId {
    /// Derives an identifier from the recording start instant and the
    /// session's start counter.
    #[must_use]
    pub fn from_start(started: &CivilTime, start_count: u16) -> Self {
        let packed = (u32::from(started.month) << 28)
            | (u32::from(started.day) << 23)
            | (u32::from(started.hour) << 18)
            | (u32::from(started.minute) << 12)
            | u32::from(start_count & 0x0FFF);
        Self(packed)
    }

    /// Returns the packed representation for the retained-memory codec.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Rebuilds an identifier from its packed representation.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Renders the append-target path for this identifier.
    #[must_use]
    pub fn path(self) -> LogPath {
        let mut out = LogPath::new();
        let _ = write!(out, "/log-{:08X}.csv", self.0);
        out
    }
}

/// The retained session record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SessionState {
    /// Whether periodic unattended acquisition is active.
    pub recording: bool,
    /// Desired period between acquisitions, 1..=59 minutes.
    pub interval_minutes: u8,
    /// Exponentially smoothed supply estimate; 0 means "never sampled".
    pub smoothed_battery_mv: u16,
    /// Append target; `Some` exactly while `recording` is true.
    pub active_log: Option<LogId>,
    /// Incremented every boot, diagnostic only.
    pub boot_count: u16,
    /// Recordings started over the session's lifetime; feeds log identifier
    /// allocation so a stop/start pair never reuses an identifier.
    pub start_count: u16,
}

impl SessionState {
    /// Deterministic state for a boot with no surviving retained region.
    #[must_use]
    pub const fn cold_boot() -> Self {
        Self {
            recording: false,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            smoothed_battery_mv: 0,
            active_log: None,
            boot_count: 0,
            start_count: 0,
        }
    }

    /// Counts the current boot. Called once, first thing, on every path.
    pub fn note_boot(&mut self) {
        self.boot_count = self.boot_count.wrapping_add(1);
    }

    /// Updates the recording interval. Refused while recording so an active
    /// log keeps a stable cadence.
    pub fn set_interval(&mut self, minutes: u8) -> Result<(), SessionError> {
        if self.recording {
            return Err(SessionError::RecordingActive);
        }
        if !(1..=59).contains(&minutes) {
            return Err(SessionError::IntervalOutOfRange { minutes });
        }
        self.interval_minutes = minutes;
        Ok(())
    }

    /// Starts a recording, allocating a fresh append target. Idempotent
    /// starts keep the existing log.
    pub fn start_recording(&mut self, now: &CivilTime) -> LogId {
        if let Some(log) = self.active_log {
            return log;
        }
        self.start_count = self.start_count.wrapping_add(1);
        let log = LogId::from_start(now, self.start_count);
        self.recording = true;
        self.active_log = Some(log);
        log
    }

    /// Stops the recording and drops the append target. The identifier is
    /// never reused; the next start allocates a new one.
    pub fn stop_recording(&mut self) {
        self.recording = false;
        self.active_log = None;
    }

    /// Folds a fresh supply sample into the smoothed estimate. The first
    /// sample after a cold boot replaces the sentinel outright.
    pub fn observe_battery(&mut self, millivolts: u16) {
        self.smoothed_battery_mv = if self.smoothed_battery_mv == 0 {
            millivolts
        } else {
            power::smooth(self.smoothed_battery_mv, millivolts)
        };
    }

    /// Read-only copy handed to concurrent acquisition tasks.
    #[must_use]
    pub const fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            recording: self.recording,
            interval_minutes: self.interval_minutes,
            smoothed_battery_mv: self.smoothed_battery_mv,
            active_log: self.active_log,
            boot_count: self.boot_count,
            start_count: self.start_count,
        }
    }

    /// Checks the structural invariants: the append target exists exactly
    /// while recording, and the interval stays in range.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.active_log.is_some() == self.recording
            && self.interval_minutes >= 1
            && self.interval_minutes <= 59
    }
}

/// Immutable view of [`SessionState`] safe to share with concurrent tasks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SessionSnapshot {
    pub recording: bool,
    pub interval_minutes: u8,
    pub smoothed_battery_mv: u16,
    pub active_log: Option<LogId>,
    pub boot_count: u16,
    pub start_count: u16,
}
