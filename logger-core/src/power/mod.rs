//! Battery estimation and the sleep arbiter.
//!
//! The estimator turns raw supply readings into a smoothed millivolt figure
//! and a display percentage; the arbiter decides which wake sources may
//! resume the device. Below the safe-sleep threshold the timer alarm is
//! withheld so an unattended wake/log/sleep loop cannot drain the cell below
//! recovery voltage; the device then waits for a manual wake.

use crate::session::SessionSnapshot;

/// Supply level below which unattended timer wakes are withheld.
pub const SAFE_SLEEP_THRESHOLD_MV: u16 = 3300;

/// Discharge curve for the PANASONIC NCR-18650B cell: millivolts per decade.
pub const DISCHARGE_CURVE_MV: [u16; 10] =
    [3300, 3400, 3500, 3600, 3700, 3800, 3900, 4000, 4100, 4200];

/// State of charge matching each [`DISCHARGE_CURVE_MV`] entry.
pub const DISCHARGE_CURVE_PCT: [u8; 10] = [0, 13, 22, 39, 53, 62, 74, 84, 94, 100];

/// Interpolates the state of charge for a supply reading.
///
/// Monotone non-decreasing in voltage and clamped to 0..=100.
#[must_use]
pub fn battery_percentage(millivolts: u16) -> u8 {
    if millivolts <= DISCHARGE_CURVE_MV[0] {
        return DISCHARGE_CURVE_PCT[0];
    }
    if millivolts >= DISCHARGE_CURVE_MV[DISCHARGE_CURVE_MV.len() - 1] {
        return DISCHARGE_CURVE_PCT[DISCHARGE_CURVE_PCT.len() - 1];
    }

    let mut index = 0;
    while millivolts > DISCHARGE_CURVE_MV[index + 1] {
        index += 1;
    }

    let x0 = u32::from(DISCHARGE_CURVE_MV[index]);
    let x1 = u32::from(DISCHARGE_CURVE_MV[index + 1]);
    let y0 = u32::from(DISCHARGE_CURVE_PCT[index]);
    let y1 = u32::from(DISCHARGE_CURVE_PCT[index + 1]);
    let interpolated = y0 + ((y1 - y0) * (u32::from(millivolts) - x0)) / (x1 - x0);
    interpolated as u8
}

/// Exponential smoothing step: three parts history, one part sample.
///
/// The 0 sentinel is handled by the caller
/// ([`SessionState::observe_battery`](crate::session::SessionState::observe_battery)),
/// which replaces it with the first real sample instead of blending.
#[must_use]
pub const fn smooth(previous_mv: u16, sample_mv: u16) -> u16 {
    ((3 * previous_mv as u32 + sample_mv as u32) / 4) as u16
}

/// Set of wake sources armed before entering deep sleep.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WakeSources(u8);

impl WakeSources {
    /// No sources armed. Never committed; the arbiter always arms at least
    /// the manual sources.
    pub const EMPTY: Self = Self(0);
    /// User button wake line.
    pub const BUTTON: Self = Self(1 << 0);
    /// External USB supply presence.
    pub const USB: Self = Self(1 << 1);
    /// The programmed RTC alarm.
    pub const RTC_ALARM: Self = Self(1 << 2);

    /// The manual sources that are armed on every path.
    #[must_use]
    pub const fn manual() -> Self {
        Self(Self::BUTTON.0 | Self::USB.0)
    }

    /// Union of two source sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` when every source in `other` is armed.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits for the power-management driver.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Selects the wake sources to arm for the upcoming sleep.
///
/// The timer alarm joins the manual sources only when the device is both
/// recording and above the safe-sleep threshold; every other combination
/// degrades to manual-wake-only mode.
#[must_use]
pub const fn select_wake_sources(battery_mv: u16, recording: bool) -> WakeSources {
    if recording && battery_mv > SAFE_SLEEP_THRESHOLD_MV {
        WakeSources::manual().with(WakeSources::RTC_ALARM)
    } else {
        WakeSources::manual()
    }
}

/// Abstraction over the power-management hardware.
pub trait PowerControl {
    /// Hardware-reported wake status bits, read once per boot.
    fn wake_status_bits(&self) -> u8;

    /// Arms the given wake sources for the next sleep period.
    fn arm_wake_sources(&mut self, sources: WakeSources);

    /// Persists the session record across the coming power cycle. Backup
    /// registers live in the power domain, so the driver owning them is
    /// also the one that sees every path to sleep.
    fn store_retained(&mut self, snapshot: &SessionSnapshot);

    /// Commits the device to deep sleep. Terminal on hardware: nothing in
    /// the current execution context runs afterwards, and the next
    /// observable event is a fresh boot. Host implementations return so the
    /// simulation harness can observe the committed state.
    fn enter_deep_sleep(&mut self);
}
