//! Standby entry, wake-status capture, and the retained backup registers.
//!
//! The G0 keeps its backup registers and RTC alive in standby, which makes
//! the PWR/TAMP block the natural owner of both the wake-status bits and the
//! retained session record.

use embassy_stm32::pac;

use logger_core::boot::{WAKE_BIT_BUTTON, WAKE_BIT_RTC, WAKE_BIT_TIMER, WAKE_BIT_USB};
use logger_core::power::{PowerControl, WakeSources};
use logger_core::session::{SessionSnapshot, SessionState};

use crate::retained::{self, BACKUP_WORDS};

/// Wake-up line wired to the user button.
const WKUP_BUTTON: usize = 1;
/// Wake-up line wired to VBUS detect.
const WKUP_USB: usize = 3;

/// Driver for the PWR/TAMP power domain.
pub struct StandbyPower {
    status_bits: u8,
}

impl StandbyPower {
    /// Captures and clears the hardware wake flags. Call once per boot,
    /// before anything else touches the PWR block.
    pub fn new() -> Self {
        let sr1 = pac::PWR.sr1().read();
        let mut bits = 0;
        if sr1.wufi() {
            // Internal line: the RTC alarm is the only armed source there.
            bits |= WAKE_BIT_TIMER;
        }
        if sr1.wuf(WKUP_BUTTON) {
            bits |= WAKE_BIT_BUTTON;
        }
        if sr1.wuf(WKUP_USB) {
            bits |= WAKE_BIT_USB;
        }
        if pac::TAMP.sr().read().itamp3f() {
            bits |= WAKE_BIT_RTC;
        }
        pac::PWR.scr().write(|w| {
            w.set_cwuf(WKUP_BUTTON, true);
            w.set_cwuf(WKUP_USB, true);
            w.set_csbf(true);
        });

        Self { status_bits: bits }
    }

    /// Reads the session record persisted before the previous sleep.
    pub fn load_retained(&self) -> Option<SessionState> {
        let mut words = [0u32; BACKUP_WORDS];
        for (index, word) in words.iter_mut().enumerate() {
            *word = pac::TAMP.bkpr(index).read();
        }
        retained::decode(&words)
    }

    fn write_backup(words: &[u32; BACKUP_WORDS]) {
        for (index, word) in words.iter().enumerate() {
            pac::TAMP.bkpr(index).write_value(*word);
        }
    }
}

impl PowerControl for StandbyPower {
    fn wake_status_bits(&self) -> u8 {
        self.status_bits
    }

    fn arm_wake_sources(&mut self, sources: WakeSources) {
        pac::PWR.cr3().modify(|w| {
            w.set_ewup(WKUP_BUTTON, sources.contains(WakeSources::BUTTON));
            w.set_ewup(WKUP_USB, sources.contains(WakeSources::USB));
        });
        // The RTC alarm rides the internal wake line; it is armed or cleared
        // by the clock driver, nothing to enable here.
    }

    fn store_retained(&mut self, snapshot: &SessionSnapshot) {
        let state = SessionState {
            recording: snapshot.recording,
            interval_minutes: snapshot.interval_minutes,
            smoothed_battery_mv: snapshot.smoothed_battery_mv,
            active_log: snapshot.active_log,
            boot_count: snapshot.boot_count,
            start_count: snapshot.start_count,
        };
        Self::write_backup(&retained::encode(&state));
    }

    fn enter_deep_sleep(&mut self) {
        // Standby: lowest power state that keeps RTC and backup domain alive.
        pac::PWR.cr1().modify(|w| w.set_lpms(0b011));
        unsafe {
            let mut cp = cortex_m::Peripherals::steal();
            cp.SCB.set_sleepdeep();
        }
        loop {
            cortex_m::asm::wfi();
        }
    }
}
