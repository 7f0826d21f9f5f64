//! RTC calendar access and the aligned minute alarm.
//!
//! The calendar is provisioned once over the maintenance console and then
//! free-runs on LSE through every standby period. This driver only reads the
//! BCD calendar and programs alarm A to fire at an absolute minute of the
//! hour, seconds locked to zero.

use embassy_stm32::pac;

use logger_core::time::{CivilTime, TimeKeeper};

pub struct RtcClock;

impl RtcClock {
    pub fn new() -> Self {
        Self
    }

    fn with_write_access(f: impl FnOnce()) {
        pac::RTC.wpr().write(|w| w.set_key(0xCA));
        pac::RTC.wpr().write(|w| w.set_key(0x53));
        f();
        pac::RTC.wpr().write(|w| w.set_key(0xFF));
    }
}

const fn from_bcd(tens: u8, units: u8) -> u8 {
    tens * 10 + units
}

impl TimeKeeper for RtcClock {
    fn resync(&mut self) -> bool {
        // Nothing to resync against in the field; report whether the
        // calendar has ever been initialized.
        pac::RTC.icsr().read().inits()
    }

    fn now(&self) -> CivilTime {
        // TR must be read before DR to unlock the shadow registers in order.
        let tr = pac::RTC.tr().read();
        let dr = pac::RTC.dr().read();
        CivilTime {
            year: 2000 + u16::from(from_bcd(dr.yt(), dr.yu())),
            month: from_bcd(dr.mt().into(), dr.mu()),
            day: from_bcd(dr.dt(), dr.du()),
            hour: from_bcd(tr.ht(), tr.hu()),
            minute: from_bcd(tr.mnt(), tr.mnu()),
            second: from_bcd(tr.st(), tr.su()),
        }
    }

    fn set_alarm(&mut self, minute_of_hour: u8) {
        Self::with_write_access(|| {
            pac::RTC.cr().modify(|w| {
                w.set_alrae(false);
                w.set_alraie(false);
            });
            while !pac::RTC.icsr().read().alrawf() {}
            pac::RTC.alrmr(0).write(|w| {
                // Match minutes and zero seconds; ignore hours and date.
                w.set_mnt(minute_of_hour / 10);
                w.set_mnu(minute_of_hour % 10);
                w.set_msk1(false);
                w.set_msk2(false);
                w.set_msk3(true);
                w.set_msk4(true);
            });
            pac::RTC.cr().modify(|w| {
                w.set_alrae(true);
                w.set_alraie(true);
            });
        });
    }

    fn clear_alarm(&mut self) {
        Self::with_write_access(|| {
            pac::RTC.cr().modify(|w| {
                w.set_alrae(false);
                w.set_alraie(false);
                // No periodic wakeup timer either; the alarm is the only
                // time-driven wake source this firmware ever arms.
                w.set_wute(false);
            });
            pac::RTC.scr().write(|w| w.set_calraf(true));
        });
    }
}
