//! Battery voltage sampling through the calibrated ADC.

use core::ptr;

use embassy_stm32::adc::{Adc, SampleTime};
use embassy_stm32::peripherals::{ADC1, PB1};

/// Factory-programmed VREFINT calibration constant, sampled at 3.0 V.
const VREFINT_CAL_ADDR: *const u16 = 0x1FFF_75AA as *const u16;
const VREFINT_CAL_MV: u32 = 3000;

/// Divider ratio between the cell and the sense pin (two equal resistors).
const DIVIDER_NUM: u32 = 2;

pub struct BatteryAdc<'d> {
    adc: Adc<'d, ADC1>,
    pin: PB1,
    vrefint_cal: u16,
}

impl<'d> BatteryAdc<'d> {
    pub fn new(mut adc: Adc<'d, ADC1>, pin: PB1) -> Self {
        adc.set_sample_time(SampleTime::CYCLES160_5);
        let vrefint_cal = unsafe { ptr::read_volatile(VREFINT_CAL_ADDR) };
        Self {
            adc,
            pin,
            vrefint_cal,
        }
    }

    /// One calibrated supply sample in millivolts at the cell.
    pub fn sample_mv(&mut self) -> u16 {
        let mut vrefint = self.adc.enable_vrefint();
        // First conversion after wake is noisy; discard it.
        let _ = self.adc.blocking_read(&mut vrefint);
        let vref_raw = u32::from(self.adc.blocking_read(&mut vrefint));
        let sense_raw = u32::from(self.adc.blocking_read(&mut self.pin));

        let vdda_mv = VREFINT_CAL_MV * u32::from(self.vrefint_cal) / vref_raw.max(1);
        let pin_mv = sense_raw * vdda_mv / 4095;
        (pin_mv * DIVIDER_NUM).min(u32::from(u16::MAX)) as u16
    }
}
