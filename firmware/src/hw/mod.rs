//! Board bring-up and hardware driver implementations.
//!
//! Everything here is target-only; the portable boot logic reaches the
//! hardware exclusively through the `logger-core` driver traits.

use embassy_stm32::adc::Adc;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Flex, Input, Level, Output, Pull, Speed};
use embassy_stm32::spi::{self, Spi};
use embassy_stm32::time::Hertz;
use embassy_stm32::Peripherals;

pub mod battery;
pub mod onewire;
pub mod power;
pub mod rtc;
pub mod store;

pub use battery::BatteryAdc;
pub use onewire::OneWirePorts;
pub use power::StandbyPower;
pub use rtc::RtcClock;
pub use store::BlockJournal;

/// All board resources, split once at boot.
pub struct Board {
    pub power: StandbyPower,
    pub clock: RtcClock,
    pub battery: BatteryAdc<'static>,
    pub sensors: OneWirePorts<'static>,
    pub store: BlockJournal<'static>,
    pub button: ExtiInput<'static>,
    /// VBUS divider sense; high while a USB supply is present.
    pub usb_detect: Input<'static>,
}

impl Board {
    /// Carves the peripheral set into the logger's drivers.
    pub fn split(p: Peripherals) -> Self {
        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(400_000);
        let sd_spi = Spi::new_blocking(p.SPI1, p.PA5, p.PA7, p.PA6, spi_config);
        let sd_cs = Output::new(p.PA4, Level::High, Speed::Low);

        Self {
            power: StandbyPower::new(),
            clock: RtcClock::new(),
            battery: BatteryAdc::new(Adc::new(p.ADC1), p.PB1),
            sensors: OneWirePorts::new([Flex::new(p.PB3), Flex::new(p.PB4), Flex::new(p.PB5)]),
            store: BlockJournal::new(sd_spi, sd_cs),
            button: ExtiInput::new(p.PC13, p.EXTI13, Pull::Up),
            usb_detect: Input::new(p.PA8, Pull::Down),
        }
    }
}
