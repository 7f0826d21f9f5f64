//! The per-boot acquisition tasks.
//!
//! Each task does its work, publishes its result, and arrives at the shared
//! latch. None of them are cancelled; a task that outlives the barrier
//! ceiling finishes into a signal nobody reads.

use embassy_stm32::exti::ExtiInput;
use embassy_time::{Duration, Instant, Timer};

use logger_core::acquire::TaskId;
use logger_core::sensing::{ReadingStatus, SensorBus};

use crate::acquisition::{self, BusGuard};
use crate::hw;

/// DS18B20 12-bit conversion time.
const CONVERSION_DELAY: Duration = Duration::from_millis(750);

/// Debounce floor; shorter blips are switch noise.
const DEBOUNCE: Duration = Duration::from_millis(30);

#[embassy_executor::task]
pub async fn battery(mut adc: hw::BatteryAdc<'static>) {
    let sample = adc.sample_mv();
    acquisition::BATTERY.signal(sample);
    acquisition::LATCH.arrive(TaskId::Battery);
}

#[embassy_executor::task]
pub async fn clock_sync() {
    let mut clock = hw::RtcClock::new();
    if !logger_core::time::TimeKeeper::resync(&mut clock) {
        acquisition::LATCH.flag_fault(TaskId::ClockSync);
    }
    acquisition::LATCH.arrive(TaskId::ClockSync);
}

#[embassy_executor::task]
pub async fn sensor_sweep(bus: &'static BusGuard<hw::OneWirePorts<'static>>) {
    let mut ports = bus.lock().await;
    let topology = ports.scan_topology();
    let mut readings = topology.pending_readings();

    ports.request_all();
    Timer::after(CONVERSION_DELAY).await;

    let mut faulted = false;
    for reading in readings.iter_mut() {
        match ports.read_one(reading.bus, &reading.address) {
            Some(value) => {
                reading.value = value;
                reading.status = ReadingStatus::Ok;
            }
            None => faulted = true,
        }
    }
    drop(ports);

    acquisition::SWEEP.signal(readings);
    if faulted {
        acquisition::LATCH.flag_fault(TaskId::Sensors);
    }
    acquisition::LATCH.arrive(TaskId::Sensors);
}

/// Waits out press/release edges and reports debounced hold lengths. The
/// ISR itself only wakes this task; classification happens in core logic.
#[embassy_executor::task]
pub async fn button(mut input: ExtiInput<'static>) {
    loop {
        input.wait_for_low().await;
        let pressed_at = Instant::now();
        input.wait_for_high().await;
        let held = pressed_at.elapsed();
        if held >= DEBOUNCE {
            // Full queue means the interactive loop is behind; drop the press.
            let _ = acquisition::PRESSES.try_send(held);
        }
    }
}
