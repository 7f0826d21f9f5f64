//! Wiring shared by the acquisition tasks and the boot sequence.
//!
//! One set of statics carries every cross-task signal: the completion latch
//! the boot sequence polls, the battery sample, the finished sensor sweep,
//! and debounced button presses. The raw mutex flavor follows the build
//! target so the same wiring compiles for the firmware executor and for
//! host-side tests.

#![allow(dead_code)]

use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Duration;

use logger_core::acquire::CompletionLatch;
use logger_core::sensing::ReadingSet;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;

#[cfg(target_os = "none")]
pub type AcqMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
pub type AcqMutex = NoopRawMutex;

/// Depth of the debounced-press channel. Two entries ride out a user
/// double-tapping faster than the boot loop drains presses.
pub const PRESS_QUEUE_DEPTH: usize = 2;

/// Raw supply sample published by the battery task.
pub type BatterySignal = Signal<AcqMutex, u16>;

/// Finished sweep published by the sensor task.
pub type SweepSignal = Signal<AcqMutex, ReadingSet>;

/// Debounced hold lengths from the button task.
pub type PressChannel = Channel<AcqMutex, Duration, PRESS_QUEUE_DEPTH>;

/// Exclusive handle to one physical sensor bus. Task launches are
/// concurrent, so each bus is lockable even though sweeps are sequential.
pub type BusGuard<B> = Mutex<AcqMutex, B>;

/// Barrier the boot sequence polls until all tasks report.
pub static LATCH: CompletionLatch = CompletionLatch::new();

/// Latest raw battery sample for the cycle.
#[cfg(target_os = "none")]
pub static BATTERY: BatterySignal = Signal::new();

/// Latest completed sensor sweep for the cycle.
#[cfg(target_os = "none")]
pub static SWEEP: SweepSignal = Signal::new();

/// Press lengths waiting for the interactive loop.
#[cfg(target_os = "none")]
pub static PRESSES: PressChannel = Channel::new();

#[cfg(test)]
mod tests {
    use super::*;
    use logger_core::acquire::{TaskId, TaskReport};
    use logger_core::sensing::{Bus, NoopSensorBus, SensorAddress, SensorBus};

    #[test]
    fn statics_wire_a_full_cycle_of_signals() {
        let latch = CompletionLatch::new();
        let battery: BatterySignal = Signal::new();
        let sweep: SweepSignal = Signal::new();

        battery.signal(3904);
        latch.arrive(TaskId::Battery);
        latch.arrive(TaskId::ClockSync);
        sweep.signal(ReadingSet::new());
        latch.arrive(TaskId::Sensors);

        assert!(latch.is_released());
        assert_eq!(latch.report(TaskId::Battery), TaskReport::Done);
        assert_eq!(battery.try_take(), Some(3904));
        assert!(sweep.try_take().is_some_and(|set| set.is_empty()));
    }

    #[test]
    fn bus_guard_serializes_access() {
        let guard: BusGuard<NoopSensorBus> = Mutex::new(NoopSensorBus);
        let mut held = guard.try_lock().expect("bus free");
        assert!(guard.try_lock().is_err());
        assert!(held.read_one(Bus::Port1, &SensorAddress([0; 8])).is_none());
    }
}
