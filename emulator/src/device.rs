//! In-process device model backing the emulator session.
//!
//! `SimDevice` stands in for the whole board: a settable RTC, a battery
//! supply the operator can drag around, an in-memory log store, and a
//! sensor harness whose ports can be populated or wedged from the console.
//! `run_cycle` drives one complete wake-to-sleep pass through the same
//! dispatcher, barrier, and arbiter the firmware uses, with OS threads
//! standing in for the executor tasks.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use logger_core::acquire::{BarrierWait, CompletionLatch, TaskId, TaskReport, TASK_COUNT};
use logger_core::boot::{self, BootPath, WakeCause};
use logger_core::cycle::{self, CycleInputs, CycleOutcome};
use logger_core::power::{PowerControl, WakeSources};
use logger_core::record::{LogStore, StorageError};
use logger_core::sensing::{
    Bus, BusTopology, ReadingSet, ReadingStatus, SensorAddress, SensorBus, ALL_BUSES,
    MAX_SENSORS_PER_BUS,
};
use logger_core::session::{LogId, SessionSnapshot, SessionState};
use logger_core::time::{CivilTime, TimeKeeper};

/// Barrier tuning for the emulated cycle. The firmware polls for up to ten
/// seconds; the emulator shortens that so a wedged sweep reports promptly.
const SIM_BARRIER: BarrierWait = BarrierWait {
    poll: Duration::from_millis(5),
    ceiling: Duration::from_millis(200),
};

/// How long a wedged sweep stalls. Must exceed the barrier ceiling.
const HANG_STALL: Duration = Duration::from_millis(400);

/// Simulated RTC. Minutes tick on every wake; a timer or RTC wake jumps
/// straight to the programmed alarm minute.
pub struct SimClock {
    now: CivilTime,
    alarm: Option<u8>,
}

impl SimClock {
    fn new() -> Self {
        Self {
            now: CivilTime::new(2024, 6, 3, 10, 0, 0),
            alarm: None,
        }
    }

    fn advance_for(&mut self, cause: WakeCause) {
        let step = match (cause, self.alarm) {
            (WakeCause::Timer | WakeCause::RtcInterrupt, Some(target)) => {
                let mut probe = self.now;
                let mut minutes = 0u32;
                while probe.minute != target || minutes == 0 {
                    probe = probe.plus_minutes(1);
                    minutes += 1;
                }
                minutes
            }
            _ => 1,
        };
        self.now = self.now.plus_minutes(step);
    }
}

impl TimeKeeper for SimClock {
    fn resync(&mut self) -> bool {
        true
    }

    fn now(&self) -> CivilTime {
        self.now
    }

    fn set_alarm(&mut self, minute_of_hour: u8) {
        self.alarm = Some(minute_of_hour);
    }

    fn clear_alarm(&mut self) {
        self.alarm = None;
    }
}

/// Simulated standby controller. Records what the arbiter committed instead
/// of powering anything down.
pub struct SimPower {
    status_bits: u8,
    pub armed: WakeSources,
    pub retained: Option<SessionSnapshot>,
    pub sleeping: bool,
}

impl SimPower {
    fn new() -> Self {
        Self {
            status_bits: 0,
            armed: WakeSources::EMPTY,
            retained: None,
            sleeping: false,
        }
    }

    fn inject_wake(&mut self, bits: u8) {
        self.status_bits = bits;
        self.sleeping = false;
    }
}

impl PowerControl for SimPower {
    fn wake_status_bits(&self) -> u8 {
        self.status_bits
    }

    fn arm_wake_sources(&mut self, sources: WakeSources) {
        self.armed = sources;
    }

    fn store_retained(&mut self, snapshot: &SessionSnapshot) {
        self.retained = Some(*snapshot);
    }

    fn enter_deep_sleep(&mut self) {
        self.sleeping = true;
    }
}

/// One emulated CSV file.
pub struct LogFile {
    pub log: LogId,
    pub lines: Vec<String>,
}

/// In-memory log store. Each log id maps to one file; the header is written
/// once when the file first appears.
#[derive(Default)]
pub struct MemStore {
    files: Vec<LogFile>,
}

impl MemStore {
    pub fn file(&self, log: LogId) -> Option<&LogFile> {
        self.files.iter().find(|file| file.log == log)
    }

    pub fn last_row(&self, log: LogId) -> Option<&str> {
        self.file(log)
            .and_then(|file| file.lines.last())
            .map(String::as_str)
    }
}

impl LogStore for MemStore {
    fn mount(&mut self) -> bool {
        true
    }

    fn append(&mut self, log: LogId, header: &str, row: &str) -> Result<(), StorageError> {
        if self.file(log).is_none() {
            self.files.push(LogFile {
                log,
                lines: vec![header.to_string()],
            });
        }
        let file = self
            .files
            .iter_mut()
            .find(|file| file.log == log)
            .ok_or(StorageError::WriteFailed)?;
        file.lines.push(row.to_string());
        Ok(())
    }
}

/// Simulated sensor harness: a population count per port plus a one-shot
/// hang flag that wedges the next conversion request.
pub struct SimSensorBus {
    attached: [u8; ALL_BUSES.len()],
    hang_next: bool,
}

impl SimSensorBus {
    fn new() -> Self {
        Self {
            // Bench rigs usually ship with one probe on the first port.
            attached: [1, 0, 0],
            hang_next: false,
        }
    }

    /// Adds a sensor on `bus`. Returns the new port count, or `None` when
    /// the port is full.
    pub fn attach(&mut self, bus: Bus) -> Option<u8> {
        let count = &mut self.attached[bus.as_index()];
        if usize::from(*count) >= MAX_SENSORS_PER_BUS {
            return None;
        }
        *count += 1;
        Some(*count)
    }

    /// Removes one sensor from `bus`. Returns the new port count, or `None`
    /// when the port was already empty.
    pub fn detach(&mut self, bus: Bus) -> Option<u8> {
        let count = &mut self.attached[bus.as_index()];
        *count = count.checked_sub(1)?;
        Some(*count)
    }

    /// Wedges the next conversion request past the barrier ceiling.
    pub fn hang_next_sweep(&mut self) {
        self.hang_next = true;
    }

    pub fn port_count(&self, bus: Bus) -> u8 {
        self.attached[bus.as_index()]
    }

    pub fn total(&self) -> u8 {
        self.attached.iter().sum()
    }

    fn address_for(bus: Bus, slot: u8) -> SensorAddress {
        let port = (bus.as_index() as u8 + 1) << 4;
        let unit = (slot + 1) << 4;
        SensorAddress([0x28, port, 0x00, unit, 0x00, port, 0x00, unit])
    }
}

impl SensorBus for SimSensorBus {
    fn scan_topology(&mut self) -> BusTopology {
        let mut topology = BusTopology::new();
        for bus in ALL_BUSES {
            for slot in 0..self.attached[bus.as_index()] {
                topology.push(bus, Self::address_for(bus, slot));
            }
        }
        topology
    }

    fn request_all(&mut self) {
        if self.hang_next {
            self.hang_next = false;
            thread::sleep(HANG_STALL);
        }
    }

    fn read_one(&mut self, bus: Bus, address: &SensorAddress) -> Option<f32> {
        let unit = f32::from(address.0[3] >> 4);
        Some(18.0 + bus.as_index() as f32 * 1.5 + unit * 0.25)
    }
}

/// What one emulated power cycle produced, for rendering by the session.
pub struct CycleReport {
    pub cause: WakeCause,
    pub path: BootPath,
    pub outcome: CycleOutcome,
    pub readings: ReadingSet,
    pub appended_row: Option<String>,
}

/// The emulated board: session state plus every hardware service the cycle
/// tail needs.
pub struct SimDevice {
    pub session: SessionState,
    pub clock: SimClock,
    pub power: SimPower,
    pub store: MemStore,
    pub sensors: Arc<Mutex<SimSensorBus>>,
    /// Raw supply voltage the battery task samples, settable from the
    /// console.
    pub supply_mv: u16,
}

impl SimDevice {
    pub fn new() -> Self {
        Self {
            session: SessionState::cold_boot(),
            clock: SimClock::new(),
            power: SimPower::new(),
            store: MemStore::default(),
            sensors: Arc::new(Mutex::new(SimSensorBus::new())),
            supply_mv: 4100,
        }
    }

    /// Runs one wake-to-sleep pass: inject the wake status, advance the
    /// clock, fan out the acquisition tasks on threads, hold at the
    /// barrier, then conclude through the shared cycle tail.
    pub fn run_cycle(&mut self, status_bits: u8) -> CycleReport {
        self.power.inject_wake(status_bits);
        let cause = WakeCause::from_status_bits(self.power.wake_status_bits());
        self.clock.advance_for(cause);
        self.session.note_boot();
        let plan = boot::plan(cause, &self.session.snapshot());

        let latch = Arc::new(CompletionLatch::new());
        let (battery_tx, battery_rx) = mpsc::channel();
        let (sweep_tx, sweep_rx) = mpsc::channel();

        {
            let latch = Arc::clone(&latch);
            let sample = self.supply_mv;
            thread::spawn(move || {
                let _ = battery_tx.send(sample);
                latch.arrive(TaskId::Battery);
            });
        }
        {
            let latch = Arc::clone(&latch);
            thread::spawn(move || {
                latch.arrive(TaskId::ClockSync);
            });
        }
        {
            let latch = Arc::clone(&latch);
            let sensors = Arc::clone(&self.sensors);
            thread::spawn(move || {
                let mut bus = sensors.lock().expect("sensor bus lock");
                let topology = bus.scan_topology();
                let mut readings = topology.pending_readings();
                bus.request_all();
                let mut faulted = false;
                for reading in readings.iter_mut() {
                    match bus.read_one(reading.bus, &reading.address) {
                        Some(value) => {
                            reading.value = value;
                            reading.status = ReadingStatus::Ok;
                        }
                        None => faulted = true,
                    }
                }
                drop(bus);
                let _ = sweep_tx.send(readings);
                if faulted {
                    latch.flag_fault(TaskId::Sensors);
                }
                latch.arrive(TaskId::Sensors);
            });
        }

        let opened = Instant::now();
        while !SIM_BARRIER.should_release(&latch, opened.elapsed()) {
            thread::sleep(SIM_BARRIER.poll);
        }
        let reports: [TaskReport; TASK_COUNT] = latch.reports();
        let battery_sample = battery_rx.try_recv().ok();
        let readings: ReadingSet = sweep_rx.try_recv().unwrap_or_default();

        let inputs = CycleInputs {
            path: plan.path,
            reports,
            battery_sample,
            readings: &readings,
        };
        let outcome = cycle::conclude_cycle(
            &mut self.session,
            &inputs,
            &mut self.clock,
            &mut self.store,
            &mut self.power,
        );

        let appended_row = if outcome.appended {
            self.session
                .active_log
                .and_then(|log| self.store.last_row(log))
                .map(str::to_string)
        } else {
            None
        };

        CycleReport {
            cause,
            path: plan.path,
            outcome,
            readings,
            appended_row,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logger_core::boot::{WAKE_BIT_BUTTON, WAKE_BIT_TIMER};

    #[test]
    fn timer_cycle_while_recording_appends_and_rearms() {
        let mut device = SimDevice::new();
        let started = device.clock.now();
        device.session.start_recording(&started);
        let log = device.session.active_log.expect("recording allocates a log");

        let report = device.run_cycle(WAKE_BIT_TIMER);

        assert_eq!(report.cause, WakeCause::Timer);
        assert_eq!(report.path, BootPath::SilentAcquisition);
        assert!(report.outcome.appended);
        assert!(report.outcome.armed.contains(WakeSources::RTC_ALARM));
        assert!(report.outcome.alarm.is_some());

        let file = device.store.file(log).expect("file created on append");
        assert_eq!(file.lines.len(), 2);
        assert!(file.lines[0].starts_with("timestamp,battery_mv"));

        let retained = device.power.retained.expect("snapshot stored before sleep");
        assert!(retained.recording);
        assert!(device.power.sleeping);
    }

    #[test]
    fn wedged_sweep_times_out_but_cycle_still_sleeps() {
        let mut device = SimDevice::new();
        let started = device.clock.now();
        device.session.start_recording(&started);
        device
            .sensors
            .lock()
            .expect("sensor bus lock")
            .hang_next_sweep();

        let report = device.run_cycle(WAKE_BIT_TIMER);

        assert_eq!(
            report.outcome.reports[TaskId::Sensors as usize],
            TaskReport::TimedOut
        );
        assert!(report.readings.is_empty());
        assert!(device.power.sleeping);
    }

    #[test]
    fn low_supply_parks_on_manual_wake_sources() {
        let mut device = SimDevice::new();
        let started = device.clock.now();
        device.session.start_recording(&started);
        device.session.observe_battery(3250);
        device.supply_mv = 3100;

        let report = device.run_cycle(WAKE_BIT_TIMER);

        assert_eq!(device.session.smoothed_battery_mv, 3212);
        assert_eq!(report.outcome.armed, WakeSources::manual());
        assert!(report.outcome.alarm.is_none());
        // Recording survives the park; it resumes once the pack recovers.
        assert!(device.session.recording);
    }

    #[test]
    fn button_wake_runs_interactive_without_appending() {
        let mut device = SimDevice::new();
        let report = device.run_cycle(WAKE_BIT_BUTTON);

        assert_eq!(report.cause, WakeCause::UserButton);
        assert_eq!(report.path, BootPath::Interactive);
        assert!(!report.outcome.appended);
        assert!(report.outcome.alarm.is_none());
    }

    #[test]
    fn harness_attach_detach_tracks_port_counts() {
        let mut bus = SimSensorBus::new();
        assert_eq!(bus.port_count(Bus::Port1), 1);
        assert_eq!(bus.attach(Bus::Port2), Some(1));
        assert_eq!(bus.attach(Bus::Port2), Some(2));
        assert_eq!(bus.total(), 3);
        assert_eq!(bus.detach(Bus::Port3), None);
        assert_eq!(bus.detach(Bus::Port2), Some(1));

        let topology = bus.scan_topology();
        assert_eq!(topology.len(), 2);
    }
}
