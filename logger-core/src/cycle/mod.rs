//! End-of-cycle orchestration: fold results, persist, plan, sleep.
//!
//! Everything before this point runs concurrently; `conclude_cycle` is the
//! single-threaded tail that owns the mutable session, the storage service,
//! and the power hardware. Its ordering is load-bearing: the battery sample
//! is folded in first so the arbiter sees the freshest estimate, the row is
//! appended before the alarm is planned, and the wake mask is committed last
//! so a mid-cycle fault can never leave the device armed for a cycle it
//! never finished.

use crate::acquire::{TaskReport, TASK_COUNT};
use crate::boot::BootPath;
use crate::power::{self, PowerControl, WakeSources};
use crate::record::{self, LogStore};
use crate::schedule::{self, AlarmPlan};
use crate::sensing::SensorReading;
use crate::session::SessionState;
use crate::time::TimeKeeper;

/// Everything the barrier released with.
#[derive(Clone, Debug)]
pub struct CycleInputs<'a> {
    /// Path the dispatcher selected at boot.
    pub path: BootPath,
    /// Per-task barrier reports, for the end-of-cycle diagnostic line.
    pub reports: [TaskReport; TASK_COUNT],
    /// Raw supply sample; `None` when the battery task never delivered.
    pub battery_sample: Option<u16>,
    /// Readings in scan order, error flags already set.
    pub readings: &'a [SensorReading],
}

/// What the cycle did on its way down, for logging and the host harness.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleOutcome {
    /// Whether a data row reached storage.
    pub appended: bool,
    /// A row was due but storage refused it. Never fatal; the next cycle
    /// retries with a fresh mount.
    pub storage_failed: bool,
    /// The programmed alarm, when the timer was armed.
    pub alarm: Option<AlarmPlan>,
    /// Wake sources committed to the power hardware.
    pub armed: WakeSources,
    /// Barrier reports carried through for the diagnostic line.
    pub reports: [TaskReport; TASK_COUNT],
}

/// Runs the cycle tail and commits the device to deep sleep.
///
/// On hardware `enter_deep_sleep` does not return; the returned outcome is
/// observable only on host builds, where the power driver records the
/// commitment instead of executing it.
pub fn conclude_cycle<T, S, P>(
    session: &mut SessionState,
    inputs: &CycleInputs<'_>,
    time: &mut T,
    store: &mut S,
    power: &mut P,
) -> CycleOutcome
where
    T: TimeKeeper,
    S: LogStore,
    P: PowerControl,
{
    if let Some(millivolts) = inputs.battery_sample {
        session.observe_battery(millivolts);
    }

    let mut appended = false;
    let mut storage_failed = false;
    if matches!(inputs.path, BootPath::SilentAcquisition) {
        if let Some(log) = session.active_log {
            if store.mount() {
                let header = record::header_row(inputs.readings);
                let row = record::data_row(
                    &time.now().timestamp(),
                    session.smoothed_battery_mv,
                    inputs.readings,
                );
                match store.append(log, header.as_str(), row.as_str()) {
                    Ok(()) => appended = true,
                    Err(_) => storage_failed = true,
                }
            } else {
                storage_failed = true;
            }
        }
    }

    let armed = power::select_wake_sources(session.smoothed_battery_mv, session.recording);
    // The previous cycle's alarm is always retired first. When the arbiter
    // drops the timer source a stale alarm would otherwise keep waking the
    // device on the old cadence.
    time.clear_alarm();
    let alarm = if armed.contains(WakeSources::RTC_ALARM) {
        let plan = schedule::next_aligned(&time.now(), session.interval_minutes);
        time.set_alarm(plan.minute_of_hour);
        Some(plan)
    } else {
        None
    };

    power.arm_wake_sources(armed);
    power.store_retained(&session.snapshot());
    power.enter_deep_sleep();

    CycleOutcome {
        appended,
        storage_failed,
        alarm,
        armed,
        reports: inputs.reports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StorageError;
    use crate::sensing::{Bus, ReadingStatus, SensorAddress};
    use crate::session::LogId;
    use crate::time::CivilTime;

    struct FakeClock {
        now: CivilTime,
        alarm: Option<u8>,
        cleared: bool,
    }

    impl FakeClock {
        fn at(now: CivilTime) -> Self {
            Self {
                now,
                alarm: None,
                cleared: false,
            }
        }
    }

    impl TimeKeeper for FakeClock {
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
            self.cleared = true;
            self.alarm = None;
        }
    }

    #[derive(Default)]
    struct FakeStore {
        appends: heapless::Vec<(LogId, record::Row, record::Row), 4>,
        fail_with: Option<StorageError>,
    }

    impl LogStore for FakeStore {
        fn mount(&mut self) -> bool {
            true
        }

        fn append(&mut self, log: LogId, header: &str, row: &str) -> Result<(), StorageError> {
            if let Some(error) = self.fail_with {
                return Err(error);
            }
            let header = record::Row::try_from(header).unwrap();
            let row = record::Row::try_from(row).unwrap();
            self.appends.push((log, header, row)).unwrap();
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePower {
        armed: Option<WakeSources>,
        retained: Option<crate::session::SessionSnapshot>,
        slept: bool,
    }

    impl PowerControl for FakePower {
        fn wake_status_bits(&self) -> u8 {
            0
        }

        fn arm_wake_sources(&mut self, sources: WakeSources) {
            self.armed = Some(sources);
        }

        fn store_retained(&mut self, snapshot: &crate::session::SessionSnapshot) {
            self.retained = Some(*snapshot);
        }

        fn enter_deep_sleep(&mut self) {
            self.slept = true;
        }
    }

    fn reading(value: f32) -> SensorReading {
        SensorReading {
            bus: Bus::Port1,
            address: SensorAddress([0x28, 0x1A, 0, 0x2B, 0, 0x3C, 0, 0x4D]),
            value,
            status: ReadingStatus::Ok,
        }
    }

    fn recording_session(now: &CivilTime) -> SessionState {
        let mut session = SessionState::cold_boot();
        session.note_boot();
        session.observe_battery(3900);
        session.start_recording(now);
        session
    }

    fn all_done() -> [TaskReport; TASK_COUNT] {
        [TaskReport::Done; TASK_COUNT]
    }

    #[test]
    fn silent_cycle_appends_and_rearms_timer() {
        let now = CivilTime::new(2024, 6, 3, 10, 17, 2);
        let mut session = recording_session(&now);
        let mut clock = FakeClock::at(now);
        let mut store = FakeStore::default();
        let mut power = FakePower::default();

        let readings = [reading(21.5)];
        let outcome = conclude_cycle(
            &mut session,
            &CycleInputs {
                path: BootPath::SilentAcquisition,
                reports: all_done(),
                battery_sample: Some(3900),
                readings: &readings,
            },
            &mut clock,
            &mut store,
            &mut power,
        );

        assert!(outcome.appended);
        assert!(!outcome.storage_failed);
        assert_eq!(store.appends.len(), 1);
        let (_, header, row) = &store.appends[0];
        assert_eq!(header, "timestamp,battery_mv,1234");
        assert_eq!(row, "03/06/24,10:17:02,3900,21.50");

        assert!(clock.cleared);
        assert_eq!(clock.alarm, Some(30));
        assert_eq!(outcome.alarm.map(|plan| plan.minute_of_hour), Some(30));
        assert_eq!(
            power.armed,
            Some(WakeSources::manual().with(WakeSources::RTC_ALARM))
        );
        let retained = power.retained.expect("session persisted before sleep");
        assert!(retained.recording);
        assert_eq!(retained.smoothed_battery_mv, session.smoothed_battery_mv);
        assert!(power.slept);
    }

    #[test]
    fn low_battery_degrades_to_manual_wake_without_alarm() {
        let now = CivilTime::new(2024, 6, 3, 10, 17, 2);
        let mut session = SessionState::cold_boot();
        session.note_boot();
        session.observe_battery(3250);
        session.start_recording(&now);
        let mut clock = FakeClock::at(now);
        let mut store = FakeStore::default();
        let mut power = FakePower::default();

        let outcome = conclude_cycle(
            &mut session,
            &CycleInputs {
                path: BootPath::SilentAcquisition,
                reports: all_done(),
                battery_sample: Some(3100),
                readings: &[],
            },
            &mut clock,
            &mut store,
            &mut power,
        );

        // (3 * 3250 + 3100) / 4 = 3212, below the safe-sleep threshold.
        assert_eq!(session.smoothed_battery_mv, 3212);
        assert!(outcome.appended);
        assert_eq!(outcome.alarm, None);
        assert_eq!(clock.alarm, None);
        assert_eq!(power.armed, Some(WakeSources::manual()));
        assert!(power.slept);
    }

    #[test]
    fn degrading_battery_retires_the_previous_alarm() {
        let now = CivilTime::new(2024, 6, 3, 10, 17, 2);
        let mut session = recording_session(&now);
        let mut clock = FakeClock::at(now);
        let mut store = FakeStore::default();
        let mut power = FakePower::default();

        conclude_cycle(
            &mut session,
            &CycleInputs {
                path: BootPath::SilentAcquisition,
                reports: all_done(),
                battery_sample: Some(3900),
                readings: &[],
            },
            &mut clock,
            &mut store,
            &mut power,
        );
        assert_eq!(clock.alarm, Some(30));

        // Next wake finds the pack collapsed. The arbiter parks the timer,
        // and the alarm programmed above must not survive into standby.
        let outcome = conclude_cycle(
            &mut session,
            &CycleInputs {
                path: BootPath::SilentAcquisition,
                reports: all_done(),
                battery_sample: Some(1200),
                readings: &[],
            },
            &mut clock,
            &mut store,
            &mut power,
        );

        assert_eq!(outcome.armed, WakeSources::manual());
        assert_eq!(outcome.alarm, None);
        assert_eq!(clock.alarm, None);
        assert!(power.slept);
    }

    #[test]
    fn idle_interactive_cycle_neither_appends_nor_arms_timer() {
        let now = CivilTime::new(2024, 6, 3, 10, 17, 2);
        let mut session = SessionState::cold_boot();
        session.note_boot();
        let mut clock = FakeClock::at(now);
        let mut store = FakeStore::default();
        let mut power = FakePower::default();

        let outcome = conclude_cycle(
            &mut session,
            &CycleInputs {
                path: BootPath::Interactive,
                reports: all_done(),
                battery_sample: Some(4100),
                readings: &[],
            },
            &mut clock,
            &mut store,
            &mut power,
        );

        assert!(!outcome.appended);
        assert!(store.appends.is_empty());
        assert_eq!(outcome.alarm, None);
        assert_eq!(power.armed, Some(WakeSources::manual()));
        assert!(power.slept);
    }

    #[test]
    fn storage_refusal_is_flagged_but_cycle_still_sleeps() {
        let now = CivilTime::new(2024, 6, 3, 10, 17, 2);
        let mut session = recording_session(&now);
        let mut clock = FakeClock::at(now);
        let mut store = FakeStore {
            fail_with: Some(StorageError::WriteFailed),
            ..FakeStore::default()
        };
        let mut power = FakePower::default();

        let outcome = conclude_cycle(
            &mut session,
            &CycleInputs {
                path: BootPath::SilentAcquisition,
                reports: all_done(),
                battery_sample: Some(3900),
                readings: &[],
            },
            &mut clock,
            &mut store,
            &mut power,
        );

        assert!(!outcome.appended);
        assert!(outcome.storage_failed);
        assert_eq!(clock.alarm, Some(30));
        assert!(power.slept);
    }

    #[test]
    fn missing_battery_sample_leaves_estimate_untouched() {
        let now = CivilTime::new(2024, 6, 3, 10, 17, 2);
        let mut session = recording_session(&now);
        let before = session.smoothed_battery_mv;
        let mut clock = FakeClock::at(now);
        let mut store = FakeStore::default();
        let mut power = FakePower::default();

        let mut reports = all_done();
        reports[0] = TaskReport::TimedOut;
        let outcome = conclude_cycle(
            &mut session,
            &CycleInputs {
                path: BootPath::SilentAcquisition,
                reports,
                battery_sample: None,
                readings: &[],
            },
            &mut clock,
            &mut store,
            &mut power,
        );

        assert_eq!(session.smoothed_battery_mv, before);
        assert_eq!(outcome.reports[0], TaskReport::TimedOut);
        assert!(power.slept);
    }
}
