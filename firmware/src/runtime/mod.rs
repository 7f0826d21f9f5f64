//! Embassy runtime: one boot, one cycle, then standby.

use core::time::Duration as CoreDuration;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_stm32 as hal;
use embassy_time::{Instant, Timer};
use static_cell::StaticCell;

use logger_core::acquire::BarrierWait;
use logger_core::boot::{self, BootPath, Press, WakeCause};
use logger_core::cycle::{conclude_cycle, CycleInputs};
use logger_core::power::PowerControl;
use logger_core::sensing::ReadingSet;
use logger_core::session::SessionState;

use crate::acquisition::{self, BusGuard};
use crate::diag;
use crate::hw;

mod tasks;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

static SENSOR_BUS: StaticCell<BusGuard<hw::OneWirePorts<'static>>> = StaticCell::new();

fn to_embassy(duration: CoreDuration) -> embassy_time::Duration {
    embassy_time::Duration::from_micros(duration.as_micros().min(u64::MAX.into()) as u64)
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let board = hw::Board::split(hal::init(config));
    let hw::Board {
        mut power,
        mut clock,
        battery,
        sensors,
        mut store,
        button,
        usb_detect,
    } = board;

    let mut session = power.load_retained().unwrap_or_else(SessionState::cold_boot);
    session.note_boot();

    let cause = WakeCause::from_status_bits(power.wake_status_bits());
    let plan = boot::plan(cause, &session.snapshot());
    diag::boot(cause.label(), path_label(plan.path), session.boot_count);

    let sensor_bus = SENSOR_BUS.init(BusGuard::new(sensors));
    spawner
        .spawn(tasks::battery(battery))
        .expect("battery task spawn");
    spawner
        .spawn(tasks::clock_sync())
        .expect("clock task spawn");
    spawner
        .spawn(tasks::sensor_sweep(sensor_bus))
        .expect("sensor task spawn");
    spawner
        .spawn(tasks::button(button))
        .expect("button task spawn");

    // Acquisition barrier: poll until every task reports or the ceiling
    // elapses with stragglers abandoned in place.
    let wait = BarrierWait::DEFAULT;
    let started = Instant::now();
    loop {
        let elapsed = CoreDuration::from_micros(started.elapsed().as_micros());
        if wait.should_release(&acquisition::LATCH, elapsed) {
            break;
        }
        Timer::after(to_embassy(wait.poll)).await;
    }
    let reports = acquisition::LATCH.reports();
    diag::barrier(&reports);

    if plan.path == BootPath::Interactive {
        interactive_window(&mut session, &mut clock, &usb_detect, plan.interactive_window).await;
    }

    let readings = acquisition::SWEEP.try_take().unwrap_or_else(ReadingSet::new);
    let battery_sample = acquisition::BATTERY.try_take();
    let outcome = conclude_cycle(
        &mut session,
        &CycleInputs {
            path: plan.path,
            reports,
            battery_sample,
            readings: &readings,
        },
        &mut clock,
        &mut store,
        &mut power,
    );
    // Unreachable on hardware: conclude_cycle commits to standby.
    diag::sleep(
        outcome.appended,
        outcome.storage_failed,
        outcome.armed.bits(),
        outcome.alarm.map(|plan| plan.minute_of_hour),
    );
}

/// How often the window loop rechecks VBUS while waiting for a press.
const PRESENCE_POLL: embassy_time::Duration = embassy_time::Duration::from_secs(1);

/// Stays awake for the bounded window, folding button holds into the
/// session. A long hold toggles recording. USB presence holds the window
/// open; the countdown restarts when the supply is removed.
async fn interactive_window(
    session: &mut SessionState,
    clock: &mut hw::RtcClock,
    usb_detect: &hal::gpio::Input<'_>,
    window: Option<CoreDuration>,
) {
    use logger_core::time::TimeKeeper;

    if window.is_none() {
        return;
    }
    let mut countdown_from = Instant::now();
    loop {
        if usb_detect.is_high() {
            countdown_from = Instant::now();
        }
        let elapsed = CoreDuration::from_micros(countdown_from.elapsed().as_micros());
        if boot::window_expired(elapsed, usb_detect.is_high()) {
            return;
        }
        match select(acquisition::PRESSES.receive(), Timer::after(PRESENCE_POLL)).await {
            Either::First(held) => {
                let held = CoreDuration::from_micros(held.as_micros());
                if boot::classify_press(held) == Press::Long {
                    if session.recording {
                        session.stop_recording();
                    } else {
                        let _ = session.start_recording(&clock.now());
                    }
                }
            }
            Either::Second(()) => {}
        }
    }
}

const fn path_label(path: BootPath) -> &'static str {
    match path {
        BootPath::SilentAcquisition => "silent",
        BootPath::Interactive => "interactive",
    }
}
