//! Acquisition tasks and the boot completion barrier.
//!
//! Every boot launches the same three units of work concurrently: the battery
//! estimator, the clock resync, and the sensor sweep. The boot sequence then
//! polls a shared [`CompletionLatch`] until all tasks have arrived or the
//! bounded ceiling elapses. Tasks are never cancelled: one that misses the
//! ceiling is abandoned in place and its result treated as missing: the
//! battery keeps its previous smoothed value, an unread sensor stays marked
//! disconnected. Boot therefore reaches the sleep decision in bounded time.

use core::time::Duration;

use portable_atomic::{AtomicU8, Ordering};

/// Number of acquisition units launched per boot.
pub const TASK_COUNT: usize = 3;

/// Identity of a concurrent acquisition unit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskId {
    Battery,
    ClockSync,
    Sensors,
}

/// Every task, in latch-bit order.
pub const ALL_TASKS: [TaskId; TASK_COUNT] = [TaskId::Battery, TaskId::ClockSync, TaskId::Sensors];

impl TaskId {
    /// Deterministic latch bit for this task.
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            TaskId::Battery => 1 << 0,
            TaskId::ClockSync => 1 << 1,
            TaskId::Sensors => 1 << 2,
        }
    }

    /// Short label for boot logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            TaskId::Battery => "battery",
            TaskId::ClockSync => "clock-sync",
            TaskId::Sensors => "sensors",
        }
    }
}

/// Outcome of one acquisition unit, read after the barrier releases.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskReport {
    /// Arrived within the ceiling with no fault flagged.
    Done,
    /// Arrived, but flagged a peripheral failure (sensor disconnected,
    /// resync unreachable). Recorded per-reading, never fatal.
    Faulted,
    /// Missed the ceiling; abandoned in place, result treated as stale.
    TimedOut,
}

const EXPECTED_MASK: u8 = TaskId::Battery.bit() | TaskId::ClockSync.bit() | TaskId::Sensors.bit();

/// Countdown latch the acquisition tasks arrive at.
///
/// Arrival and fault bits are plain atomics so the same type serves the
/// firmware tasks and host threads. The boot sequence owns the latch and is
/// the only reader of [`report`](Self::report) after release.
#[derive(Debug, Default)]
pub struct CompletionLatch {
    arrived: AtomicU8,
    faulted: AtomicU8,
}

impl CompletionLatch {
    /// Fresh latch expecting all [`TASK_COUNT`] tasks.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            arrived: AtomicU8::new(0),
            faulted: AtomicU8::new(0),
        }
    }

    /// Marks a task as finished. Idempotent.
    pub fn arrive(&self, id: TaskId) {
        self.arrived.fetch_or(id.bit(), Ordering::Release);
    }

    /// Flags a peripheral failure for a task. Does not imply arrival.
    pub fn flag_fault(&self, id: TaskId) {
        self.faulted.fetch_or(id.bit(), Ordering::Release);
    }

    /// Returns `true` once every expected task has arrived.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.arrived.load(Ordering::Acquire) & EXPECTED_MASK == EXPECTED_MASK
    }

    /// Number of tasks that have arrived so far.
    #[must_use]
    pub fn arrived_count(&self) -> usize {
        (self.arrived.load(Ordering::Acquire) & EXPECTED_MASK).count_ones() as usize
    }

    /// Per-task outcome. Meaningful once the barrier has released or the
    /// ceiling has elapsed.
    #[must_use]
    pub fn report(&self, id: TaskId) -> TaskReport {
        let arrived = self.arrived.load(Ordering::Acquire) & id.bit() != 0;
        let faulted = self.faulted.load(Ordering::Acquire) & id.bit() != 0;
        match (arrived, faulted) {
            (true, false) => TaskReport::Done,
            (true, true) => TaskReport::Faulted,
            (false, _) => TaskReport::TimedOut,
        }
    }

    /// Outcomes for every task, in [`ALL_TASKS`] order.
    #[must_use]
    pub fn reports(&self) -> [TaskReport; TASK_COUNT] {
        [
            self.report(TaskId::Battery),
            self.report(TaskId::ClockSync),
            self.report(TaskId::Sensors),
        ]
    }
}

/// Barrier polling parameters.
///
/// Polling (rather than a blocking wait) keeps the boot sequence bounded and
/// simple; the latency of one poll interval is noise next to multi-second
/// sensor conversion delays.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BarrierWait {
    /// Interval between latch checks.
    pub poll: Duration,
    /// Upper bound on the total wait before proceeding with stragglers.
    pub ceiling: Duration,
}

impl BarrierWait {
    /// Production parameters: 25 ms poll, 10 s ceiling.
    pub const DEFAULT: Self = Self {
        poll: Duration::from_millis(25),
        ceiling: Duration::from_secs(10),
    };

    /// Returns `true` when the boot sequence may proceed: every task arrived
    /// (early release) or the ceiling elapsed (stragglers abandoned).
    #[must_use]
    pub fn should_release(&self, latch: &CompletionLatch, elapsed: Duration) -> bool {
        latch.is_released() || elapsed >= self.ceiling
    }
}

impl Default for BarrierWait {
    fn default() -> Self {
        Self::DEFAULT
    }
}
