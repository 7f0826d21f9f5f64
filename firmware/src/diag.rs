//! defmt / console logging helpers for the boot sequence.
//!
//! The runtime emits a handful of fixed diagnostic lines per cycle. Keeping
//! them behind one seam means the target build goes through defmt while host
//! builds of the same call sites print to stdout.

#![allow(dead_code)]

use logger_core::acquire::{TaskReport, ALL_TASKS, TASK_COUNT};

/// One line at boot: wake cause and the dispatched path.
pub fn boot(cause: &'static str, path: &'static str, boot_count: u16) {
    #[cfg(target_os = "none")]
    defmt::info!("boot #{} cause={} path={}", boot_count, cause, path);
    #[cfg(not(target_os = "none"))]
    println!("boot #{boot_count} cause={cause} path={path}");
}

/// One line after the barrier: which tasks straggled or faulted.
pub fn barrier(reports: &[TaskReport; TASK_COUNT]) {
    for (id, report) in ALL_TASKS.iter().zip(reports) {
        match report {
            TaskReport::Done => {}
            TaskReport::Faulted => warn_task(id.label(), "faulted"),
            TaskReport::TimedOut => warn_task(id.label(), "timed out"),
        }
    }
}

/// One line before sleep: what got written and what is armed.
pub fn sleep(appended: bool, storage_failed: bool, armed_bits: u8, alarm_minute: Option<u8>) {
    #[cfg(target_os = "none")]
    match alarm_minute {
        Some(minute) => defmt::info!(
            "sleep appended={} storage_failed={} armed={:#04x} alarm=:{:02}",
            appended,
            storage_failed,
            armed_bits,
            minute
        ),
        None => defmt::info!(
            "sleep appended={} storage_failed={} armed={:#04x}",
            appended,
            storage_failed,
            armed_bits
        ),
    }
    #[cfg(not(target_os = "none"))]
    match alarm_minute {
        Some(minute) => println!(
            "sleep appended={appended} storage_failed={storage_failed} armed={armed_bits:#04x} alarm=:{minute:02}"
        ),
        None => println!(
            "sleep appended={appended} storage_failed={storage_failed} armed={armed_bits:#04x}"
        ),
    }
}

fn warn_task(label: &'static str, what: &'static str) {
    #[cfg(target_os = "none")]
    defmt::warn!("task {} {}", label, what);
    #[cfg(not(target_os = "none"))]
    println!("task {label} {what}");
}
