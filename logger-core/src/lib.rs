#![no_std]

// Shared logic for the environmental logger power-cycle feature set.
//
// This crate stays portable across MCU firmware and host tooling by avoiding
// the Rust standard library and exposing abstractions the other crates can
// adopt: the retained session record, wake-cause dispatch, the acquisition
// completion latch, alarm alignment, and the sleep arbiter.
pub mod acquire;
pub mod boot;
pub mod console;
pub mod cycle;
pub mod power;
pub mod record;
pub mod schedule;
pub mod sensing;
pub mod session;
pub mod time;
