//! Skynet node firmware library.
//!
//! Exposes the lifecycle logic for integration testing.  All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module; other targets get simulation stubs.

#![deny(unused_must_use)]

pub mod address;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod link;
pub mod station;

pub mod adapters;
pub mod drivers;
