// MedScan - platform/mod.rs
//
// Platform abstraction layer: wall clock, durable storage, file input,
// configuration and data directories.
// Must NOT depend on: app.

pub mod clock;
pub mod config;
pub mod fs;
pub mod store;
