// MedScan - app/mod.rs
//
// Application layer: scan orchestration, admission control, the remote
// analysis client.
// Dependencies: core, platform, util.

pub mod cooldown;
pub mod pipeline;
pub mod scan;
pub mod service;
