// MedScan - core/mod.rs
//
// Core business logic layer: data model, image queue, preprocessing,
// result reconciliation, history export.
// Must NOT depend on: platform, app, or any async runtime.

pub mod export;
pub mod model;
pub mod preprocess;
pub mod queue;
pub mod reconcile;
