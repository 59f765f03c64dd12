// pg-startup-profiler - app/mod.rs
//
// Application layer: rules loading and profiling session orchestration.
// Dependencies: core layer.
// Must NOT depend on: platform specifics.

pub mod rules_mgr;
pub mod session;
