// pg-startup-profiler - core/mod.rs
//
// Core business logic layer.
// Dependencies: standard library plus parsing/serialisation crates.
// Must NOT depend on: app, platform, or any file/process I/O.

pub mod classifier;
pub mod compare;
pub mod export;
pub mod model;
pub mod rules;
pub mod source;
pub mod timeline;
