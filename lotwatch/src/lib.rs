// THEORY:
// This file is the main entry point for the `lotwatch` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (like the `lotwatch_monitor`
// runner).
//
// The primary goal is to export the `MonitorPipeline` and its associated data
// structures (`GridConfig`, `FrameReport`, `RunSummary`, and the source/sink
// traits) as the clean, high-level interface for the whole counting engine.
// The internal modules (`core_modules`) are encapsulated behind it, keeping the
// analysis logic independent of any particular video library or window system.

pub mod core_modules;
pub mod pipeline;
