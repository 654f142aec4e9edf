//! Forge simulation core
//!
//! Behavior-driven agent AI, frame pacing and engine orchestration for a
//! real-time 2D game engine.
//!
//! # Features
//!
//! - `parallel_update` - Dispatch AI updates across the worker pool above a size threshold (enabled by default)
//! - `metrics_server` - Serve Prometheus/JSON metrics from the headless runner (enabled by default)
//! - `minimal` - Build without optional features for testing/debugging

pub mod ai;
pub mod config;
pub mod core;
pub mod entity;
pub mod game;
pub mod metrics;
pub mod util;
