//! Engine core
//!
//! Structure:
//! - `timestep`: frame pacing and delta time
//! - `thread_pool`: worker pool with result handles and a bounded drain
//! - `frame_sync`: update/render handoff between threads
//! - `performance`: frame budget monitoring
//! - `subsystem`, `input`, `surface`: interfaces to external collaborators
//! - `context`: shared managers passed to scenes
//! - `engine`: startup, frame loop and ordered shutdown

pub mod context;
pub mod engine;
pub mod frame_sync;
pub mod input;
pub mod performance;
pub mod subsystem;
pub mod surface;
pub mod thread_pool;
pub mod timestep;

pub use context::EngineContext;
pub use engine::{EngineError, GameEngine, InitFailure, ShutdownFailure};
pub use subsystem::Subsystem;
pub use thread_pool::{TaskError, TaskHandle, ThreadPool, ThreadPoolError};
pub use timestep::{Clock, ManualClock, SystemClock, TimestepManager};
