//! Shared engine services
//!
//! One context is built at startup and handed to every scene and worker
//! task that needs a manager, instead of process-wide singletons.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::ai::behaviors::WorldBounds;
use crate::ai::manager::AiManager;
use crate::config::EngineConfig;
use crate::core::input::{Action, InputState};
use crate::core::thread_pool::{ThreadPool, ThreadPoolError};
use crate::metrics::Metrics;

pub struct EngineContext {
    pub config: EngineConfig,
    pub ai: Arc<AiManager>,
    pub pool: Arc<ThreadPool>,
    pub metrics: Arc<Metrics>,
    pub input: Mutex<InputState>,
}

impl EngineContext {
    /// Build the worker pool and the AI manager wired to it
    pub fn new(config: EngineConfig) -> Result<Self, ThreadPoolError> {
        let pool = Arc::new(ThreadPool::new(config.worker_threads)?);
        let ai = Arc::new(AiManager::new(config.ai_config()));
        ai.set_thread_pool(Some(pool.clone()));

        Ok(Self {
            config,
            ai,
            pool,
            metrics: Arc::new(Metrics::new()),
            input: Mutex::new(InputState::new()),
        })
    }

    pub fn world_bounds(&self) -> WorldBounds {
        WorldBounds::new(self.config.world_width, self.config.world_height)
    }

    /// Drain actions pressed since the last call
    pub fn take_actions(&self) -> Vec<Action> {
        self.input.lock().take_pressed()
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .field("ai", &self.ai)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
