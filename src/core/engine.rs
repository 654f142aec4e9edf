//! Engine orchestration
//!
//! Startup fans independent subsystem initialization out to the worker pool
//! while main-thread subsystems run on the caller, then joins every task and
//! reports all failures together. The frame loop is events, update, render;
//! the update may run on a worker while the main thread waits for it.
//! Shutdown runs a fixed sequence of steps and keeps going past failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::core::context::EngineContext;
use crate::core::frame_sync::FrameSync;
use crate::core::input::{EventSource, InputEvent};
use crate::core::performance::PerformanceMonitor;
use crate::core::subsystem::Subsystem;
use crate::core::surface::Surface;
use crate::core::thread_pool::{TaskHandle, ThreadPoolError};
use crate::core::timestep::{Clock, SystemClock, TimestepManager};
use crate::game::state::{GameState, GameStateManager, Transition};
use crate::util::vec2::Vec2;

/// A subsystem that failed to come up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitFailure {
    pub subsystem: String,
    pub reason: String,
}

/// A shutdown step that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownFailure {
    pub step: String,
    pub reason: String,
}

impl std::fmt::Display for InitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.subsystem, self.reason)
    }
}

impl std::fmt::Display for ShutdownFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.step, self.reason)
    }
}

fn join_failures<T: std::fmt::Display>(failures: &[T]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("initialization failed ({} subsystem(s)): {}", .failures.len(), join_failures(.failures))]
    Initialization { failures: Vec<InitFailure> },
    #[error("shutdown finished with errors: {}", join_failures(.failures))]
    Shutdown { failures: Vec<ShutdownFailure> },
    #[error("invalid engine state: {0}")]
    InvalidState(String),
    #[error("game state error: {0}")]
    State(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    ThreadPool(#[from] ThreadPoolError),
}

struct RegisteredSubsystem {
    subsystem: Arc<dyn Subsystem>,
    main_thread: bool,
}

/// The part of the engine a worker thread can drive
pub(crate) struct EngineCore {
    context: Arc<EngineContext>,
    states: Mutex<GameStateManager>,
    sync: FrameSync,
    running: Arc<AtomicBool>,
    performance: Mutex<PerformanceMonitor>,
}

impl EngineCore {
    /// One simulation step: scene logic, then AI dispatch
    fn update(&self, dt: f32) {
        let _guard = self.sync.begin_update();
        let started = Instant::now();

        let transition = self.states.lock().update(&self.context, dt);
        match transition {
            Ok(Transition::Quit) => {
                info!("Scene requested quit");
                self.running.store(false, Ordering::Release);
            }
            Ok(_) => {}
            Err(e) => error!("Game state update failed: {:#}", e),
        }

        self.context.ai.update(dt);

        let elapsed = started.elapsed();
        let ai_stats = self.context.ai.stats();
        let metrics = &self.context.metrics;
        metrics.record_update_time(elapsed);
        metrics.record_ai(&ai_stats);
        metrics.record_pool(&self.context.pool.stats());

        let mut performance = self.performance.lock();
        if let Some(status) = performance.record_frame(elapsed, ai_stats.managed_entities) {
            if status.can_add_entities() {
                info!("Performance: {}", performance.status_message());
            } else {
                warn!("Performance: {}", performance.status_message());
            }
        }
        metrics.record_performance(performance.status(), performance.budget_usage_percent());
    }
}

pub struct GameEngine<C: Clock = SystemClock> {
    core: Arc<EngineCore>,
    timestep: TimestepManager<C>,
    surface: Box<dyn Surface>,
    events: Box<dyn EventSource>,
    subsystems: Vec<RegisteredSubsystem>,
    initialized: bool,
    shut_down: bool,
}

impl GameEngine<SystemClock> {
    pub fn new(
        config: EngineConfig,
        surface: Box<dyn Surface>,
        events: Box<dyn EventSource>,
    ) -> Result<Self, EngineError> {
        Self::with_clock(config, surface, events, SystemClock::new())
    }
}

impl<C: Clock> GameEngine<C> {
    pub fn with_clock(
        config: EngineConfig,
        surface: Box<dyn Surface>,
        events: Box<dyn EventSource>,
        clock: C,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;

        let mut timestep = TimestepManager::with_clock(config.target_fps, config.fixed_timestep, clock);
        timestep.set_max_frame_delta(config.max_frame_delta);
        if config.software_frame_limiting {
            timestep.set_software_frame_limiting(true);
        }

        let performance = PerformanceMonitor::new(config.target_fps);
        let context = Arc::new(EngineContext::new(config)?);

        let mut engine = Self {
            core: Arc::new(EngineCore {
                context: context.clone(),
                states: Mutex::new(GameStateManager::new()),
                sync: FrameSync::new(),
                running: Arc::new(AtomicBool::new(false)),
                performance: Mutex::new(performance),
            }),
            timestep,
            surface,
            events,
            subsystems: Vec::new(),
            initialized: false,
            shut_down: false,
        };
        // First registered, last torn down
        engine.add_subsystem(context.ai.clone());
        Ok(engine)
    }

    /// Register a subsystem initialized on the worker pool
    pub fn add_subsystem(&mut self, subsystem: Arc<dyn Subsystem>) {
        debug!("Registered subsystem '{}'", subsystem.name());
        self.subsystems.push(RegisteredSubsystem {
            subsystem,
            main_thread: false,
        });
    }

    /// Register a subsystem initialized on the calling thread (e.g. one
    /// that needs the rendering context)
    pub fn add_main_thread_subsystem(&mut self, subsystem: Arc<dyn Subsystem>) {
        debug!("Registered main-thread subsystem '{}'", subsystem.name());
        self.subsystems.push(RegisteredSubsystem {
            subsystem,
            main_thread: true,
        });
    }

    pub fn add_state(&mut self, state: Box<dyn GameState>) -> bool {
        self.core.states.lock().add_state(state)
    }

    /// Bring every subsystem up, then enter `initial_state`.
    ///
    /// Worker-pool tasks and main-thread setup run concurrently; all of them
    /// are joined before any failure is reported.
    pub fn init(&mut self, initial_state: &str) -> Result<(), EngineError> {
        if self.initialized {
            return Err(EngineError::InvalidState("engine already initialized".to_string()));
        }
        if self.shut_down {
            return Err(EngineError::InvalidState("engine has been shut down".to_string()));
        }

        info!("Initializing {} subsystem(s)", self.subsystems.len());
        let started = Instant::now();
        let pool = &self.core.context.pool;

        let mut tasks: SmallVec<[(String, TaskHandle<anyhow::Result<()>>); 8]> = SmallVec::new();
        let mut failures = Vec::new();

        for registered in self.subsystems.iter().filter(|r| !r.main_thread) {
            let subsystem = registered.subsystem.clone();
            let name = subsystem.name().to_string();
            debug!("Starting '{}' on the worker pool", name);
            match pool.enqueue_task_with_result(move || subsystem.init()) {
                Ok(handle) => tasks.push((name, handle)),
                Err(e) => failures.push(InitFailure {
                    subsystem: name,
                    reason: e.to_string(),
                }),
            }
        }

        for registered in self.subsystems.iter().filter(|r| r.main_thread) {
            let name = registered.subsystem.name().to_string();
            debug!("Starting '{}' on the main thread", name);
            match registered.subsystem.init() {
                Ok(()) => info!("Subsystem '{}' ready", name),
                Err(e) => failures.push(InitFailure {
                    subsystem: name,
                    reason: format!("{:#}", e),
                }),
            }
        }

        for (name, handle) in tasks {
            match handle.wait() {
                Ok(Ok(())) => info!("Subsystem '{}' ready", name),
                Ok(Err(e)) => failures.push(InitFailure {
                    subsystem: name,
                    reason: format!("{:#}", e),
                }),
                Err(e) => failures.push(InitFailure {
                    subsystem: name,
                    reason: e.to_string(),
                }),
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                error!("Subsystem '{}' failed to initialize: {}", failure.subsystem, failure.reason);
            }
            return Err(EngineError::Initialization { failures });
        }

        self.core
            .states
            .lock()
            .change_state(&self.core.context, initial_state)
            .map_err(|e| EngineError::State(format!("{:#}", e)))?;

        self.initialized = true;
        self.core.running.store(true, Ordering::Release);
        info!("Engine initialized in {:?}", started.elapsed());
        Ok(())
    }

    /// Frame loop; returns once stopped or `max_frames` is reached
    pub fn run(&mut self) -> Result<(), EngineError> {
        if !self.initialized || self.shut_down {
            return Err(EngineError::InvalidState("engine is not initialized".to_string()));
        }

        let max_frames = self.core.context.config.max_frames;
        let mut frames: u64 = 0;
        info!("Entering main loop at {} FPS target", self.timestep.target_fps());

        while self.is_running() {
            let frame_started = Instant::now();
            self.timestep.start_frame();
            self.handle_events();

            if self.timestep.should_update() {
                let dt = self.timestep.get_update_delta_time();
                self.update(dt);
                self.wait_for_update();
            }

            if self.timestep.should_render() {
                self.render();
            }

            self.timestep.end_frame();
            self.core
                .context
                .metrics
                .record_frame(self.timestep.get_current_fps(), frame_started.elapsed());

            frames += 1;
            if max_frames.is_some_and(|max| frames >= max) {
                info!("Reached frame limit ({})", frames);
                self.stop();
            }
        }

        info!("Main loop exited after {} frame(s)", frames);
        Ok(())
    }

    /// Poll the event source into the shared input state
    pub fn handle_events(&mut self) {
        let events = self.events.poll();
        if events.is_empty() {
            return;
        }

        let mut input = self.core.context.input.lock();
        for event in events {
            match event {
                InputEvent::Quit => {
                    info!("Quit requested");
                    input.apply(event);
                    self.core.running.store(false, Ordering::Release);
                }
                InputEvent::Action(_) => input.apply(event),
            }
        }
    }

    /// Start one update. With threaded updates the work runs on the pool
    /// and the caller pairs this with [`wait_for_update`](Self::wait_for_update).
    pub fn update(&self, dt: f32) {
        if self.core.context.config.threaded_update {
            let core = self.core.clone();
            match self.core.context.pool.enqueue_task(move || core.update(dt)) {
                Ok(()) => return,
                Err(e) => warn!("Running update inline: {}", e),
            }
        }
        self.core.update(dt);
    }

    pub fn wait_for_update(&self) {
        self.core.sync.wait_for_update();
    }

    pub fn signal_update_complete(&self) {
        self.core.sync.signal_update_complete();
    }

    /// Draw the current scene on the owning thread
    pub fn render(&mut self) {
        let _render = self.core.sync.lock_render();
        let started = Instant::now();

        self.surface.begin_frame();
        self.core.states.lock().render(self.surface.as_mut());
        let fps = format!("FPS: {:.0}", self.timestep.get_current_fps());
        self.surface.draw_text(&fps, Vec2::new(8.0, 8.0));
        self.surface.present();

        self.core.context.metrics.record_render_time(started.elapsed());
    }

    /// Ordered teardown: drain the pool, clear the scenes, clean subsystems
    /// in reverse registration order, close the pool, close the surface.
    /// Every step runs even if an earlier one fails.
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        if self.shut_down {
            return Ok(());
        }
        self.stop();
        info!("Shutting down");

        let mut failures = Vec::new();
        let mut record = |step: &str, reason: String| {
            error!("Shutdown step '{}' failed: {}", step, reason);
            failures.push(ShutdownFailure {
                step: step.to_string(),
                reason,
            });
        };

        let context = &self.core.context;
        let timeout: Duration = context.config.shutdown_timeout;

        match context.pool.wait_for_idle(timeout) {
            Ok(()) => info!("Worker pool drained"),
            Err(e) => record("drain worker pool", e.to_string()),
        }

        match self.core.states.lock().clear(context) {
            Ok(()) => info!("Game states cleared"),
            Err(e) => record("game states", format!("{:#}", e)),
        }

        for registered in self.subsystems.iter().rev() {
            let name = registered.subsystem.name();
            match registered.subsystem.clean() {
                Ok(()) => info!("Subsystem '{}' cleaned", name),
                Err(e) => record(name, format!("{:#}", e)),
            }
        }

        context.pool.clean();
        info!("Worker pool closed");

        match self.surface.close() {
            Ok(()) => info!("Surface closed"),
            Err(e) => record("surface", format!("{:#}", e)),
        }

        self.shut_down = true;
        self.initialized = false;

        if failures.is_empty() {
            info!("Shutdown complete");
            Ok(())
        } else {
            Err(EngineError::Shutdown { failures })
        }
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.core.running.store(false, Ordering::Release);
    }

    /// Flag shared with signal handlers; storing `false` stops the loop
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.core.running.clone()
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.core.context
    }

    pub fn current_state(&self) -> Option<String> {
        self.core.states.lock().current_state().map(str::to_string)
    }

    pub fn timestep(&self) -> &TimestepManager<C> {
        &self.timestep
    }

    pub fn timestep_mut(&mut self) -> &mut TimestepManager<C> {
        &mut self.timestep
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl<C: Clock> std::fmt::Debug for GameEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameEngine")
            .field("subsystems", &self.subsystems.len())
            .field("initialized", &self.initialized)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::ScriptedEvents;
    use crate::core::surface::HeadlessSurface;
    use crate::core::timestep::ManualClock;
    use std::sync::atomic::AtomicUsize;

    struct Stub {
        name: &'static str,
        fail: bool,
        order: Arc<Mutex<Vec<String>>>,
        init_thread: Mutex<Option<std::thread::ThreadId>>,
    }

    impl Stub {
        fn new(name: &'static str, fail: bool, order: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                order: order.clone(),
                init_thread: Mutex::new(None),
            })
        }
    }

    impl Subsystem for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&self) -> anyhow::Result<()> {
            *self.init_thread.lock() = Some(std::thread::current().id());
            if self.fail {
                anyhow::bail!("{} unavailable", self.name);
            }
            Ok(())
        }

        fn clean(&self) -> anyhow::Result<()> {
            self.order.lock().push(self.name.to_string());
            Ok(())
        }
    }

    struct Idle {
        updates: Arc<AtomicUsize>,
    }

    impl GameState for Idle {
        fn name(&self) -> &str {
            "Idle"
        }

        fn enter(&mut self, _ctx: &EngineContext) -> anyhow::Result<()> {
            Ok(())
        }

        fn update(&mut self, _ctx: &EngineContext, _dt: f32) -> Transition {
            self.updates.fetch_add(1, Ordering::Relaxed);
            Transition::None
        }

        fn render(&self, _surface: &mut dyn Surface) {}

        fn exit(&mut self, _ctx: &EngineContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn engine(threaded: bool) -> GameEngine<ManualClock> {
        let config = EngineConfig {
            worker_threads: 2,
            threaded_update: threaded,
            max_frames: Some(5),
            ..EngineConfig::default()
        };
        GameEngine::with_clock(
            config,
            Box::new(HeadlessSurface::new()),
            Box::new(ScriptedEvents::new()),
            ManualClock::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_init_aggregates_failures() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine(false);
        engine.add_subsystem(Stub::new("audio", true, &order));
        engine.add_subsystem(Stub::new("fonts", false, &order));
        engine.add_main_thread_subsystem(Stub::new("textures", true, &order));

        let err = engine.init("Idle").unwrap_err();
        match err {
            EngineError::Initialization { failures } => {
                let names: Vec<_> = failures.iter().map(|f| f.subsystem.as_str()).collect();
                assert_eq!(failures.len(), 2);
                assert!(names.contains(&"audio"));
                assert!(names.contains(&"textures"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!engine.is_running());
    }

    #[test]
    fn test_main_thread_subsystem_runs_on_caller() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let textures = Stub::new("textures", false, &order);
        let mut engine = engine(false);
        engine.add_main_thread_subsystem(textures.clone());
        engine.add_state(Box::new(Idle {
            updates: Arc::new(AtomicUsize::new(0)),
        }));

        engine.init("Idle").unwrap();
        assert_eq!(*textures.init_thread.lock(), Some(std::thread::current().id()));
    }

    #[test]
    fn test_unknown_initial_state() {
        let mut engine = engine(false);
        assert!(matches!(engine.init("Missing"), Err(EngineError::State(_))));
    }

    #[test]
    fn test_run_stops_at_frame_limit() {
        for threaded in [false, true] {
            let updates = Arc::new(AtomicUsize::new(0));
            let mut engine = engine(threaded);
            engine.add_state(Box::new(Idle {
                updates: updates.clone(),
            }));
            engine.init("Idle").unwrap();
            engine.run().unwrap();

            // The first frame only records a baseline
            assert_eq!(updates.load(Ordering::Relaxed), 4);
            assert!(!engine.is_running());
            engine.shutdown().unwrap();
        }
    }

    #[test]
    fn test_shutdown_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine(false);
        engine.add_subsystem(Stub::new("input", false, &order));
        engine.add_subsystem(Stub::new("audio", false, &order));
        engine.add_state(Box::new(Idle {
            updates: Arc::new(AtomicUsize::new(0)),
        }));
        engine.init("Idle").unwrap();

        engine.shutdown().unwrap();
        assert_eq!(*order.lock(), vec!["audio", "input"]);
        assert!(engine.context().pool.is_shutdown());
        assert!(engine.shutdown().is_ok());
    }

    #[test]
    fn test_quit_event_stops_loop() {
        let config = EngineConfig {
            worker_threads: 1,
            ..EngineConfig::default()
        };
        let mut engine = GameEngine::with_clock(
            config,
            Box::new(HeadlessSurface::new()),
            Box::new(ScriptedEvents::new().at(2, InputEvent::Quit)),
            ManualClock::new(),
        )
        .unwrap();
        engine.add_state(Box::new(Idle {
            updates: Arc::new(AtomicUsize::new(0)),
        }));
        engine.init("Idle").unwrap();
        engine.run().unwrap();

        assert_eq!(engine.timestep().frame_count(), 3);
        engine.shutdown().unwrap();
    }

    #[test]
    fn test_run_requires_init() {
        let mut engine = engine(false);
        assert!(matches!(engine.run(), Err(EngineError::InvalidState(_))));
    }
}
