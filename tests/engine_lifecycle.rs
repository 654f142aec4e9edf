//! Full engine runs against the AI demo scene on a hand-driven clock

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forge_sim::config::EngineConfig;
use forge_sim::core::context::EngineContext;
use forge_sim::core::input::{Action, InputEvent, ScriptedEvents};
use forge_sim::core::surface::Surface;
use forge_sim::core::{EngineError, GameEngine, ManualClock, Subsystem};
use forge_sim::game::ai_demo::{self, AiDemoState};
use forge_sim::game::{GameState, Transition};
use forge_sim::util::vec2::Vec2;

#[derive(Debug, Default)]
struct Frames {
    presented: u64,
    entities: usize,
    closed: bool,
}

/// Surface whose counters outlive the engine that owns it
struct SharedSurface(Arc<Mutex<Frames>>);

impl Surface for SharedSurface {
    fn begin_frame(&mut self) {
        self.0.lock().unwrap().entities = 0;
    }

    fn draw_entity(&mut self, _name: &str, _position: Vec2) {
        self.0.lock().unwrap().entities += 1;
    }

    fn draw_text(&mut self, _text: &str, _position: Vec2) {}

    fn present(&mut self) {
        self.0.lock().unwrap().presented += 1;
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.0.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Wraps the demo and logs every behavior or pause change it makes
struct Observed {
    inner: AiDemoState,
    log: Arc<Mutex<Vec<String>>>,
}

impl Observed {
    fn note(&self) -> String {
        format!(
            "{}{}",
            self.inner.current_behavior(),
            if self.inner.is_paused() { " (paused)" } else { "" }
        )
    }
}

impl GameState for Observed {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn enter(&mut self, ctx: &EngineContext) -> anyhow::Result<()> {
        self.inner.enter(ctx)?;
        self.log.lock().unwrap().push(self.note());
        Ok(())
    }

    fn update(&mut self, ctx: &EngineContext, dt: f32) -> Transition {
        let before = self.note();
        let transition = self.inner.update(ctx, dt);
        let after = self.note();
        if after != before {
            self.log.lock().unwrap().push(after);
        }
        transition
    }

    fn render(&self, surface: &mut dyn Surface) {
        self.inner.render(surface);
    }

    fn exit(&mut self, ctx: &EngineContext) -> anyhow::Result<()> {
        self.inner.exit(ctx)
    }
}

struct Stub {
    name: &'static str,
    fail_init: bool,
    cleaned: AtomicBool,
}

impl Stub {
    fn new(name: &'static str, fail_init: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail_init,
            cleaned: AtomicBool::new(false),
        })
    }
}

impl Subsystem for Stub {
    fn name(&self) -> &str {
        self.name
    }

    fn init(&self) -> anyhow::Result<()> {
        if self.fail_init {
            anyhow::bail!("{} device missing", self.name);
        }
        Ok(())
    }

    fn clean(&self) -> anyhow::Result<()> {
        self.cleaned.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn config(threaded_update: bool, max_frames: u64) -> EngineConfig {
    EngineConfig {
        worker_threads: 2,
        threaded_update,
        world_width: 800.0,
        world_height: 600.0,
        npc_count: 12,
        max_frames: Some(max_frames),
        ..EngineConfig::default()
    }
}

fn demo_engine(
    config: EngineConfig,
    script: ScriptedEvents,
) -> (GameEngine<ManualClock>, Arc<Mutex<Frames>>, Arc<Mutex<Vec<String>>>) {
    let frames = Arc::new(Mutex::new(Frames::default()));
    let log = Arc::new(Mutex::new(Vec::new()));
    let npc_count = config.npc_count;
    let mut engine = GameEngine::with_clock(
        config,
        Box::new(SharedSurface(frames.clone())),
        Box::new(script),
        ManualClock::new(),
    )
    .unwrap();
    engine.add_state(Box::new(Observed {
        inner: AiDemoState::new(npc_count).with_seed(7),
        log: log.clone(),
    }));
    (engine, frames, log)
}

fn cycle_script() -> ScriptedEvents {
    ScriptedEvents::new()
        .at(5, InputEvent::Action(Action::Patrol))
        .at(10, InputEvent::Action(Action::Chase))
        .at(15, InputEvent::Action(Action::Follow))
        .at(20, InputEvent::Action(Action::TogglePause))
        .at(25, InputEvent::Action(Action::TogglePause))
}

fn run_demo(threaded_update: bool) {
    let (mut engine, frames, log) = demo_engine(config(threaded_update, 40), cycle_script());
    let audio = Stub::new("Audio", false);
    engine.add_subsystem(audio.clone());

    engine.init(ai_demo::NAME).unwrap();
    assert_eq!(engine.current_state().as_deref(), Some(ai_demo::NAME));
    assert_eq!(engine.context().ai.managed_entity_count(), 12);

    engine.run().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["Wander", "Patrol", "Chase", "Follow", "Follow (paused)", "Follow"]
    );

    let metrics = &engine.context().metrics;
    assert_eq!(metrics.frame_count.load(Ordering::Relaxed), 40);
    // The first frame only establishes the clock baseline
    assert_eq!(metrics.update_count.load(Ordering::Relaxed), 39);
    assert_eq!(metrics.ai_entities.load(Ordering::Relaxed), 12);
    assert_eq!(metrics.ai_behaviors.load(Ordering::Relaxed), 4);
    assert!(metrics.to_prometheus().contains("forge_sim_frames_total 40"));

    {
        let frames = frames.lock().unwrap();
        assert_eq!(frames.presented, 40);
        // Every NPC plus the player
        assert_eq!(frames.entities, 13);
    }

    engine.shutdown().unwrap();

    let ctx = engine.context();
    assert!(ctx.pool.is_shutdown());
    assert_eq!(ctx.ai.managed_entity_count(), 0);
    assert_eq!(ctx.ai.behavior_count(), 0);
    assert!(ctx.ai.player_target().is_none());
    assert!(audio.cleaned.load(Ordering::SeqCst));
    assert!(frames.lock().unwrap().closed);
    assert_eq!(engine.current_state(), None);
}

#[test]
fn test_demo_runs_threaded() {
    run_demo(true);
}

#[test]
fn test_demo_runs_inline() {
    run_demo(false);
}

#[test]
fn test_exit_action_quits_engine() {
    let script = ScriptedEvents::new().at(8, InputEvent::Action(Action::Exit));
    let (mut engine, _frames, _log) = demo_engine(config(true, 1000), script);

    engine.init(ai_demo::NAME).unwrap();
    engine.run().unwrap();

    assert!(!engine.is_running());
    assert_eq!(engine.context().metrics.frame_count.load(Ordering::Relaxed), 9);
    engine.shutdown().unwrap();
}

#[test]
fn test_init_reports_every_failed_subsystem() {
    let (mut engine, frames, _log) = demo_engine(config(true, 10), ScriptedEvents::new());
    let audio = Stub::new("Audio", true);
    let fonts = Stub::new("Fonts", false);
    let window = Stub::new("Window", true);
    engine.add_subsystem(audio.clone());
    engine.add_subsystem(fonts.clone());
    engine.add_main_thread_subsystem(window.clone());

    let err = engine.init(ai_demo::NAME).unwrap_err();
    let EngineError::Initialization { failures } = &err else {
        panic!("unexpected error: {err}");
    };
    let mut failed: Vec<_> = failures.iter().map(|f| f.subsystem.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["Audio", "Window"]);
    assert!(err.to_string().contains("Audio device missing"));
    assert!(!engine.is_initialized());
    assert_eq!(engine.current_state(), None);
    assert!(matches!(engine.run(), Err(EngineError::InvalidState(_))));

    // Teardown after a failed start still reaches everything
    engine.shutdown().unwrap();
    for stub in [&audio, &fonts, &window] {
        assert!(stub.cleaned.load(Ordering::SeqCst), "{} not cleaned", stub.name);
    }
    assert!(frames.lock().unwrap().closed);
}

#[test]
fn test_shutdown_continues_past_drain_timeout() {
    let mut config = config(true, 3);
    config.shutdown_timeout = Duration::from_millis(20);
    let (mut engine, frames, _log) = demo_engine(config, ScriptedEvents::new());
    let audio = Stub::new("Audio", false);
    engine.add_subsystem(audio.clone());
    engine.init(ai_demo::NAME).unwrap();
    engine.run().unwrap();

    engine
        .context()
        .pool
        .enqueue_task(|| std::thread::sleep(Duration::from_millis(300)))
        .unwrap();

    let err = engine.shutdown().unwrap_err();
    let EngineError::Shutdown { failures } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].step, "drain worker pool");

    assert!(audio.cleaned.load(Ordering::SeqCst));
    assert!(engine.context().pool.is_shutdown());
    assert!(frames.lock().unwrap().closed);
    assert_eq!(engine.context().ai.managed_entity_count(), 0);

    // Already shut down
    assert!(engine.shutdown().is_ok());
}
