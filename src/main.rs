use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use forge_sim::config::EngineConfig;
use forge_sim::core::engine::GameEngine;
use forge_sim::core::input::{Action, InputEvent, ScriptedEvents};
use forge_sim::core::surface::HeadlessSurface;
use forge_sim::game::ai_demo::{self, AiDemoState};
use forge_sim::metrics::Metrics;

/// Cycles the demo through every behavior, then pauses and resumes
fn demo_script() -> ScriptedEvents {
    ScriptedEvents::new()
        .at(180, InputEvent::Action(Action::Patrol))
        .at(360, InputEvent::Action(Action::Chase))
        .at(540, InputEvent::Action(Action::Follow))
        .at(720, InputEvent::Action(Action::TogglePause))
        .at(780, InputEvent::Action(Action::TogglePause))
        .at(900, InputEvent::Action(Action::Wander))
}

#[cfg(feature = "metrics_server")]
fn spawn_metrics_server(metrics: Arc<Metrics>, port: u16) {
    tokio::spawn(async move {
        if let Err(e) = forge_sim::metrics::start_metrics_server(metrics, port).await {
            error!("Metrics server error: {}", e);
        }
    });
}

#[cfg(not(feature = "metrics_server"))]
fn spawn_metrics_server(_metrics: Arc<Metrics>, port: u16) {
    tracing::warn!("METRICS_PORT={} ignored: built without the metrics_server feature", port);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Forge Sim v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load_or_default();
    if let Err(e) = config.validate() {
        anyhow::bail!("invalid configuration: {}", e);
    }
    info!(
        "Configuration loaded: {} FPS, {} workers, {} NPCs, world {}x{}",
        config.target_fps, config.worker_threads, config.npc_count, config.world_width, config.world_height
    );

    let npc_count = config.npc_count;
    let metrics_port = config.metrics_port;

    let mut engine = GameEngine::new(
        config,
        Box::new(HeadlessSurface::new()),
        Box::new(demo_script()),
    )?;
    engine.add_state(Box::new(AiDemoState::new(npc_count)));

    if let Some(port) = metrics_port {
        spawn_metrics_server(engine.context().metrics.clone(), port);
    }

    let running = engine.running_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            running.store(false, Ordering::Release);
        }
    });

    // The frame loop blocks; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        if let Err(e) = engine.init(ai_demo::NAME) {
            if let Err(shutdown) = engine.shutdown() {
                error!("{}", shutdown);
            }
            return Err(e.into());
        }
        let run = engine.run();
        let metrics = engine.context().metrics.to_json();
        let shutdown = engine.shutdown();
        info!("Final metrics: {}", metrics);
        run?;
        shutdown?;
        Ok(())
    })
    .await?;

    if let Err(e) = &result {
        error!("Engine error: {:#}", e);
    }
    result
}
