use std::str::FromStr;
use std::time::Duration;

use crate::ai::manager::AiConfig;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Frame rate the limiter paces to
    pub target_fps: f32,
    /// Update delta used under software frame limiting (seconds)
    pub fixed_timestep: f32,
    /// Use the fixed timestep instead of the measured delta
    pub software_frame_limiting: bool,
    /// Longest delta a single frame may feed the simulation (seconds)
    pub max_frame_delta: f32,
    /// Worker pool size
    pub worker_threads: usize,
    /// Upper bound on the shutdown drain of the worker pool
    pub shutdown_timeout: Duration,
    /// Run the update phase on a worker while the main thread waits
    pub threaded_update: bool,
    pub world_width: f32,
    pub world_height: f32,
    /// NPCs spawned by the demo scene
    pub npc_count: usize,
    /// Assignments above which AI dispatch runs in parallel
    pub ai_parallel_threshold: usize,
    /// Ticks between expired-entity sweeps
    pub ai_housekeeping_ticks: u64,
    /// Stop the headless runner after this many frames
    pub max_frames: Option<u64>,
    /// Serve metrics over HTTP on this port
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1);

        Self {
            target_fps: 60.0,
            fixed_timestep: 1.0 / 60.0,
            software_frame_limiting: false,
            max_frame_delta: 0.25,
            worker_threads: workers,
            shutdown_timeout: Duration::from_millis(5000),
            threaded_update: true,
            world_width: 1280.0,
            world_height: 720.0,
            npc_count: 24,
            ai_parallel_threshold: 64,
            ai_housekeeping_ticks: 60,
            max_frames: None,
            metrics_port: None,
        }
    }
}

/// Parse `key` from `lookup`, keeping `None` (and warning) when the value
/// is malformed or fails `accept`
fn parse_var<T, L>(lookup: &L, key: &str, accept: impl Fn(&T) -> bool, rule: &str) -> Option<T>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if accept(&value) => Some(value),
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", key, rule);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

fn parse_flag<L>(lookup: &L, key: &str) -> Option<bool>
where
    L: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

impl EngineConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load config from an arbitrary variable lookup
    pub fn load_from<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(fps) = parse_var(&lookup, "TARGET_FPS", |v: &f32| *v > 0.0 && *v <= 1000.0, "in (0, 1000]") {
            config.target_fps = fps;
            config.fixed_timestep = 1.0 / fps;
        }
        if let Some(step) = parse_var(&lookup, "FIXED_TIMESTEP", |v: &f32| *v > 0.0 && *v <= 1.0, "in (0, 1]") {
            config.fixed_timestep = step;
        }
        if let Some(flag) = parse_flag(&lookup, "SOFTWARE_FRAME_LIMITING") {
            config.software_frame_limiting = flag;
        }
        if let Some(delta) = parse_var(&lookup, "MAX_FRAME_DELTA", |v: &f32| *v > 0.0 && *v <= 5.0, "in (0, 5]") {
            config.max_frame_delta = delta;
        }
        if let Some(workers) = parse_var(&lookup, "WORKER_THREADS", |v: &usize| (1..=256).contains(v), "1-256") {
            config.worker_threads = workers;
        }
        if let Some(ms) = parse_var(&lookup, "SHUTDOWN_TIMEOUT_MS", |v: &u64| *v > 0, "> 0") {
            config.shutdown_timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = parse_flag(&lookup, "THREADED_UPDATE") {
            config.threaded_update = flag;
        }
        if let Some(width) = parse_var(&lookup, "WORLD_WIDTH", |v: &f32| *v > 0.0, "> 0") {
            config.world_width = width;
        }
        if let Some(height) = parse_var(&lookup, "WORLD_HEIGHT", |v: &f32| *v > 0.0, "> 0") {
            config.world_height = height;
        }
        if let Some(count) = parse_var(&lookup, "NPC_COUNT", |v: &usize| *v <= 100_000, "0-100000") {
            config.npc_count = count;
        }
        if let Some(threshold) = parse_var(&lookup, "AI_PARALLEL_THRESHOLD", |_: &usize| true, "a count") {
            config.ai_parallel_threshold = threshold;
        }
        if let Some(ticks) = parse_var(&lookup, "AI_HOUSEKEEPING_TICKS", |_: &u64| true, "a count") {
            config.ai_housekeeping_ticks = ticks;
        }
        if let Some(frames) = parse_var(&lookup, "MAX_FRAMES", |v: &u64| *v > 0, "> 0") {
            config.max_frames = Some(frames);
        }
        if let Some(port) = parse_var(&lookup, "METRICS_PORT", |v: &u16| *v > 0, "> 0") {
            config.metrics_port = Some(port);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.target_fps <= 0.0 {
            return Err("target_fps must be positive".to_string());
        }
        if self.fixed_timestep <= 0.0 {
            return Err("fixed_timestep must be positive".to_string());
        }
        if self.max_frame_delta <= 0.0 {
            return Err("max_frame_delta must be positive".to_string());
        }
        if self.worker_threads == 0 {
            return Err("worker_threads must be at least 1".to_string());
        }
        if self.world_width <= 0.0 || self.world_height <= 0.0 {
            return Err("world dimensions must be positive".to_string());
        }
        if self.shutdown_timeout.is_zero() {
            return Err("shutdown_timeout cannot be zero".to_string());
        }
        Ok(())
    }

    pub fn ai_config(&self) -> AiConfig {
        AiConfig {
            parallel_threshold: self.ai_parallel_threshold,
            housekeeping_ticks: self.ai_housekeeping_ticks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.target_fps, 60.0);
        assert_eq!(config.max_frame_delta, 0.25);
        assert!(config.worker_threads >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_values() {
        let config = EngineConfig::load_from(lookup(&[
            ("TARGET_FPS", "120"),
            ("SOFTWARE_FRAME_LIMITING", "true"),
            ("WORKER_THREADS", "3"),
            ("NPC_COUNT", "500"),
            ("MAX_FRAMES", "90"),
            ("METRICS_PORT", "9100"),
        ]));

        assert_eq!(config.target_fps, 120.0);
        assert!((config.fixed_timestep - 1.0 / 120.0).abs() < 1e-7);
        assert!(config.software_frame_limiting);
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.npc_count, 500);
        assert_eq!(config.max_frames, Some(90));
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = EngineConfig::load_from(lookup(&[
            ("TARGET_FPS", "0"),
            ("WORKER_THREADS", "lots"),
            ("THREADED_UPDATE", "maybe"),
            ("SHUTDOWN_TIMEOUT_MS", "0"),
        ]));
        let defaults = EngineConfig::default();

        assert_eq!(config.target_fps, defaults.target_fps);
        assert_eq!(config.worker_threads, defaults.worker_threads);
        assert!(config.threaded_update);
        assert_eq!(config.shutdown_timeout, defaults.shutdown_timeout);
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut config = EngineConfig::default();
        config.worker_threads = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.world_height = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ai_config() {
        let config = EngineConfig::load_from(lookup(&[
            ("AI_PARALLEL_THRESHOLD", "8"),
            ("AI_HOUSEKEEPING_TICKS", "0"),
        ]));
        let ai = config.ai_config();
        assert_eq!(ai.parallel_threshold, 8);
        assert_eq!(ai.housekeeping_ticks, 0);
    }

    #[test]
    fn test_load_or_default() {
        let config = EngineConfig::load_or_default();
        assert!(config.target_fps > 0.0);
    }
}
