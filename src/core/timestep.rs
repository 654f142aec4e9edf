//! Frame pacing
//!
//! One simulation update per rendered frame. The measured frame delta is
//! clamped to `max_frame_delta` before it reaches the accumulator, so a long
//! stall never turns into a runaway catch-up step. With software frame
//! limiting on, updates use the fixed timestep instead of the measured delta
//! so motion stays uniform despite sleep jitter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

/// Longest delta (seconds) a single frame may contribute
pub const MAX_FRAME_DELTA: f32 = 0.25;

/// Longest frame budget (seconds) the pacer will sleep towards
pub const MAX_TARGET_FRAME_TIME: f32 = 1.0;

fn frame_time_for(fps: f32) -> f32 {
    (1.0 / fps).min(MAX_TARGET_FRAME_TIME)
}

/// Time source for the frame pacer
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary origin
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

/// Wall clock
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Hand-driven clock; `sleep` advances time instantly
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug)]
pub struct TimestepManager<C: Clock = SystemClock> {
    clock: C,
    target_fps: f32,
    /// Seconds
    target_frame_time: f32,
    fixed_timestep: f32,
    max_frame_delta: f32,

    accumulator: f64,
    frame_start: Duration,
    last_frame_time: Duration,
    /// Clamped delta of the last frame, seconds
    last_delta: f32,
    /// Unclamped delta of the last frame, milliseconds
    last_frame_time_ms: u32,

    current_fps: f32,
    fps_last_update: Duration,
    window_frames: u32,
    total_frames: u64,

    first_frame: bool,
    should_render: bool,
    software_limiting: bool,
    software_limiting_explicit: bool,
}

impl TimestepManager<SystemClock> {
    pub fn new(target_fps: f32, fixed_timestep: f32) -> Self {
        Self::with_clock(target_fps, fixed_timestep, SystemClock::new())
    }
}

impl<C: Clock> TimestepManager<C> {
    pub fn with_clock(target_fps: f32, fixed_timestep: f32, clock: C) -> Self {
        let target_fps = if target_fps > 0.0 {
            target_fps
        } else {
            warn!("Invalid target FPS {}, using 60", target_fps);
            60.0
        };
        let fixed_timestep = if fixed_timestep > 0.0 {
            fixed_timestep
        } else {
            frame_time_for(target_fps)
        };
        let now = clock.now();

        Self {
            clock,
            target_fps,
            target_frame_time: frame_time_for(target_fps),
            fixed_timestep,
            max_frame_delta: MAX_FRAME_DELTA,
            accumulator: 0.0,
            frame_start: now,
            last_frame_time: now,
            last_delta: 0.0,
            last_frame_time_ms: 0,
            current_fps: 0.0,
            fps_last_update: now,
            window_frames: 0,
            total_frames: 0,
            first_frame: true,
            should_render: true,
            software_limiting: false,
            software_limiting_explicit: false,
        }
    }

    /// Sample the clock. The first call only records a baseline.
    pub fn start_frame(&mut self) {
        let now = self.clock.now();

        if self.first_frame {
            self.first_frame = false;
            self.last_frame_time = now;
            self.frame_start = now;
            return;
        }

        let delta = now.saturating_sub(self.last_frame_time);
        self.last_frame_time = now;
        self.frame_start = now;
        self.last_frame_time_ms = delta.as_millis().min(u32::MAX as u128) as u32;

        self.last_delta = delta.as_secs_f32().min(self.max_frame_delta);
        self.accumulator += self.last_delta as f64;
        self.should_render = true;

        self.update_fps(now);
    }

    /// True once per frame that has accumulated time; consumes it
    pub fn should_update(&mut self) -> bool {
        if self.accumulator > 0.0 {
            self.accumulator = 0.0;
            true
        } else {
            false
        }
    }

    pub fn should_render(&self) -> bool {
        self.should_render
    }

    /// Delta to feed the simulation: the fixed timestep under software
    /// limiting, otherwise the clamped measured delta
    pub fn get_update_delta_time(&self) -> f32 {
        if self.software_limiting {
            self.fixed_timestep
        } else {
            self.last_delta
        }
    }

    /// Finish the frame: clear render-pending, sleep off any time left in
    /// the frame budget, count the frame
    pub fn end_frame(&mut self) {
        self.should_render = false;
        self.limit_frame_rate();
        self.window_frames += 1;
        self.total_frames += 1;
    }

    fn limit_frame_rate(&self) {
        let elapsed = self.clock.now().saturating_sub(self.frame_start);
        let budget = Duration::from_secs_f32(self.target_frame_time);
        if elapsed < budget {
            self.clock.sleep(budget - elapsed);
        }
    }

    fn update_fps(&mut self, now: Duration) {
        let window = now.saturating_sub(self.fps_last_update).as_secs_f32();
        if window >= 1.0 {
            self.current_fps = self.window_frames as f32 / window;
            self.window_frames = 0;
            self.fps_last_update = now;
        }
    }

    pub fn get_current_fps(&self) -> f32 {
        self.current_fps
    }

    pub fn target_fps(&self) -> f32 {
        self.target_fps
    }

    pub fn fixed_timestep(&self) -> f32 {
        self.fixed_timestep
    }

    pub fn max_frame_delta(&self) -> f32 {
        self.max_frame_delta
    }

    /// Unclamped duration of the last frame
    pub fn frame_time_ms(&self) -> u32 {
        self.last_frame_time_ms
    }

    /// Last frame took more than twice the target frame time
    pub fn is_frame_time_excessive(&self) -> bool {
        self.last_frame_time_ms as f32 > self.target_frame_time * 2000.0
    }

    pub fn frame_count(&self) -> u64 {
        self.total_frames
    }

    pub fn is_software_frame_limiting(&self) -> bool {
        self.software_limiting
    }

    /// Ignored unless `fps > 0`. The frame budget is capped at
    /// `MAX_TARGET_FRAME_TIME`.
    pub fn set_target_fps(&mut self, fps: f32) {
        if fps > 0.0 {
            self.target_fps = fps;
            self.target_frame_time = frame_time_for(fps);
        } else {
            warn!("Ignoring invalid target FPS {}", fps);
        }
    }

    /// Ignored unless `timestep > 0`
    pub fn set_fixed_timestep(&mut self, timestep: f32) {
        if timestep > 0.0 {
            self.fixed_timestep = timestep;
        } else {
            warn!("Ignoring invalid fixed timestep {}", timestep);
        }
    }

    /// Ignored unless `max_delta > 0`
    pub fn set_max_frame_delta(&mut self, max_delta: f32) {
        if max_delta > 0.0 {
            self.max_frame_delta = max_delta;
        } else {
            warn!("Ignoring invalid max frame delta {}", max_delta);
        }
    }

    /// An explicit choice survives `reset`
    pub fn set_software_frame_limiting(&mut self, enabled: bool) {
        self.software_limiting = enabled;
        self.software_limiting_explicit = true;
    }

    /// Back to the first-frame state
    pub fn reset(&mut self) {
        let now = self.clock.now();
        self.accumulator = 0.0;
        self.window_frames = 0;
        self.total_frames = 0;
        self.first_frame = true;
        self.should_render = true;
        self.current_fps = 0.0;
        self.last_delta = 0.0;
        self.last_frame_time_ms = 0;
        self.frame_start = now;
        self.last_frame_time = now;
        self.fps_last_update = now;

        if !self.software_limiting_explicit {
            self.software_limiting = false;
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
