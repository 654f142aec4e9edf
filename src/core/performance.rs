//! Frame budget tracking for the update phase
//!
//! Update cost is smoothed with an exponential moving average and compared
//! with the frame budget. Moving to a better level needs the cost to clear
//! the threshold by a small margin, so a cost sitting on a boundary does not
//! flap between levels. Dividing the cost by the entity count estimates how
//! many more agents fit before the engine reaches `Warning`.

use std::time::Duration;

use serde::Serialize;

/// Weight of the newest sample in the moving average
const SMOOTHING: f32 = 0.1;

/// Frames recorded before the status may change
const WARMUP_FRAMES: u32 = 10;

/// Budget share a level must be undercut by before improving
const HYSTERESIS: f32 = 0.05;

/// Update cost as a share of the frame budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PerformanceStatus {
    /// Below 25%
    Excellent,
    /// Below 60%
    Good,
    /// Below 85%; stop adding agents
    Warning,
    /// Below 100%
    Critical,
    /// The update alone exceeds the frame budget
    Overloaded,
}

impl PerformanceStatus {
    fn from_usage(usage: f32) -> Self {
        match usage {
            u if u < 0.25 => PerformanceStatus::Excellent,
            u if u < 0.60 => PerformanceStatus::Good,
            u if u < 0.85 => PerformanceStatus::Warning,
            u if u < 1.0 => PerformanceStatus::Critical,
            _ => PerformanceStatus::Overloaded,
        }
    }

    pub fn can_add_entities(&self) -> bool {
        *self <= PerformanceStatus::Good
    }

    /// Numeric level for gauges (0 = excellent)
    pub fn level(&self) -> u64 {
        *self as u64
    }
}

#[derive(Debug)]
pub struct PerformanceMonitor {
    budget: Duration,
    /// Smoothed update time, seconds
    smoothed: Option<f32>,
    frames: u32,
    status: PerformanceStatus,
    entities: usize,
}

impl PerformanceMonitor {
    pub fn new(target_fps: f32) -> Self {
        let fps = if target_fps > 0.0 { target_fps.max(1.0) } else { 60.0 };
        Self {
            budget: Duration::from_secs_f32(1.0 / fps),
            smoothed: None,
            frames: 0,
            status: PerformanceStatus::Excellent,
            entities: 0,
        }
    }

    /// Record one update phase; returns the new status if it changed
    pub fn record_frame(&mut self, update_time: Duration, entities: usize) -> Option<PerformanceStatus> {
        let sample = update_time.as_secs_f32();
        self.smoothed = Some(match self.smoothed {
            Some(average) => average + SMOOTHING * (sample - average),
            None => sample,
        });
        self.frames = self.frames.saturating_add(1);
        self.entities = entities;

        if self.frames < WARMUP_FRAMES {
            return None;
        }

        let usage = self.usage();
        let next = match PerformanceStatus::from_usage(usage) {
            worse if worse >= self.status => worse,
            _ => PerformanceStatus::from_usage(usage + HYSTERESIS).min(self.status),
        };
        if next == self.status {
            return None;
        }
        self.status = next;
        Some(next)
    }

    pub fn status(&self) -> PerformanceStatus {
        self.status
    }

    pub fn frame_budget(&self) -> Duration {
        self.budget
    }

    pub fn smoothed_update_time(&self) -> Duration {
        Duration::from_secs_f32(self.smoothed.unwrap_or(0.0))
    }

    fn usage(&self) -> f32 {
        self.smoothed.unwrap_or(0.0) / self.budget.as_secs_f32()
    }

    /// Smoothed update time as a percentage of the frame budget (0-100+)
    pub fn budget_usage_percent(&self) -> f32 {
        self.usage() * 100.0
    }

    pub fn can_add_entities(&self) -> bool {
        self.status.can_add_entities()
    }

    pub fn entity_count(&self) -> usize {
        self.entities
    }

    /// Additional entities that fit before the update reaches `Warning`,
    /// assuming cost grows linearly. `None` until there is data to go on.
    pub fn entity_headroom(&self) -> Option<usize> {
        if self.frames < WARMUP_FRAMES || self.entities == 0 {
            return None;
        }
        let smoothed = self.smoothed?;
        let per_entity = smoothed / self.entities as f32;
        let room = 0.60 * self.budget.as_secs_f32() - smoothed;
        if room <= 0.0 || per_entity <= 0.0 {
            return Some(0);
        }
        Some((room / per_entity) as usize)
    }

    pub fn status_message(&self) -> String {
        format!(
            "{:?}: update {:.2}ms of {:.2}ms budget ({:.0}%), {} entities",
            self.status,
            self.smoothed_update_time().as_secs_f64() * 1000.0,
            self.budget.as_secs_f64() * 1000.0,
            self.budget_usage_percent(),
            self.entities
        )
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(60.0)
    }
}
