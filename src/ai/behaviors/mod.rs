//! Concrete behaviors
//!
//! - `chase`: pursue a weakly-held target with line-of-sight tracking
//! - `follow`: stay near the player in one of five formation modes
//! - `wander`: random headings around a spawn point
//! - `patrol`: cycle through a waypoint list

pub mod chase;
pub mod follow;
pub mod patrol;
pub mod wander;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::util::vec2::Vec2;

pub use chase::{ChaseBehavior, ChaseMode};
pub use follow::{FollowBehavior, FollowMode};
pub use patrol::PatrolBehavior;
pub use wander::WanderBehavior;

/// Axis-aligned rectangle of the visible world
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl WorldBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            min: Vec2::ZERO,
            max: Vec2::new(width, height),
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// How far `point` lies outside the bounds; zero when inside
    pub fn distance_outside(&self, point: Vec2) -> f32 {
        let dx = (self.min.x - point.x).max(point.x - self.max.x).max(0.0);
        let dy = (self.min.y - point.y).max(point.y - self.max.y).max(0.0);
        Vec2::new(dx, dy).length()
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Unit vector pointing out through the edge closest to `point`
    pub fn nearest_exit(&self, point: Vec2) -> Vec2 {
        let candidates = [
            (point.x - self.min.x, Vec2::new(-1.0, 0.0)),
            (self.max.x - point.x, Vec2::new(1.0, 0.0)),
            (point.y - self.min.y, Vec2::new(0.0, -1.0)),
            (self.max.y - point.y, Vec2::new(0.0, 1.0)),
        ];
        candidates
            .iter()
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, direction)| *direction)
            .unwrap_or(Vec2::new(1.0, 0.0))
    }

    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        let x = if self.max.x > self.min.x {
            rng.gen_range(self.min.x..self.max.x)
        } else {
            self.min.x
        };
        let y = if self.max.y > self.min.y {
            rng.gen_range(self.min.y..self.max.y)
        } else {
            self.min.y
        };
        Vec2::new(x, y)
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::new(1280.0, 720.0)
    }
}
