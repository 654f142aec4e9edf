//! Wander behavior
//!
//! Picks a random heading every `change_interval` seconds. Entities that
//! stray past `wander_radius` head back to where they were assigned; some
//! headings deliberately leave the screen, and anything too far outside the
//! world is dropped back in at a random point.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;
use tracing::trace;

use super::WorldBounds;
use crate::ai::behavior::{halt, Behavior, BehaviorMessage, TickContext};
use crate::ai::entity_states::EntityStates;
use crate::entity::{Entity, EntityId};
use crate::util::vec2::Vec2;

pub const NAME: &str = "Wander";

/// Entities further than this outside the world are re-entered
const REENTRY_DISTANCE: f32 = 100.0;

#[derive(Debug, Clone)]
struct WanderState {
    heading: Vec2,
    /// Seconds until the next heading change
    time_to_change: f32,
    origin: Vec2,
}

#[derive(Debug)]
pub struct WanderBehavior {
    /// Units per second
    speed: f32,
    /// Seconds between heading changes
    change_interval: f32,
    wander_radius: f32,
    bounds: WorldBounds,
    offscreen_probability: f32,
    seed: Option<u64>,
    rng: StdRng,
    /// Clones taken from this prototype, shared by all of them; each clone
    /// derives its own stream from the seed and its position in this count
    clones: Arc<AtomicU64>,
    active: bool,
    /// Set by `ReleaseEntities`; holds every entity still until the next `init`
    released: bool,
    states: EntityStates<WanderState>,
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Split one seed into independent per-clone streams
fn derive_seed(seed: u64, clone: u64) -> u64 {
    seed ^ clone.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn random_heading(rng: &mut StdRng) -> Vec2 {
    Vec2::from_angle(rng.gen_range(0.0..TAU))
}

impl WanderBehavior {
    pub fn new(speed: f32, change_interval: f32, wander_radius: f32) -> Self {
        Self {
            speed,
            change_interval,
            wander_radius,
            bounds: WorldBounds::default(),
            offscreen_probability: 0.0,
            seed: None,
            rng: make_rng(None),
            clones: Arc::new(AtomicU64::new(0)),
            active: true,
            released: false,
            states: EntityStates::new(),
        }
    }

    /// Deterministic headings, for tests and replays
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self.rng = make_rng(self.seed);
        self
    }

    pub fn with_bounds(mut self, bounds: WorldBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn set_change_interval(&mut self, seconds: f32) {
        self.change_interval = seconds;
    }

    pub fn set_wander_radius(&mut self, radius: f32) {
        self.wander_radius = radius;
    }

    pub fn set_offscreen_probability(&mut self, probability: f32) {
        self.offscreen_probability = probability.clamp(0.0, 1.0);
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn heading(&self, id: EntityId) -> Option<Vec2> {
        self.states.get(id).map(|s| s.heading)
    }

    pub fn origin(&self, id: EntityId) -> Option<Vec2> {
        self.states.get(id).map(|s| s.origin)
    }

    pub fn tracked_entities(&self) -> usize {
        self.states.len()
    }
}

impl Default for WanderBehavior {
    fn default() -> Self {
        Self::new(60.0, 2.0, 300.0)
    }
}

impl Behavior for WanderBehavior {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&mut self, entity: &Entity) {
        self.released = false;
        let heading = random_heading(&mut self.rng);
        let position = entity.position();
        self.states.get_or_init(entity.id(), || WanderState {
            heading,
            time_to_change: 0.0,
            origin: position,
        });
    }

    fn update(&mut self, entity: &Entity, ctx: &TickContext) {
        if !self.active || self.released {
            entity.halt();
            return;
        }

        let mut position = ctx.kinematics(entity).position;
        if !self.states.contains(entity.id()) {
            self.init(entity);
        }
        let Some(state) = self.states.get_mut(entity.id()) else {
            entity.halt();
            return;
        };

        if self.bounds.distance_outside(position) > REENTRY_DISTANCE {
            position = self.bounds.random_point(&mut self.rng);
            entity.set_position(position);
            state.origin = position;
            state.time_to_change = 0.0;
            trace!("Entity {} re-entered the world at {:?}", entity.id(), position);
        }

        state.time_to_change -= ctx.dt;
        let (home, distance) = (state.origin - position).normalize_with_length();

        if distance > self.wander_radius {
            state.heading = home;
            state.time_to_change = self.change_interval;
        } else if state.time_to_change <= 0.0 {
            state.heading = if self.offscreen_probability > 0.0
                && self.rng.gen::<f32>() < self.offscreen_probability
            {
                self.bounds.nearest_exit(position)
            } else {
                random_heading(&mut self.rng)
            };
            state.time_to_change = self.change_interval;
        }

        entity.set_velocity(state.heading * self.speed);
    }

    fn clean(&mut self, entity: Option<&Entity>) {
        match entity {
            Some(entity) => {
                entity.halt();
                self.states.remove(entity.id());
            }
            None => self.states.clear(),
        }
    }

    fn on_message(&mut self, entity: Option<&Entity>, message: &BehaviorMessage) {
        match message {
            BehaviorMessage::Pause => {
                self.active = false;
                halt(entity);
            }
            BehaviorMessage::Resume => {
                self.active = true;
                if let Some(state) = entity.and_then(|e| self.states.get_mut(e.id())) {
                    state.time_to_change = 0.0;
                }
            }
            BehaviorMessage::ReleaseEntities => {
                halt(entity);
                self.states.clear();
                self.released = true;
            }
            BehaviorMessage::LoseTarget | BehaviorMessage::Custom(_) => {}
        }
    }

    fn clone_behavior(&self) -> Box<dyn Behavior> {
        let index = self.clones.fetch_add(1, Ordering::Relaxed) + 1;
        Box::new(Self {
            speed: self.speed,
            change_interval: self.change_interval,
            wander_radius: self.wander_radius,
            bounds: self.bounds,
            offscreen_probability: self.offscreen_probability,
            seed: self.seed,
            rng: make_rng(self.seed.map(|seed| derive_seed(seed, index))),
            clones: self.clones.clone(),
            active: self.active,
            released: false,
            states: EntityStates::new(),
        })
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
