//! Patrol behavior: walk a closed waypoint loop
//!
//! Each entity starts at the waypoint nearest to it. Waypoints outside the
//! world are skipped unless off-screen patrols are enabled; with nothing
//! usable the entity stands still.

use std::any::Any;

use smallvec::SmallVec;

use super::WorldBounds;
use crate::ai::behavior::{halt, Behavior, BehaviorMessage, TickContext};
use crate::ai::entity_states::EntityStates;
use crate::entity::{Entity, EntityId};
use crate::util::vec2::Vec2;

pub const NAME: &str = "Patrol";

pub type Waypoints = SmallVec<[Vec2; 10]>;

#[derive(Debug, Clone, Copy, Default)]
struct PatrolState {
    current: usize,
}

#[derive(Debug)]
pub struct PatrolBehavior {
    waypoints: Waypoints,
    /// Units per second
    speed: f32,
    arrival_radius: f32,
    include_offscreen: bool,
    bounds: WorldBounds,
    active: bool,
    /// Set by `ReleaseEntities`; holds every entity still until the next `init`
    released: bool,
    states: EntityStates<PatrolState>,
}

impl PatrolBehavior {
    pub fn new(waypoints: impl IntoIterator<Item = Vec2>, speed: f32) -> Self {
        Self {
            waypoints: waypoints.into_iter().collect(),
            speed,
            arrival_radius: 15.0,
            include_offscreen: false,
            bounds: WorldBounds::default(),
            active: true,
            released: false,
            states: EntityStates::new(),
        }
    }

    pub fn with_bounds(mut self, bounds: WorldBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn add_waypoint(&mut self, point: Vec2) {
        self.waypoints.push(point);
    }

    /// Replace the route; every entity restarts from its nearest waypoint
    pub fn set_waypoints(&mut self, waypoints: impl IntoIterator<Item = Vec2>) {
        self.waypoints = waypoints.into_iter().collect();
        self.states.clear();
    }

    pub fn clear_waypoints(&mut self) {
        self.waypoints.clear();
        self.states.clear();
    }

    pub fn waypoints(&self) -> &[Vec2] {
        &self.waypoints
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn set_arrival_radius(&mut self, radius: f32) {
        self.arrival_radius = radius;
    }

    pub fn set_include_offscreen(&mut self, include: bool) {
        self.include_offscreen = include;
    }

    /// Waypoint the entity is currently heading to
    pub fn current_waypoint(&self, id: EntityId) -> Option<Vec2> {
        self.states
            .get(id)
            .and_then(|s| self.waypoints.get(s.current).copied())
    }

    fn usable(&self, index: usize) -> bool {
        self.waypoints
            .get(index)
            .map(|p| self.include_offscreen || self.bounds.contains(*p))
            .unwrap_or(false)
    }

    fn nearest_usable(&self, position: Vec2) -> Option<usize> {
        (0..self.waypoints.len())
            .filter(|&i| self.usable(i))
            .min_by(|&a, &b| {
                let da = self.waypoints[a].distance_sq_to(position);
                let db = self.waypoints[b].distance_sq_to(position);
                da.total_cmp(&db)
            })
    }

    fn next_usable(&self, from: usize) -> Option<usize> {
        let len = self.waypoints.len();
        (1..=len).map(|step| (from + step) % len).find(|&i| self.usable(i))
    }
}

impl Default for PatrolBehavior {
    fn default() -> Self {
        Self::new(
            [
                Vec2::new(200.0, 150.0),
                Vec2::new(1080.0, 150.0),
                Vec2::new(1080.0, 570.0),
                Vec2::new(200.0, 570.0),
            ],
            80.0,
        )
    }
}

impl Behavior for PatrolBehavior {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&mut self, entity: &Entity) {
        self.released = false;
        if self.states.contains(entity.id()) {
            return;
        }
        let current = self.nearest_usable(entity.position()).unwrap_or(0);
        self.states.insert(entity.id(), PatrolState { current });
    }

    fn update(&mut self, entity: &Entity, ctx: &TickContext) {
        if !self.active || self.released {
            entity.halt();
            return;
        }
        if !self.states.contains(entity.id()) {
            self.init(entity);
        }

        let position = ctx.kinematics(entity).position;
        let current = self.states.get(entity.id()).map(|s| s.current).unwrap_or(0);
        let current = if self.usable(current) {
            Some(current)
        } else {
            self.nearest_usable(position)
        };
        let Some(mut index) = current else {
            entity.halt();
            return;
        };

        if self.waypoints[index].distance_to(position) <= self.arrival_radius {
            index = self.next_usable(index).unwrap_or(index);
        }
        if let Some(state) = self.states.get_mut(entity.id()) {
            state.current = index;
        }

        let (direction, distance) = (self.waypoints[index] - position).normalize_with_length();
        if distance <= self.arrival_radius {
            // Single-waypoint route: park on it
            entity.halt();
        } else {
            entity.set_velocity(direction * self.speed);
        }
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
            BehaviorMessage::Resume => self.active = true,
            BehaviorMessage::ReleaseEntities => {
                halt(entity);
                self.states.clear();
                self.released = true;
            }
            BehaviorMessage::LoseTarget | BehaviorMessage::Custom(_) => {}
        }
    }

    fn clone_behavior(&self) -> Box<dyn Behavior> {
        Box::new(Self {
            waypoints: self.waypoints.clone(),
            speed: self.speed,
            arrival_radius: self.arrival_radius,
            include_offscreen: self.include_offscreen,
            bounds: self.bounds,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> PatrolBehavior {
        PatrolBehavior::new(
            [
                Vec2::new(100.0, 100.0),
                Vec2::new(300.0, 100.0),
                Vec2::new(300.0, 300.0),
                Vec2::new(100.0, 300.0),
            ],
            50.0,
        )
    }

    fn tick(patrol: &mut PatrolBehavior, entity: &Entity) {
        patrol.update(entity, &TickContext::new(0.016, 1));
    }

    #[test]
    fn test_starts_at_nearest_waypoint() {
        let npc = Entity::spawn("npc", Vec2::new(290.0, 290.0));
        let mut patrol = square();
        patrol.init(&npc);
        assert_eq!(patrol.current_waypoint(npc.id()), Some(Vec2::new(300.0, 300.0)));
    }

    #[test]
    fn test_moves_toward_waypoint() {
        let npc = Entity::spawn("npc", Vec2::new(100.0, 200.0));
        let mut patrol = PatrolBehavior::new([Vec2::new(100.0, 100.0)], 50.0);
        patrol.init(&npc);
        tick(&mut patrol, &npc);

        assert!(npc.velocity().approx_eq(Vec2::new(0.0, -50.0), 1e-4));
    }

    #[test]
    fn test_advances_on_arrival() {
        let npc = Entity::spawn("npc", Vec2::new(105.0, 100.0));
        let mut patrol = square();
        patrol.init(&npc);
        tick(&mut patrol, &npc);

        assert_eq!(patrol.current_waypoint(npc.id()), Some(Vec2::new(300.0, 100.0)));
        assert!(npc.velocity().x > 0.0);
    }

    #[test]
    fn test_loops_back_to_start() {
        let npc = Entity::spawn("npc", Vec2::new(100.0, 300.0));
        let mut patrol = square();
        patrol.init(&npc);
        tick(&mut patrol, &npc);
        assert_eq!(patrol.current_waypoint(npc.id()), Some(Vec2::new(100.0, 100.0)));
    }

    #[test]
    fn test_offscreen_waypoints_skipped() {
        let npc = Entity::spawn("npc", Vec2::new(100.0, 100.0));
        let mut patrol = PatrolBehavior::new(
            [Vec2::new(-400.0, 100.0), Vec2::new(400.0, 100.0)],
            50.0,
        );
        patrol.init(&npc);
        assert_eq!(patrol.current_waypoint(npc.id()), Some(Vec2::new(400.0, 100.0)));

        patrol.set_include_offscreen(true);
        patrol.set_waypoints([Vec2::new(-50.0, 100.0), Vec2::new(400.0, 100.0)]);
        patrol.init(&npc);
        assert_eq!(patrol.current_waypoint(npc.id()), Some(Vec2::new(-50.0, 100.0)));
    }

    #[test]
    fn test_no_usable_waypoint_is_motionless() {
        let npc = Entity::spawn("npc", Vec2::new(100.0, 100.0));
        npc.set_velocity(Vec2::new(1.0, 1.0));
        let mut patrol = PatrolBehavior::new([Vec2::new(-400.0, -400.0)], 50.0);
        patrol.init(&npc);
        tick(&mut patrol, &npc);
        assert_eq!(npc.velocity(), Vec2::ZERO);

        patrol.clear_waypoints();
        npc.set_velocity(Vec2::new(1.0, 1.0));
        tick(&mut patrol, &npc);
        assert_eq!(npc.velocity(), Vec2::ZERO);
    }

    #[test]
    fn test_clean_then_init_is_fresh() {
        let npc = Entity::spawn("npc", Vec2::new(105.0, 100.0));
        let mut patrol = square();
        patrol.init(&npc);
        tick(&mut patrol, &npc);

        patrol.clean(Some(&npc));
        patrol.init(&npc);
        assert_eq!(patrol.current_waypoint(npc.id()), Some(Vec2::new(100.0, 100.0)));
    }

    #[test]
    fn test_released_route_stays_parked() {
        let npc = Entity::spawn("npc", Vec2::new(200.0, 200.0));
        let mut patrol = square();
        patrol.init(&npc);
        tick(&mut patrol, &npc);
        assert!(npc.velocity().length() > 0.0);

        patrol.on_message(None, &BehaviorMessage::ReleaseEntities);
        tick(&mut patrol, &npc);
        assert_eq!(npc.velocity(), Vec2::ZERO);
        assert_eq!(patrol.current_waypoint(npc.id()), None);

        patrol.init(&npc);
        tick(&mut patrol, &npc);
        assert!(npc.velocity().length() > 0.0);
    }
}
