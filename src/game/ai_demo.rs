//! AI demo scene
//!
//! Spawns a player that orbits the world center and a crowd of NPCs, then
//! lets input switch every NPC between the four registered behaviors.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::ai::behavior::BehaviorMessage;
use crate::ai::behaviors::{
    ChaseBehavior, FollowBehavior, FollowMode, PatrolBehavior, WanderBehavior, WorldBounds,
};
use crate::core::context::EngineContext;
use crate::core::input::Action;
use crate::core::surface::Surface;
use crate::entity::{Entity, EntityHandle, EntityState, EntityStateMachine};
use crate::game::state::{GameState, Transition};
use crate::util::vec2::Vec2;

pub const NAME: &str = "AiDemo";

const WANDER: &str = "Wander";
const PATROL: &str = "Patrol";
const CHASE: &str = "Chase";
const FOLLOW: &str = "Follow";

const ORBIT: &str = "Orbit";
const IDLE: &str = "Idle";

/// Circles a fixed center at constant angular speed
struct OrbitState {
    center: Vec2,
    radius: f32,
    /// Radians per second
    angular_speed: f32,
    angle: f32,
}

impl EntityState for OrbitState {
    fn name(&self) -> &str {
        ORBIT
    }

    fn enter(&mut self, entity: &Entity) {
        let offset = entity.position() - self.center;
        if !offset.is_zero(f32::EPSILON) {
            self.angle = offset.angle();
        }
    }

    fn update(&mut self, entity: &Entity, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.angle += self.angular_speed * dt;
        let next = self.center + Vec2::from_angle(self.angle) * self.radius;
        entity.set_velocity((next - entity.position()) / dt);
    }

    fn exit(&mut self, entity: &Entity) {
        entity.halt();
    }
}

struct IdleState;

impl EntityState for IdleState {
    fn name(&self) -> &str {
        IDLE
    }

    fn enter(&mut self, entity: &Entity) {
        entity.halt();
    }

    fn update(&mut self, entity: &Entity, _dt: f32) {
        entity.halt();
    }

    fn exit(&mut self, _entity: &Entity) {}
}

pub struct AiDemoState {
    npc_count: usize,
    seed: Option<u64>,
    /// Where `Action::Exit` goes; quits the engine when unset
    exit_to: Option<String>,
    npcs: Vec<EntityHandle>,
    player: Option<EntityHandle>,
    player_states: EntityStateMachine,
    current_behavior: &'static str,
    paused: bool,
}

impl AiDemoState {
    pub fn new(npc_count: usize) -> Self {
        Self {
            npc_count,
            seed: None,
            exit_to: None,
            npcs: Vec::new(),
            player: None,
            player_states: EntityStateMachine::new(),
            current_behavior: WANDER,
            paused: false,
        }
    }

    /// Deterministic spawns and wander headings
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_exit_to(mut self, state: impl Into<String>) -> Self {
        self.exit_to = Some(state.into());
        self
    }

    pub fn npcs(&self) -> &[EntityHandle] {
        &self.npcs
    }

    pub fn player(&self) -> Option<&EntityHandle> {
        self.player.as_ref()
    }

    pub fn current_behavior(&self) -> &str {
        self.current_behavior
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn register_behaviors(&self, ctx: &EngineContext, bounds: WorldBounds, player: &EntityHandle) {
        let (width, height) = (bounds.max.x, bounds.max.y);

        let mut wander = WanderBehavior::new(120.0, 3.0, 200.0).with_bounds(bounds);
        if let Some(seed) = self.seed {
            wander = wander.with_seed(seed);
        }
        wander.set_offscreen_probability(0.2);
        ctx.ai.register_behavior(WANDER, Box::new(wander));

        // Four corners plus one point off the left edge
        let mut patrol = PatrolBehavior::new(
            [
                Vec2::new(width * 0.2, height * 0.2),
                Vec2::new(width * 0.8, height * 0.2),
                Vec2::new(width * 0.8, height * 0.8),
                Vec2::new(width * 0.2, height * 0.8),
                Vec2::new(-100.0, height * 0.5),
            ],
            90.0,
        )
        .with_bounds(bounds);
        patrol.set_include_offscreen(true);
        ctx.ai.register_behavior(PATROL, Box::new(patrol));

        let chase = ChaseBehavior::new(120.0, 500.0, 50.0).with_target(player);
        ctx.ai.register_behavior(CHASE, Box::new(chase));

        let follow = FollowBehavior::with_mode(FollowMode::EscortFormation, 130.0);
        ctx.ai.register_behavior(FOLLOW, Box::new(follow));
    }

    fn spawn_npcs(&mut self, ctx: &EngineContext, bounds: WorldBounds) {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        for i in 0..self.npc_count {
            let position = Vec2::new(
                rng.gen_range(bounds.min.x..bounds.max.x),
                rng.gen_range(bounds.min.y..bounds.max.y),
            );
            let npc = Entity::spawn(format!("npc-{i}"), position);
            if let Err(e) = ctx.ai.assign_behavior_to_entity(&npc, WANDER) {
                warn!("Could not assign {} to {}: {}", WANDER, npc.name(), e);
            }
            self.npcs.push(npc);
        }
    }

    fn switch_all(&mut self, ctx: &EngineContext, behavior: &'static str) {
        if behavior == CHASE {
            let player = self.player.clone();
            ctx.ai.configure_behavior::<ChaseBehavior>(CHASE, |chase| {
                chase.set_target(player.as_ref());
            });
        }

        info!("Switching {} NPCs to {}", self.npcs.len(), behavior);
        for npc in &self.npcs {
            if let Err(e) = ctx.ai.assign_behavior_to_entity(npc, behavior) {
                warn!("Could not assign {} to {}: {}", behavior, npc.name(), e);
            }
        }
        self.current_behavior = behavior;
    }

    fn toggle_pause(&mut self, ctx: &EngineContext) {
        self.paused = !self.paused;
        let (message, player_state) = if self.paused {
            (BehaviorMessage::Pause, IDLE)
        } else {
            (BehaviorMessage::Resume, ORBIT)
        };
        info!("AI {}", if self.paused { "paused" } else { "resumed" });
        ctx.ai.broadcast_message(message, false);

        if let Some(player) = &self.player {
            self.player_states.set_state(player, player_state);
        }
    }
}

impl GameState for AiDemoState {
    fn name(&self) -> &str {
        NAME
    }

    fn enter(&mut self, ctx: &EngineContext) -> anyhow::Result<()> {
        let bounds = ctx.world_bounds();
        ctx.ai.reset_behaviors();

        let player = Entity::spawn("player", bounds.center());
        self.register_behaviors(ctx, bounds, &player);
        ctx.ai.set_player_target(Some(&player));

        self.player_states = EntityStateMachine::new();
        self.player_states.add_state(Box::new(OrbitState {
            center: bounds.center(),
            radius: bounds.max.y.min(bounds.max.x) * 0.3,
            angular_speed: 0.6,
            angle: 0.0,
        }));
        self.player_states.add_state(Box::new(IdleState));
        player.set_position(bounds.center() + Vec2::new(bounds.max.y.min(bounds.max.x) * 0.3, 0.0));
        self.player_states.set_state(&player, ORBIT);
        self.player = Some(player);

        self.spawn_npcs(ctx, bounds);
        self.current_behavior = WANDER;
        self.paused = false;

        info!("Created {} NPCs with AI behaviors", self.npcs.len());
        Ok(())
    }

    fn update(&mut self, ctx: &EngineContext, dt: f32) -> Transition {
        for action in ctx.take_actions() {
            match action {
                Action::Wander => self.switch_all(ctx, WANDER),
                Action::Patrol => self.switch_all(ctx, PATROL),
                Action::Chase => self.switch_all(ctx, CHASE),
                Action::Follow => self.switch_all(ctx, FOLLOW),
                Action::TogglePause => self.toggle_pause(ctx),
                Action::Exit => {
                    return match &self.exit_to {
                        Some(next) => Transition::Switch(next.clone()),
                        None => Transition::Quit,
                    };
                }
            }
        }

        if let Some(player) = &self.player {
            self.player_states.update(player, dt);
            player.integrate(dt);
        }
        for npc in &self.npcs {
            npc.integrate(dt);
        }

        Transition::None
    }

    fn render(&self, surface: &mut dyn Surface) {
        for npc in &self.npcs {
            surface.draw_entity(npc.name(), npc.position());
        }
        if let Some(player) = &self.player {
            surface.draw_entity(player.name(), player.position());
        }

        let status = format!(
            "AI Demo [{}{}]  1 Wander  2 Patrol  3 Chase  4 Follow  SPACE pause  B exit",
            self.current_behavior,
            if self.paused { ", paused" } else { "" }
        );
        surface.draw_text(&status, Vec2::new(8.0, 28.0));
    }

    fn exit(&mut self, ctx: &EngineContext) -> anyhow::Result<()> {
        ctx.ai.configure_behavior::<ChaseBehavior>(CHASE, |chase| chase.set_target(None));

        for npc in &self.npcs {
            npc.halt();
        }

        ctx.ai.broadcast_message(BehaviorMessage::ReleaseEntities, true);
        ctx.ai.process_message_queue();
        ctx.ai.reset_behaviors();
        ctx.ai.set_player_target(None);

        if let Some(player) = self.player.take() {
            self.player_states.clear(&player);
        }
        self.npcs.clear();

        info!("AI demo exit complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::input::InputEvent;

    fn ctx() -> EngineContext {
        EngineContext::new(EngineConfig {
            worker_threads: 2,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    fn press(ctx: &EngineContext, action: Action) {
        ctx.input.lock().apply(InputEvent::Action(action));
    }

    #[test]
    fn test_enter_spawns_and_registers() {
        let ctx = ctx();
        let mut demo = AiDemoState::new(10).with_seed(3);
        demo.enter(&ctx).unwrap();

        assert_eq!(demo.npcs().len(), 10);
        assert_eq!(ctx.ai.behavior_count(), 4);
        assert_eq!(ctx.ai.managed_entity_count(), 10);
        assert!(ctx.ai.player_target().is_some());
        for npc in demo.npcs() {
            assert_eq!(ctx.ai.assigned_behavior(npc.id()).as_deref(), Some(WANDER));
        }
    }

    #[test]
    fn test_actions_switch_behaviors() {
        let ctx = ctx();
        let mut demo = AiDemoState::new(4).with_seed(1);
        demo.enter(&ctx).unwrap();

        press(&ctx, Action::Chase);
        assert_eq!(demo.update(&ctx, 1.0 / 60.0), Transition::None);
        assert_eq!(demo.current_behavior(), CHASE);
        for npc in demo.npcs() {
            assert_eq!(ctx.ai.assigned_behavior(npc.id()).as_deref(), Some(CHASE));
        }

        press(&ctx, Action::Follow);
        demo.update(&ctx, 1.0 / 60.0);
        let slots = ctx
            .ai
            .with_behavior::<FollowBehavior, _>(FOLLOW, |f| f.formation_slots().allocated_count())
            .unwrap();
        assert_eq!(slots, 4);
    }

    #[test]
    fn test_pause_halts_npcs() {
        let ctx = ctx();
        let mut demo = AiDemoState::new(3).with_seed(9);
        demo.enter(&ctx).unwrap();
        ctx.ai.update(0.1);

        press(&ctx, Action::TogglePause);
        demo.update(&ctx, 0.1);
        ctx.ai.update(0.1);

        assert!(demo.is_paused());
        for npc in demo.npcs() {
            assert_eq!(npc.velocity(), Vec2::ZERO);
        }
        assert_eq!(demo.player().map(|p| p.velocity()), Some(Vec2::ZERO));
    }

    #[test]
    fn test_switch_while_paused_stays_paused() {
        let ctx = ctx();
        let mut demo = AiDemoState::new(3).with_seed(4);
        demo.enter(&ctx).unwrap();

        press(&ctx, Action::TogglePause);
        demo.update(&ctx, 0.1);
        press(&ctx, Action::Chase);
        demo.update(&ctx, 0.1);
        ctx.ai.update(0.1);

        for npc in demo.npcs() {
            assert_eq!(ctx.ai.assigned_behavior(npc.id()).as_deref(), Some(CHASE));
            assert!(!ctx.ai.is_behavior_active(npc.id()));
            assert_eq!(npc.velocity(), Vec2::ZERO);
        }

        press(&ctx, Action::TogglePause);
        demo.update(&ctx, 0.1);
        for npc in demo.npcs() {
            assert!(ctx.ai.is_behavior_active(npc.id()));
        }
    }

    #[test]
    fn test_player_orbits() {
        let ctx = ctx();
        let mut demo = AiDemoState::new(0);
        demo.enter(&ctx).unwrap();
        let start = demo.player().unwrap().position();

        for _ in 0..30 {
            demo.update(&ctx, 1.0 / 60.0);
        }
        let center = ctx.world_bounds().center();
        let player = demo.player().unwrap();
        assert!(!player.position().approx_eq(start, 1.0));
        assert!((player.position().distance_to(center) - start.distance_to(center)).abs() < 1.0);
    }

    #[test]
    fn test_exit_action() {
        let ctx = ctx();
        let mut demo = AiDemoState::new(1);
        demo.enter(&ctx).unwrap();
        press(&ctx, Action::Exit);
        assert_eq!(demo.update(&ctx, 0.016), Transition::Quit);

        let mut demo = AiDemoState::new(1).with_exit_to("Menu");
        demo.enter(&ctx).unwrap();
        press(&ctx, Action::Exit);
        assert_eq!(demo.update(&ctx, 0.016), Transition::Switch("Menu".to_string()));
    }

    #[test]
    fn test_exit_releases_everything() {
        let ctx = ctx();
        let mut demo = AiDemoState::new(5).with_seed(2);
        demo.enter(&ctx).unwrap();
        press(&ctx, Action::Follow);
        demo.update(&ctx, 0.016);

        demo.exit(&ctx).unwrap();

        assert_eq!(ctx.ai.managed_entity_count(), 0);
        assert!(ctx.ai.player_target().is_none());
        assert!(ctx.ai.has_behavior(WANDER));
        let chase_target = ctx
            .ai
            .with_behavior::<ChaseBehavior, _>(CHASE, |c| c.target().is_some())
            .unwrap();
        assert!(!chase_target);
        let slots = ctx
            .ai
            .with_behavior::<FollowBehavior, _>(FOLLOW, |f| f.formation_slots().allocated_count())
            .unwrap();
        assert_eq!(slots, 0);
        assert!(demo.npcs().is_empty());
    }
}
