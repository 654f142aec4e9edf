//! AI manager: behavior registry, entity assignments, message routing and
//! per-tick dispatch
//!
//! Every registered behavior is a prototype. Assigning it to an entity clones
//! the prototype, so each entity owns an independent instance and no two
//! entities ever share a runtime-state record.
//!
//! Behavior callbacks run while the manager's table lock is held; they must
//! not call back into the manager.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::ai::behavior::{Behavior, BehaviorMessage, TickContext};
use crate::core::subsystem::Subsystem;
use crate::core::thread_pool::ThreadPool;
use crate::entity::{EntityHandle, EntityId, WeakEntity};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    #[error("unknown behavior '{0}'")]
    UnknownBehavior(String),
    #[error("entity {0} has no assigned behavior")]
    NotAssigned(EntityId),
}

/// Dispatch tuning
#[derive(Debug, Clone, Copy)]
pub struct AiConfig {
    /// Assignment count above which updates fan out to the worker pool
    pub parallel_threshold: usize,
    /// Prune expired entities every this many ticks (0 disables)
    pub housekeeping_ticks: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 64,
            housekeeping_ticks: 60,
        }
    }
}

/// Point-in-time counters for metrics and logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AiStats {
    pub behaviors: usize,
    pub managed_entities: usize,
    pub ticks: u64,
    pub messages_delivered: u64,
    pub expired_pruned: u64,
    pub parallel_ticks: u64,
    pub last_update_micros: u64,
}

struct Assignment {
    entity: WeakEntity,
    behavior_name: String,
    behavior: Box<dyn Behavior>,
}

impl Assignment {
    fn update(&mut self, ctx: &TickContext) -> bool {
        match self.entity.upgrade() {
            Some(entity) => {
                self.behavior.update(&entity, ctx);
                true
            }
            None => false,
        }
    }

    fn deliver(&mut self, message: &BehaviorMessage) {
        let entity = self.entity.upgrade();
        self.behavior.on_message(entity.as_deref(), message);
    }

    fn clean(&mut self) {
        let entity = self.entity.upgrade();
        self.behavior.clean(entity.as_deref());
    }
}

#[derive(Default)]
struct AiTables {
    prototypes: HashMap<String, Box<dyn Behavior>>,
    assignments: HashMap<EntityId, Assignment>,
    player: WeakEntity,
}

/// A message waiting for `process_message_queue`
#[derive(Debug, Clone)]
struct QueuedMessage {
    /// `None` broadcasts to every behavior
    target: Option<EntityId>,
    message: BehaviorMessage,
}

pub struct AiManager {
    config: AiConfig,
    tables: Mutex<AiTables>,
    queue_tx: Sender<QueuedMessage>,
    queue_rx: Receiver<QueuedMessage>,
    pool: RwLock<Option<Arc<ThreadPool>>>,
    tick: AtomicU64,
    managed: AtomicUsize,
    messages_delivered: AtomicU64,
    expired_pruned: AtomicU64,
    parallel_ticks: AtomicU64,
    last_update_micros: AtomicU64,
}

impl AiManager {
    pub fn new(config: AiConfig) -> Self {
        let (queue_tx, queue_rx) = unbounded();
        Self {
            config,
            tables: Mutex::new(AiTables::default()),
            queue_tx,
            queue_rx,
            pool: RwLock::new(None),
            tick: AtomicU64::new(0),
            managed: AtomicUsize::new(0),
            messages_delivered: AtomicU64::new(0),
            expired_pruned: AtomicU64::new(0),
            parallel_ticks: AtomicU64::new(0),
            last_update_micros: AtomicU64::new(0),
        }
    }

    /// Worker pool used for parallel dispatch
    pub fn set_thread_pool(&self, pool: Option<Arc<ThreadPool>>) {
        *self.pool.write() = pool;
    }

    pub fn config(&self) -> AiConfig {
        self.config
    }

    // ---- Registry ----

    /// Register a prototype under `name`, replacing any previous one
    pub fn register_behavior(&self, name: impl Into<String>, behavior: Box<dyn Behavior>) {
        let name = name.into();
        let mut tables = self.tables.lock();
        if tables.prototypes.insert(name.clone(), behavior).is_some() {
            warn!("Behavior '{}' re-registered, replacing prototype", name);
        } else {
            debug!("Registered behavior '{}'", name);
        }
    }

    /// Remove a prototype; entities running it are unassigned first
    pub fn unregister_behavior(&self, name: &str) -> bool {
        let mut tables = self.tables.lock();
        if tables.prototypes.remove(name).is_none() {
            return false;
        }

        let users: Vec<EntityId> = tables
            .assignments
            .iter()
            .filter(|(_, a)| a.behavior_name == name)
            .map(|(id, _)| *id)
            .collect();
        for id in &users {
            if let Some(mut assignment) = tables.assignments.remove(id) {
                assignment.clean();
            }
        }
        self.managed.store(tables.assignments.len(), Ordering::Relaxed);
        debug!("Unregistered behavior '{}' ({} entities released)", name, users.len());
        true
    }

    pub fn has_behavior(&self, name: &str) -> bool {
        self.tables.lock().prototypes.contains_key(name)
    }

    pub fn behavior_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().prototypes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Typed access to a registered prototype. Changes affect entities
    /// assigned afterwards; see [`configure_behavior`](Self::configure_behavior)
    /// to reach entities already running it.
    pub fn with_behavior<B, R>(&self, name: &str, f: impl FnOnce(&mut B) -> R) -> Option<R>
    where
        B: Behavior,
    {
        let mut tables = self.tables.lock();
        tables
            .prototypes
            .get_mut(name)
            .and_then(|b| b.as_any_mut().downcast_mut::<B>())
            .map(f)
    }

    /// Apply `f` to the prototype `name` and to every instance currently
    /// assigned from it, so configuration such as a chase target reaches
    /// entities mid-behavior. Returns how many running instances were
    /// changed, or `None` if no prototype of type `B` is registered there.
    pub fn configure_behavior<B>(&self, name: &str, mut f: impl FnMut(&mut B)) -> Option<usize>
    where
        B: Behavior,
    {
        let mut tables = self.tables.lock();
        let prototype = tables
            .prototypes
            .get_mut(name)
            .and_then(|b| b.as_any_mut().downcast_mut::<B>())?;
        f(prototype);

        let mut changed = 0;
        for assignment in tables.assignments.values_mut() {
            if assignment.behavior_name != name {
                continue;
            }
            if let Some(behavior) = assignment.behavior.as_any_mut().downcast_mut::<B>() {
                f(behavior);
                changed += 1;
            }
        }
        debug!("Reconfigured behavior '{}' ({} running instances)", name, changed);
        Some(changed)
    }

    /// Typed access to the instance running on one entity
    pub fn with_assigned_behavior<B, R>(&self, id: EntityId, f: impl FnOnce(&mut B) -> R) -> Option<R>
    where
        B: Behavior,
    {
        let mut tables = self.tables.lock();
        tables
            .assignments
            .get_mut(&id)
            .and_then(|a| a.behavior.as_any_mut().downcast_mut::<B>())
            .map(f)
    }

    // ---- Assignment ----

    /// Give `entity` its own instance of behavior `name`.
    ///
    /// Any different behavior it had is cleaned before the new one is
    /// initialized. Assigning the behavior it already runs does nothing.
    pub fn assign_behavior_to_entity(&self, entity: &EntityHandle, name: &str) -> Result<(), AiError> {
        let mut tables = self.tables.lock();
        if let Some(existing) = tables.assignments.get(&entity.id()) {
            if existing.behavior_name == name {
                return Ok(());
            }
        }

        let Some(prototype) = tables.prototypes.get(name) else {
            warn!("Cannot assign unknown behavior '{}' to entity {}", name, entity.id());
            return Err(AiError::UnknownBehavior(name.to_string()));
        };
        let mut behavior = prototype.clone_behavior();

        if let Some(mut previous) = tables.assignments.remove(&entity.id()) {
            previous.behavior.clean(Some(entity));
        }

        behavior.init(entity);
        tables.assignments.insert(
            entity.id(),
            Assignment {
                entity: Arc::downgrade(entity),
                behavior_name: name.to_string(),
                behavior,
            },
        );
        self.managed.store(tables.assignments.len(), Ordering::Relaxed);
        trace!("Entity {} assigned '{}'", entity.id(), name);
        Ok(())
    }

    pub fn unassign_behavior_from_entity(&self, id: EntityId) -> bool {
        let mut tables = self.tables.lock();
        let Some(mut assignment) = tables.assignments.remove(&id) else {
            return false;
        };
        assignment.clean();
        self.managed.store(tables.assignments.len(), Ordering::Relaxed);
        trace!("Entity {} unassigned from '{}'", id, assignment.behavior_name);
        true
    }

    /// Assigned, alive, and not paused
    pub fn is_behavior_active(&self, id: EntityId) -> bool {
        self.tables
            .lock()
            .assignments
            .get(&id)
            .map(|a| a.entity.strong_count() > 0 && a.behavior.is_active())
            .unwrap_or(false)
    }

    pub fn assigned_behavior(&self, id: EntityId) -> Option<String> {
        self.tables
            .lock()
            .assignments
            .get(&id)
            .map(|a| a.behavior_name.clone())
    }

    pub fn managed_entity_count(&self) -> usize {
        self.managed.load(Ordering::Relaxed)
    }

    pub fn behavior_count(&self) -> usize {
        self.tables.lock().prototypes.len()
    }

    // ---- Player target ----

    pub fn set_player_target(&self, player: Option<&EntityHandle>) {
        self.tables.lock().player = player.map(Arc::downgrade).unwrap_or_default();
    }

    pub fn player_target(&self) -> Option<EntityHandle> {
        self.tables.lock().player.upgrade()
    }

    // ---- Messaging ----

    /// Deliver `message` to every prototype and every assigned instance, now
    /// or on the next `process_message_queue`
    pub fn broadcast_message(&self, message: impl Into<BehaviorMessage>, queued: bool) {
        let message = message.into();
        if queued {
            self.enqueue(None, message);
            return;
        }
        let mut tables = self.tables.lock();
        self.deliver_broadcast(&mut tables, &message);
    }

    /// Deliver `message` to one entity's behavior
    pub fn send_message(
        &self,
        id: EntityId,
        message: impl Into<BehaviorMessage>,
        queued: bool,
    ) -> Result<(), AiError> {
        let message = message.into();
        if queued {
            self.enqueue(Some(id), message);
            return Ok(());
        }
        let mut tables = self.tables.lock();
        match tables.assignments.get_mut(&id) {
            Some(assignment) => {
                assignment.deliver(&message);
                self.messages_delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(AiError::NotAssigned(id)),
        }
    }

    /// Deliver queued messages in the order they were sent. Messages for
    /// entities no longer assigned are dropped. Returns how many were
    /// processed.
    pub fn process_message_queue(&self) -> usize {
        let queued: Vec<QueuedMessage> = self.queue_rx.try_iter().collect();
        if queued.is_empty() {
            return 0;
        }

        let mut tables = self.tables.lock();
        for QueuedMessage { target, message } in &queued {
            match target {
                None => self.deliver_broadcast(&mut tables, message),
                Some(id) => match tables.assignments.get_mut(id) {
                    Some(assignment) => {
                        assignment.deliver(message);
                        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    None => trace!("Dropping '{}' for unassigned entity {}", message, id),
                },
            }
        }
        queued.len()
    }

    pub fn queued_messages(&self) -> usize {
        self.queue_rx.len()
    }

    fn enqueue(&self, target: Option<EntityId>, message: BehaviorMessage) {
        // Both ends live in `self`, so the channel cannot be disconnected
        let _ = self.queue_tx.send(QueuedMessage { target, message });
    }

    fn deliver_broadcast(&self, tables: &mut AiTables, message: &BehaviorMessage) {
        for prototype in tables.prototypes.values_mut() {
            prototype.on_message(None, message);
        }
        for assignment in tables.assignments.values_mut() {
            assignment.deliver(message);
        }
        if *message == BehaviorMessage::ReleaseEntities {
            tables.player = WeakEntity::new();
        }
        self.messages_delivered
            .fetch_add(tables.assignments.len() as u64, Ordering::Relaxed);
        debug!("Broadcast '{}' to {} entities", message, tables.assignments.len());
    }

    // ---- Lifecycle ----

    /// Clean and drop every assignment and discard queued messages.
    /// Registered prototypes survive, so behaviors are reusable without
    /// re-registration.
    pub fn reset_behaviors(&self) {
        let discarded = self.queue_rx.try_iter().count();
        let mut tables = self.tables.lock();
        let count = tables.assignments.len();
        for (_, mut assignment) in tables.assignments.drain() {
            assignment.clean();
        }
        self.managed.store(0, Ordering::Relaxed);
        info!(
            "AI behaviors reset ({} assignments cleared, {} queued messages discarded)",
            count, discarded
        );
    }

    /// Drop assignments whose entity no longer exists
    pub fn prune_expired(&self) -> usize {
        let mut tables = self.tables.lock();
        self.prune_locked(&mut tables)
    }

    fn prune_locked(&self, tables: &mut AiTables) -> usize {
        let expired: Vec<EntityId> = tables
            .assignments
            .iter()
            .filter(|(_, a)| a.entity.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(mut assignment) = tables.assignments.remove(id) {
                assignment.behavior.clean(None);
            }
        }

        if !expired.is_empty() {
            self.expired_pruned
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
            self.managed.store(tables.assignments.len(), Ordering::Relaxed);
            debug!("Pruned {} expired entities", expired.len());
        }
        expired.len()
    }

    /// One simulation tick: housekeeping, snapshot, then dispatch.
    /// Returns the number of entities updated; expired ones are skipped.
    pub fn update(&self, dt: f32) -> usize {
        let start = Instant::now();
        let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
        let mut tables = self.tables.lock();

        if self.config.housekeeping_ticks > 0 && tick % self.config.housekeeping_ticks == 0 {
            self.prune_locked(&mut tables);
        }

        let mut ctx = TickContext::new(dt, tick);
        if let Some(player) = tables.player.upgrade() {
            ctx.capture(&player);
            ctx.player = Some(ctx.view(&player));
        }
        for assignment in tables.assignments.values() {
            if let Some(entity) = assignment.entity.upgrade() {
                ctx.capture(&entity);
            }
        }

        let updated = self.dispatch(&mut tables.assignments, &ctx);

        self.last_update_micros
            .store(start.elapsed().as_micros() as u64, Ordering::Relaxed);
        updated
    }

    #[cfg(feature = "parallel_update")]
    fn dispatch(&self, assignments: &mut HashMap<EntityId, Assignment>, ctx: &TickContext) -> usize {
        use rayon::prelude::*;

        if assignments.len() > self.config.parallel_threshold {
            if let Some(pool) = self.pool.read().clone() {
                self.parallel_ticks.fetch_add(1, Ordering::Relaxed);
                return pool.install(|| {
                    assignments
                        .par_iter_mut()
                        .map(|(_, assignment)| assignment.update(ctx))
                        .filter(|updated| *updated)
                        .count()
                });
            }
        }
        Self::dispatch_sequential(assignments, ctx)
    }

    #[cfg(not(feature = "parallel_update"))]
    fn dispatch(&self, assignments: &mut HashMap<EntityId, Assignment>, ctx: &TickContext) -> usize {
        Self::dispatch_sequential(assignments, ctx)
    }

    fn dispatch_sequential(assignments: &mut HashMap<EntityId, Assignment>, ctx: &TickContext) -> usize {
        assignments
            .values_mut()
            .map(|assignment| assignment.update(ctx))
            .filter(|updated| *updated)
            .count()
    }

    pub fn stats(&self) -> AiStats {
        AiStats {
            behaviors: self.behavior_count(),
            managed_entities: self.managed_entity_count(),
            ticks: self.tick.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            expired_pruned: self.expired_pruned.load(Ordering::Relaxed),
            parallel_ticks: self.parallel_ticks.load(Ordering::Relaxed),
            last_update_micros: self.last_update_micros.load(Ordering::Relaxed),
        }
    }
}

impl Default for AiManager {
    fn default() -> Self {
        Self::new(AiConfig::default())
    }
}

impl std::fmt::Debug for AiManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiManager")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Subsystem for AiManager {
    fn name(&self) -> &str {
        "AI"
    }

    fn init(&self) -> anyhow::Result<()> {
        info!(
            "AI manager ready (parallel above {} entities, housekeeping every {} ticks)",
            self.config.parallel_threshold, self.config.housekeeping_ticks
        );
        Ok(())
    }

    /// Full teardown: assignments, prototypes and the player target
    fn clean(&self) -> anyhow::Result<()> {
        self.reset_behaviors();
        let mut tables = self.tables.lock();
        for prototype in tables.prototypes.values_mut() {
            prototype.clean(None);
        }
        tables.prototypes.clear();
        tables.player = WeakEntity::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::behaviors::{chase, ChaseBehavior, FollowBehavior, FollowMode, WanderBehavior};
    use crate::entity::Entity;
    use crate::util::vec2::Vec2;

    fn manager() -> AiManager {
        let ai = AiManager::default();
        ai.register_behavior(chase::NAME, Box::new(ChaseBehavior::new(2.0, 500.0, 50.0)));
        ai.register_behavior("Wander", Box::new(WanderBehavior::default().with_seed(1)));
        ai
    }

    #[test]
    fn test_register_and_query() {
        let ai = manager();
        assert!(ai.has_behavior("Chase"));
        assert!(!ai.has_behavior("Fly"));
        assert_eq!(ai.behavior_count(), 2);
        assert_eq!(ai.behavior_names(), vec!["Chase".to_string(), "Wander".to_string()]);
    }

    #[test]
    fn test_unknown_behavior_is_rejected() {
        let ai = manager();
        let npc = Entity::spawn("npc", Vec2::ZERO);
        assert_eq!(
            ai.assign_behavior_to_entity(&npc, "Fly"),
            Err(AiError::UnknownBehavior("Fly".to_string()))
        );
        assert_eq!(ai.managed_entity_count(), 0);
        assert!(ai.assigned_behavior(npc.id()).is_none());
    }

    #[test]
    fn test_double_assignment_is_idempotent() {
        let ai = manager();
        let npc = Entity::spawn("npc", Vec2::ZERO);
        ai.assign_behavior_to_entity(&npc, "Wander").unwrap();
        ai.assign_behavior_to_entity(&npc, "Wander").unwrap();

        assert_eq!(ai.managed_entity_count(), 1);
        let tracked = ai.with_assigned_behavior::<WanderBehavior, _>(npc.id(), |w| w.tracked_entities());
        assert_eq!(tracked, Some(1));
    }

    #[test]
    fn test_reassignment_cleans_previous() {
        let ai = AiManager::default();
        ai.register_behavior("Escort", Box::new(FollowBehavior::with_mode(FollowMode::EscortFormation, 100.0)));
        ai.register_behavior("Wander", Box::new(WanderBehavior::default()));
        let slots = ai
            .with_behavior::<FollowBehavior, _>("Escort", |f| f.formation_slots().clone())
            .unwrap();

        let npc = Entity::spawn("npc", Vec2::ZERO);
        ai.assign_behavior_to_entity(&npc, "Escort").unwrap();
        assert_eq!(slots.allocated_count(), 1);

        ai.assign_behavior_to_entity(&npc, "Wander").unwrap();
        assert_eq!(slots.allocated_count(), 0);
        assert_eq!(ai.assigned_behavior(npc.id()).as_deref(), Some("Wander"));
    }

    #[test]
    fn test_update_skips_expired_and_prunes() {
        let ai = manager();
        let alive = Entity::spawn("alive", Vec2::new(100.0, 100.0));
        let doomed = Entity::spawn("doomed", Vec2::new(100.0, 100.0));
        ai.assign_behavior_to_entity(&alive, "Wander").unwrap();
        ai.assign_behavior_to_entity(&doomed, "Wander").unwrap();

        drop(doomed);
        assert_eq!(ai.update(0.016), 1);
        assert_eq!(ai.prune_expired(), 1);
        assert_eq!(ai.managed_entity_count(), 1);
        assert_eq!(ai.stats().expired_pruned, 1);
    }

    #[test]
    fn test_housekeeping_prunes_on_schedule() {
        let ai = AiManager::new(AiConfig {
            parallel_threshold: 64,
            housekeeping_ticks: 2,
        });
        ai.register_behavior("Wander", Box::new(WanderBehavior::default()));
        let npc = Entity::spawn("npc", Vec2::ZERO);
        ai.assign_behavior_to_entity(&npc, "Wander").unwrap();
        drop(npc);

        ai.update(0.016);
        assert_eq!(ai.managed_entity_count(), 1);
        ai.update(0.016);
        assert_eq!(ai.managed_entity_count(), 0);
    }

    #[test]
    fn test_queued_messages_wait_for_flush() {
        let ai = manager();
        let npc = Entity::spawn("npc", Vec2::ZERO);
        ai.assign_behavior_to_entity(&npc, "Wander").unwrap();

        ai.broadcast_message("pause", true);
        assert!(ai.is_behavior_active(npc.id()));
        assert_eq!(ai.queued_messages(), 1);

        assert_eq!(ai.process_message_queue(), 1);
        assert!(!ai.is_behavior_active(npc.id()));

        ai.send_message(npc.id(), BehaviorMessage::Resume, false).unwrap();
        assert!(ai.is_behavior_active(npc.id()));
    }

    #[test]
    fn test_send_to_unassigned_entity() {
        let ai = manager();
        let id = EntityId::new();
        assert_eq!(ai.send_message(id, "pause", false), Err(AiError::NotAssigned(id)));
        assert!(ai.send_message(id, "pause", true).is_ok());
        assert_eq!(ai.process_message_queue(), 1);
    }

    #[test]
    fn test_reset_keeps_prototypes() {
        let ai = manager();
        let npc = Entity::spawn("npc", Vec2::ZERO);
        ai.assign_behavior_to_entity(&npc, "Wander").unwrap();
        ai.broadcast_message("pause", true);

        ai.reset_behaviors();

        assert_eq!(ai.managed_entity_count(), 0);
        assert_eq!(ai.queued_messages(), 0);
        assert!(ai.has_behavior("Wander"));
        ai.assign_behavior_to_entity(&npc, "Wander").unwrap();
        assert_eq!(ai.managed_entity_count(), 1);
    }

    #[test]
    fn test_unregister_releases_users() {
        let ai = manager();
        let npc = Entity::spawn("npc", Vec2::ZERO);
        ai.assign_behavior_to_entity(&npc, "Wander").unwrap();

        assert!(ai.unregister_behavior("Wander"));
        assert!(!ai.unregister_behavior("Wander"));
        assert_eq!(ai.managed_entity_count(), 0);
    }

    #[test]
    fn test_chase_target_configured_through_prototype() {
        let ai = manager();
        let player = Entity::spawn("player", Vec2::new(300.0, 0.0));
        let npc = Entity::spawn("npc", Vec2::ZERO);
        ai.with_behavior::<ChaseBehavior, _>("Chase", |c| c.set_target(Some(&player)))
            .unwrap();
        ai.assign_behavior_to_entity(&npc, "Chase").unwrap();

        ai.update(0.016);

        assert!((npc.velocity().length() - 2.0).abs() < 1e-4);
        let chasing = ai.with_assigned_behavior::<ChaseBehavior, _>(npc.id(), |c| c.is_chasing(npc.id()));
        assert_eq!(chasing, Some(true));
    }

    #[test]
    fn test_configure_reaches_running_instances() {
        let ai = manager();
        let player = Entity::spawn("player", Vec2::new(300.0, 0.0));
        let npc = Entity::spawn("npc", Vec2::ZERO);
        ai.assign_behavior_to_entity(&npc, "Chase").unwrap();
        ai.update(0.016);
        assert_eq!(npc.velocity(), Vec2::ZERO);

        let changed = ai.configure_behavior::<ChaseBehavior>("Chase", |c| c.set_target(Some(&player)));
        assert_eq!(changed, Some(1));
        ai.update(0.016);

        assert!(npc.velocity().approx_eq(Vec2::new(2.0, 0.0), 1e-4));
        assert!(ai
            .with_behavior::<ChaseBehavior, _>("Chase", |c| c.target().is_some())
            .unwrap_or(false));
        assert_eq!(ai.configure_behavior::<FollowBehavior>("Chase", |_| ()), None);
        assert_eq!(ai.configure_behavior::<ChaseBehavior>("Fly", |_| ()), None);
    }

    #[test]
    fn test_release_drops_player_target() {
        let ai = manager();
        let player = Entity::spawn("player", Vec2::ZERO);
        ai.set_player_target(Some(&player));

        ai.broadcast_message(BehaviorMessage::ReleaseEntities, false);
        assert!(ai.player_target().is_none());
    }

    #[test]
    fn test_wrong_type_access_is_none() {
        let ai = manager();
        assert!(ai.with_behavior::<FollowBehavior, _>("Chase", |_| ()).is_none());
    }

    #[test]
    fn test_subsystem_clean_drops_everything() {
        let ai = manager();
        let player = Entity::spawn("player", Vec2::ZERO);
        ai.set_player_target(Some(&player));
        Subsystem::clean(&ai).unwrap();
        assert_eq!(ai.behavior_count(), 0);
        assert!(ai.player_target().is_none());
    }
}
