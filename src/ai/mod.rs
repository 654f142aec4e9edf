//! Behavior-driven agent AI
//!
//! Structure:
//! - `behavior`: the strategy contract, control messages, per-tick context
//! - `entity_states`: per-entity runtime-state arena used by every behavior
//! - `formation`: shared escort slot pool
//! - `behaviors`: Chase, Follow, Wander, Patrol
//! - `manager`: registry, assignment table, message queue and dispatch

pub mod behavior;
pub mod behaviors;
pub mod entity_states;
pub mod formation;
pub mod manager;

pub use behavior::{Behavior, BehaviorMessage, TargetView, TickContext};
pub use entity_states::EntityStates;
pub use formation::FormationSlots;
pub use manager::{AiConfig, AiError, AiManager, AiStats};
