//! Scene lifecycle
//!
//! A [`GameState`] is one screen of the game (menu, demo, gameplay). The
//! [`GameStateManager`] owns every registered state by name and guarantees
//! the current state is exited before the next one is entered.

use hashbrown::HashMap;
use tracing::{error, info, warn};

use crate::core::context::EngineContext;
use crate::core::surface::Surface;

/// What the engine should do after a state's update
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Transition {
    #[default]
    None,
    /// Exit the current state and enter the named one
    Switch(String),
    /// Stop the engine
    Quit,
}

pub trait GameState: Send {
    fn name(&self) -> &str;

    fn enter(&mut self, ctx: &EngineContext) -> anyhow::Result<()>;

    fn update(&mut self, ctx: &EngineContext, dt: f32) -> Transition;

    fn render(&self, surface: &mut dyn Surface);

    fn exit(&mut self, ctx: &EngineContext) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct GameStateManager {
    states: HashMap<String, Box<dyn GameState>>,
    current: Option<String>,
}

impl GameStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state under its own name. The current state cannot be
    /// replaced while active.
    pub fn add_state(&mut self, state: Box<dyn GameState>) -> bool {
        let name = state.name().to_string();
        if self.current.as_deref() == Some(name.as_str()) {
            warn!("Cannot replace active state '{}'", name);
            return false;
        }
        self.states.insert(name, state);
        true
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Exit the current state (its failure is logged, not fatal) and enter
    /// `name`. Unknown names leave the current state running.
    pub fn change_state(&mut self, ctx: &EngineContext, name: &str) -> anyhow::Result<()> {
        if !self.states.contains_key(name) {
            anyhow::bail!("unknown game state '{}'", name);
        }

        self.exit_current(ctx);

        let state = self
            .states
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("unknown game state '{}'", name))?;
        info!("Entering state '{}'", name);
        state.enter(ctx)?;
        self.current = Some(name.to_string());
        Ok(())
    }

    /// Update the current state, applying a requested switch
    pub fn update(&mut self, ctx: &EngineContext, dt: f32) -> anyhow::Result<Transition> {
        let Some(state) = self.current.as_deref().and_then(|name| self.states.get_mut(name)) else {
            return Ok(Transition::None);
        };

        let transition = state.update(ctx, dt);
        if let Transition::Switch(next) = &transition {
            self.change_state(ctx, next)?;
        }
        Ok(transition)
    }

    pub fn render(&self, surface: &mut dyn Surface) {
        if let Some(state) = self.current.as_deref().and_then(|name| self.states.get(name)) {
            state.render(surface);
        }
    }

    /// Exit the current state and drop every registered state
    pub fn clear(&mut self, ctx: &EngineContext) -> anyhow::Result<()> {
        let result = match self.current.take() {
            Some(name) => match self.states.get_mut(&name) {
                Some(state) => {
                    info!("Exiting state '{}'", name);
                    state.exit(ctx)
                }
                None => Ok(()),
            },
            None => Ok(()),
        };
        self.states.clear();
        result
    }

    fn exit_current(&mut self, ctx: &EngineContext) {
        if let Some(name) = self.current.take() {
            if let Some(state) = self.states.get_mut(&name) {
                info!("Exiting state '{}'", name);
                if let Err(e) = state.exit(ctx) {
                    error!("State '{}' failed to exit cleanly: {:#}", name, e);
                }
            }
        }
    }
}

impl std::fmt::Debug for GameStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameStateManager")
            .field("states", &self.states.len())
            .field("current", &self.current)
            .finish()
    }
}
