pub mod ai_demo;
pub mod state;

pub use ai_demo::AiDemoState;
pub use state::{GameState, GameStateManager, Transition};
