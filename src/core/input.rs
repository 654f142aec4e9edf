//! Input collaborator
//!
//! Raw device polling lives outside the engine. An [`EventSource`] yields
//! already-decoded events each frame; the engine folds them into
//! [`InputState`], which scenes read during update.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scene-level commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Wander,
    Patrol,
    Chase,
    Follow,
    TogglePause,
    /// Leave the current scene
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    Action(Action),
    /// Window closed / process asked to stop
    Quit,
}

/// Per-frame snapshot of decoded input
#[derive(Debug, Default)]
pub struct InputState {
    pressed: Vec<Action>,
    quit_requested: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::Action(action) => self.pressed.push(action),
            InputEvent::Quit => self.quit_requested = true,
        }
    }

    pub fn was_pressed(&self, action: Action) -> bool {
        self.pressed.contains(&action)
    }

    /// Actions pressed since the last call, in arrival order
    pub fn take_pressed(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pressed)
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn clear(&mut self) {
        self.pressed.clear();
        self.quit_requested = false;
    }
}

/// Supplies input events once per frame
pub trait EventSource: Send {
    fn poll(&mut self) -> Vec<InputEvent>;
}

/// Replays events at fixed frame numbers (headless runs and tests)
#[derive(Debug, Default, Clone)]
pub struct ScriptedEvents {
    script: BTreeMap<u64, Vec<InputEvent>>,
    frame: u64,
}

impl ScriptedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `event` for the poll of frame `frame` (0-based)
    pub fn at(mut self, frame: u64, event: InputEvent) -> Self {
        self.script.entry(frame).or_default().push(event);
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.values().map(Vec::len).sum()
    }
}

impl EventSource for ScriptedEvents {
    fn poll(&mut self) -> Vec<InputEvent> {
        let events = self.script.remove(&self.frame).unwrap_or_default();
        self.frame += 1;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_replays_by_frame() {
        let mut events = ScriptedEvents::new()
            .at(1, InputEvent::Action(Action::Chase))
            .at(1, InputEvent::Action(Action::TogglePause))
            .at(3, InputEvent::Quit);

        assert!(events.poll().is_empty());
        assert_eq!(
            events.poll(),
            vec![
                InputEvent::Action(Action::Chase),
                InputEvent::Action(Action::TogglePause)
            ]
        );
        assert!(events.poll().is_empty());
        assert_eq!(events.poll(), vec![InputEvent::Quit]);
        assert_eq!(events.remaining(), 0);
    }

    #[test]
    fn test_input_state_collects_actions() {
        let mut input = InputState::new();
        input.apply(InputEvent::Action(Action::Follow));
        input.apply(InputEvent::Quit);

        assert!(input.was_pressed(Action::Follow));
        assert!(input.quit_requested());
        assert_eq!(input.take_pressed(), vec![Action::Follow]);
        assert!(!input.was_pressed(Action::Follow));

        input.clear();
        assert!(!input.quit_requested());
    }
}
