//! Presentation surface collaborator
//!
//! Rendering is external; the engine only needs to hand a surface to the
//! active scene each frame and close it on shutdown.

use crate::util::vec2::Vec2;

/// What a scene can draw
pub trait Surface: Send {
    fn begin_frame(&mut self);

    fn draw_entity(&mut self, name: &str, position: Vec2);

    fn draw_text(&mut self, text: &str, position: Vec2);

    fn present(&mut self);

    fn close(&mut self) -> anyhow::Result<()>;
}

/// Counts draw calls instead of drawing
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    frames_presented: u64,
    entities_last_frame: usize,
    pending_entities: usize,
    last_text: Option<String>,
    closed: bool,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn entities_last_frame(&self) -> usize {
        self.entities_last_frame
    }

    pub fn last_text(&self) -> Option<&str> {
        self.last_text.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Surface for HeadlessSurface {
    fn begin_frame(&mut self) {
        self.pending_entities = 0;
    }

    fn draw_entity(&mut self, _name: &str, _position: Vec2) {
        self.pending_entities += 1;
    }

    fn draw_text(&mut self, text: &str, _position: Vec2) {
        self.last_text = Some(text.to_string());
    }

    fn present(&mut self) {
        self.entities_last_frame = self.pending_entities;
        self.frames_presented += 1;
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if self.closed {
            anyhow::bail!("surface already closed");
        }
        self.closed = true;
        Ok(())
    }
}
