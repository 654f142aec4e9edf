//! Update/render handoff
//!
//! The update may run on a worker while the main thread keeps the surface.
//! An update holds the update-phase lock from `begin_update` until its guard
//! drops, and render holds a separate lock, so two updates never overlap and
//! neither phase blocks the other. The main thread waits on a condition
//! variable for the "update completed" flag and clears it for the next cycle.

use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct FrameSync {
    /// Held for the whole update phase
    update_phase: Mutex<()>,
    /// Completed flag
    update: Mutex<bool>,
    update_done: Condvar,
    /// Guards the render phase
    render: Mutex<()>,
}

/// Held for the duration of one update. Dropping it marks the update
/// complete, so a panicking update still releases the waiter.
pub struct UpdateGuard<'a> {
    sync: &'a FrameSync,
    phase: Option<MutexGuard<'a, ()>>,
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        // Leave the phase before waking the waiter
        self.phase.take();
        self.sync.signal_update_complete();
    }
}

impl FrameSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an update cycle, waiting for any update still in progress
    pub fn begin_update(&self) -> UpdateGuard<'_> {
        let phase = self.update_phase.lock();
        *self.update.lock() = false;
        UpdateGuard {
            sync: self,
            phase: Some(phase),
        }
    }

    pub fn is_updating(&self) -> bool {
        self.update_phase.is_locked()
    }

    pub fn signal_update_complete(&self) {
        let mut completed = self.update.lock();
        *completed = true;
        self.update_done.notify_all();
    }

    /// Block until the current update completes, then clear the flag
    pub fn wait_for_update(&self) {
        let mut completed = self.update.lock();
        while !*completed {
            self.update_done.wait(&mut completed);
        }
        *completed = false;
    }

    /// Like `wait_for_update` with a deadline; false on timeout
    pub fn wait_for_update_timeout(&self, timeout: Duration) -> bool {
        let mut completed = self.update.lock();
        if !*completed {
            let result = self
                .update_done
                .wait_while_for(&mut completed, |done| !*done, timeout);
            if result.timed_out() && !*completed {
                return false;
            }
        }
        *completed = false;
        true
    }

    pub fn is_update_complete(&self) -> bool {
        *self.update.lock()
    }

    /// Lock the render phase
    pub fn lock_render(&self) -> MutexGuard<'_, ()> {
        self.render.lock()
    }
}
