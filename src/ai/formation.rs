//! Formation slot pool shared by every clone of a follow behavior
//!
//! Slots are handed out lowest-free-first, so steady assign/unassign churn
//! keeps reusing the same indices instead of growing the pool.

use std::f32::consts::TAU;

use bitvec::prelude::*;
use parking_lot::Mutex;

use crate::util::vec2::Vec2;

/// Slots per formation ring
pub const SLOTS_PER_RING: usize = 8;

#[derive(Debug, Default)]
pub struct FormationSlots {
    occupied: Mutex<BitVec>,
}

impl FormationSlots {
    pub fn new() -> Self {
        Self::with_capacity(SLOTS_PER_RING)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            occupied: Mutex::new(bitvec![0; capacity]),
        }
    }

    /// Claim the lowest free slot, extending the pool only when full
    pub fn allocate(&self) -> usize {
        let mut occupied = self.occupied.lock();
        match occupied.first_zero() {
            Some(slot) => {
                occupied.set(slot, true);
                slot
            }
            None => {
                occupied.push(true);
                occupied.len() - 1
            }
        }
    }

    /// Return a slot to the pool; releasing a free slot is a no-op
    pub fn release(&self, slot: usize) -> bool {
        let mut occupied = self.occupied.lock();
        match occupied.get(slot).map(|bit| *bit) {
            Some(true) => {
                occupied.set(slot, false);
                true
            }
            _ => false,
        }
    }

    pub fn is_allocated(&self, slot: usize) -> bool {
        self.occupied
            .lock()
            .get(slot)
            .map(|bit| *bit)
            .unwrap_or(false)
    }

    pub fn allocated_count(&self) -> usize {
        self.occupied.lock().count_ones()
    }

    /// Number of slots the pool has ever needed
    pub fn capacity(&self) -> usize {
        self.occupied.lock().len()
    }
}

/// Offset of `slot` relative to an escort target facing +X
///
/// Eight slots per ring, evenly spaced, starting behind the target. Each
/// further ring sits one `radius` further out and is rotated half a step.
pub fn slot_offset(slot: usize, radius: f32) -> Vec2 {
    let ring = slot / SLOTS_PER_RING;
    let index = slot % SLOTS_PER_RING;
    let step = TAU / SLOTS_PER_RING as f32;
    let stagger = if ring % 2 == 1 { step * 0.5 } else { 0.0 };
    let angle = std::f32::consts::PI + index as f32 * step + stagger;
    Vec2::from_angle(angle) * (radius * (ring + 1) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_distinct_slots() {
        let pool = FormationSlots::new();
        let slots: Vec<usize> = (0..5).map(|_| pool.allocate()).collect();
        assert_eq!(slots, vec![0, 1, 2, 3, 4]);
        assert_eq!(pool.allocated_count(), 5);
    }

    #[test]
    fn test_released_slot_is_reused() {
        let pool = FormationSlots::new();
        for _ in 0..4 {
            pool.allocate();
        }
        assert!(pool.release(1));
        assert!(!pool.is_allocated(1));
        assert_eq!(pool.allocate(), 1);
    }

    #[test]
    fn test_double_release_is_noop() {
        let pool = FormationSlots::new();
        let slot = pool.allocate();
        assert!(pool.release(slot));
        assert!(!pool.release(slot));
        assert!(!pool.release(500));
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn test_grows_only_when_full() {
        let pool = FormationSlots::with_capacity(2);
        pool.allocate();
        pool.allocate();
        assert_eq!(pool.allocate(), 2);
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn test_churn_does_not_grow_pool() {
        let pool = FormationSlots::new();
        for _ in 0..1000 {
            let slot = pool.allocate();
            pool.release(slot);
        }
        assert_eq!(pool.capacity(), SLOTS_PER_RING);
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn test_slot_offsets() {
        let first = slot_offset(0, 80.0);
        assert!(first.approx_eq(Vec2::new(-80.0, 0.0), 1e-3));

        // Distinct positions within a ring
        let a = slot_offset(1, 80.0);
        let b = slot_offset(2, 80.0);
        assert!(a.distance_to(b) > 1.0);

        // Second ring is further out
        assert!((slot_offset(SLOTS_PER_RING, 80.0).length() - 160.0).abs() < 1e-3);
    }
}
