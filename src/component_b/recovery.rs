//! recovery.rs
//! Stall watchdog. Counts consecutive ticks in which the body stayed within 0.1 units of its
//! last anchor; past 120 ticks (~2 s at 60 Hz) it asks for one sideways shove.
//!
//! Heuristic only: the impulse does not guarantee the body gets free.

use crate::component_b::engine::{BodyHandle, Engine, Frame, Vec3};
use crate::component_b::track::Point2;
use crate::utils::error::EngineError;

pub const STALL_DISTANCE: f64 = 0.1;
pub const STALL_TICKS: u32 = 120;
pub const IMPULSE_FORCE: Vec3 = Vec3::new(100.0, 0.0, 0.0);
/// Application height, above the ground plane.
pub const IMPULSE_HEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impulse {
    pub force: Vec3,
    pub at: Vec3,
}

#[derive(Debug, Clone)]
pub struct StuckRecovery {
    anchor: Point2,
    stalled_ticks: u32,
    fired: u64,
}

impl StuckRecovery {
    pub fn new(start: Point2) -> Self {
        Self { anchor: start, stalled_ticks: 0, fired: 0 }
    }

    /// Feeds one tick's position. Returns the impulse on the tick the stall limit is crossed.
    pub fn observe(&mut self, position: Point2) -> Option<Impulse> {
        if position.distance(&self.anchor) < STALL_DISTANCE {
            self.stalled_ticks += 1;
        } else {
            self.stalled_ticks = 0;
            self.anchor = position;
        }

        if self.stalled_ticks > STALL_TICKS {
            self.stalled_ticks = 0;
            self.fired += 1;
            return Some(Impulse {
                force: IMPULSE_FORCE,
                at: Vec3::new(position.x, position.y, IMPULSE_HEIGHT),
            });
        }
        None
    }

    /// `observe` followed by applying the impulse to `body` if one fired.
    pub fn check<E: Engine + ?Sized>(
        &mut self,
        engine: &mut E,
        body: BodyHandle,
        position: Point2,
    ) -> Result<bool, EngineError> {
        match self.observe(position) {
            Some(impulse) => {
                engine.apply_force(body, impulse.force, impulse.at, Frame::World)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn stalled_ticks(&self) -> u32 {
        self.stalled_ticks
    }

    pub fn impulses(&self) -> u64 {
        self.fired
    }
}
