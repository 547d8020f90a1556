//! lap.rs
//! Completion check. A lap closes when the cursor has reached the second-to-last point and the
//! body is back near the start; open tracks also finish when the cursor sits on the last point
//! and the body is near it. Either condition completes the run.

use crate::component_b::track::{Point2, START_PROXIMITY_RADIUS, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Returned to the start point.
    LapClosed,
    /// Reached the final point of an open track.
    FinishReached,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapMonitor {
    radius: f64,
}

impl Default for LapMonitor {
    fn default() -> Self {
        Self { radius: START_PROXIMITY_RADIUS }
    }
}

impl LapMonitor {
    pub fn is_complete(&self, cursor: usize, track_len: usize, position: Point2, start: Point2) -> bool {
        cursor + 2 >= track_len && position.distance(&start) < self.radius
    }

    pub fn reached_finish(&self, cursor: usize, track_len: usize, position: Point2, finish: Point2) -> bool {
        cursor + 1 >= track_len && position.distance(&finish) < self.radius
    }

    pub fn evaluate(&self, track: &Track, cursor: usize, position: Point2) -> Option<Completion> {
        let closed = self.is_complete(cursor, track.points().len(), position, track.start());
        let finished = track.id().is_open()
            && self.reached_finish(cursor, track.points().len(), position, track.finish());

        if closed {
            Some(Completion::LapClosed)
        } else if finished {
            Some(Completion::FinishReached)
        } else {
            None
        }
    }
}
