//! tracker.rs
//! Waypoint cursor over a track. The cursor starts at 0, only moves forward and stops at the
//! last index.

use crate::component_b::track::{ARRIVAL_RADIUS, Point2, Track};

#[derive(Debug, Clone)]
pub struct WaypointTracker {
    track: Track,
    cursor: usize,
    arrival_radius: f64,
}

impl WaypointTracker {
    pub fn new(track: Track) -> Self {
        Self { track, cursor: 0, arrival_radius: ARRIVAL_RADIUS }
    }

    /// Advances at most one waypoint when `position` is inside the arrival radius of the
    /// current target, then returns the (possibly new) target.
    pub fn update(&mut self, position: Point2) -> Point2 {
        let target = self.track.points()[self.cursor];
        if position.distance(&target) < self.arrival_radius && self.cursor < self.track.last_index() {
            self.cursor += 1;
        }
        self.target()
    }

    #[inline]
    pub fn target(&self) -> Point2 {
        self.track.points()[self.cursor]
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn at_last(&self) -> bool {
        self.cursor == self.track.last_index()
    }
}
