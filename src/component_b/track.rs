//! track.rs
//! Predefined tracks. Track 1 is a closed oval, tracks 2 and 3 are open paths.

use std::time::Duration;

/// Distance below which a waypoint counts as reached.
pub const ARRIVAL_RADIUS: f64 = 1.5;
/// Distance to the start (or final) point that closes a lap.
pub const START_PROXIMITY_RADIUS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance(&self, other: &Point2) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackId {
    One,
    Two,
    Three,
}

impl TrackId {
    pub const ALL: [TrackId; 3] = [TrackId::One, TrackId::Two, TrackId::Three];

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(TrackId::One),
            2 => Some(TrackId::Two),
            3 => Some(TrackId::Three),
            _ => None,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            TrackId::One => 1,
            TrackId::Two => 2,
            TrackId::Three => 3,
        }
    }

    /// Wall-clock budget before a run is declared timed out.
    pub fn time_budget(&self) -> Duration {
        match self {
            TrackId::One | TrackId::Three => Duration::from_secs(180),
            TrackId::Two => Duration::from_secs(220),
        }
    }

    /// Open paths also finish when the body reaches the final point.
    pub fn is_open(&self) -> bool {
        !matches!(self, TrackId::One)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrackId::One => "Circular",
            TrackId::Two => "en S",
            TrackId::Three => "Media Luna",
        }
    }

    /// Label used in the `OK:` response to a start command.
    pub fn label(&self) -> &'static str {
        match self {
            TrackId::One => "Circular (50 monedas)",
            TrackId::Two => "en S (200 monedas)",
            TrackId::Three => "Figura 8 (1000 monedas)",
        }
    }
}

const TRACK_1: [(f64, f64); 14] = [
    (0.0, 0.0),
    (3.0, 0.0),
    (6.0, 0.0),
    (9.0, 1.0),
    (11.0, 3.0),
    (12.0, 6.0),
    (11.0, 9.0),
    (9.0, 11.0),
    (6.0, 12.0),
    (3.0, 11.0),
    (0.0, 9.0),
    (-1.0, 6.0),
    (-1.0, 3.0),
    (0.0, 0.0),
];

const TRACK_2: [(f64, f64); 15] = [
    (0.0, 0.0),
    (2.0, 0.0),
    (4.0, 0.5),
    (6.0, 1.5),
    (8.0, 2.5),
    (10.0, 3.0),
    (12.0, 3.0),
    (14.0, 2.5),
    (16.0, 1.5),
    (18.0, 0.5),
    (20.0, 0.0),
    (22.0, -0.3),
    (24.0, 0.5),
    (26.0, 1.5),
    (28.0, 2.5),
];

const TRACK_3: [(f64, f64); 8] = [
    (0.0, 0.0),
    (2.0, -1.0),
    (4.0, 0.0),
    (5.0, 2.0),
    (5.0, 4.0),
    (4.0, 6.0),
    (2.0, 7.0),
    (-1.0, 6.0),
];

/// Ordered, immutable waypoint sequence with at least two points.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    id: TrackId,
    points: Vec<Point2>,
}

impl Track {
    pub fn predefined(id: TrackId) -> Self {
        let raw: &[(f64, f64)] = match id {
            TrackId::One => &TRACK_1,
            TrackId::Two => &TRACK_2,
            TrackId::Three => &TRACK_3,
        };
        Self {
            id,
            points: raw.iter().map(|&(x, y)| Point2::new(x, y)).collect(),
        }
    }

    /// Custom track; `None` when fewer than two points are given.
    pub fn with_points(id: TrackId, points: Vec<Point2>) -> Option<Self> {
        (points.len() >= 2).then_some(Self { id, points })
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn start(&self) -> Point2 {
        self.points[0]
    }

    pub fn finish(&self) -> Point2 {
        self.points[self.points.len() - 1]
    }

    pub fn last_index(&self) -> usize {
        self.points.len() - 1
    }
}
