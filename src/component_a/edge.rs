//! edge.rs
//! Coin edge detection on a sampled beam level.
//!
//! With active-low sensors (`inverted_logic = true`) a coin is the 1→0 transition;
//! otherwise it is 0→1. A level held across samples never counts twice.

use crate::component_a::sensor::Chute;

/// True exactly when `previous → current` is the "coin entered the beam" transition.
pub fn detect(current: bool, previous: bool, inverted_logic: bool) -> bool {
    if inverted_logic {
        previous && !current
    } else {
        !previous && current
    }
}

/// Remembers the last sampled level of one chute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorChannel {
    chute: Chute,
    previous: bool,
    inverted_logic: bool,
}

impl SensorChannel {
    /// `initial_level` is the level read at start-up, so a coin already in the beam is ignored.
    pub fn new(chute: Chute, initial_level: bool, inverted_logic: bool) -> Self {
        Self { chute, previous: initial_level, inverted_logic }
    }

    /// Feeds one sample; returns true when it completes a coin edge.
    pub fn sample(&mut self, level: bool) -> bool {
        let edge = detect(level, self.previous, self.inverted_logic);
        self.previous = level;
        edge
    }

    pub fn chute(&self) -> Chute {
        self.chute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truth_table() {
        assert!(detect(false, true, true));
        assert!(!detect(true, false, true));
        assert!(!detect(false, false, true));
        assert!(!detect(true, true, true));

        assert!(detect(true, false, false));
        assert!(!detect(false, true, false));
    }

    #[test]
    fn held_level_counts_once() {
        let mut ch = SensorChannel::new(Chute::One, true, true);
        let edges: usize = [true, false, false, false, true, false]
            .into_iter()
            .filter(|&lvl| ch.sample(lvl))
            .count();
        assert_eq!(edges, 2);
    }

    #[test]
    fn coin_present_at_startup_is_not_counted() {
        let mut ch = SensorChannel::new(Chute::Two, false, true);
        assert!(!ch.sample(false));
        assert!(!ch.sample(true));
        assert!(ch.sample(false));
    }
}
