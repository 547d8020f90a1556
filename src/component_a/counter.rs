//! counter.rs
//! Per-chute and global coin tallies. Monotonic for the process lifetime; the global tally is
//! always the sum of the three chute tallies.

use crate::component_a::sensor::Chute;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TallySnapshot {
    pub per_chute: [u64; 3],
    pub global: u64,
}

impl TallySnapshot {
    pub fn count(&self, chute: Chute) -> u64 {
        self.per_chute[chute.index()]
    }
}

#[derive(Debug, Default)]
pub struct CoinCounter {
    tally: TallySnapshot,
}

impl CoinCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_edge(&mut self, chute: Chute) {
        self.tally.per_chute[chute.index()] += 1;
        self.tally.global += 1;
    }

    pub fn snapshot(&self) -> TallySnapshot {
        self.tally
    }

    pub fn global(&self) -> u64 {
        self.tally.global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_is_sum_of_chutes() {
        let mut counter = CoinCounter::new();
        for chute in [Chute::One, Chute::Three, Chute::One, Chute::Two] {
            counter.on_edge(chute);
        }
        let snap = counter.snapshot();
        assert_eq!(snap.per_chute, [2, 1, 1]);
        assert_eq!(snap.global, snap.per_chute.iter().sum::<u64>());
        assert_eq!(snap.count(Chute::One), 2);
    }
}
