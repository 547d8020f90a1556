//! dispatch.rs
//! Decides when a chute has collected enough coins to start its track.
//!
//! - Chutes are checked in priority order 1, 2, 3 and at most one command goes out per tick.
//! - A chute's watermark only moves after the command was actually delivered, so a failed send
//!   is retried on the next tick (at-least-once).
//! - While chute 1 keeps qualifying every tick, chutes 2 and 3 wait.

use log::debug;

use crate::component_a::{counter::TallySnapshot, sensor::Chute, watermark::Watermark};
use crate::component_b::protocol::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub chute: Chute,
    pub command: Command,
    /// Chute tally at decision time; becomes the new watermark on confirm.
    pub tally: u64,
}

#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    marks: [Watermark; 3],
}

impl DispatchPolicy {
    pub fn new(threshold: u64) -> Self {
        Self { marks: [Watermark::new(threshold); 3] }
    }

    pub fn with_watermarks(threshold: u64, marks: [u64; 3]) -> Self {
        Self { marks: marks.map(|m| Watermark::with_mark(threshold, m)) }
    }

    pub fn decide(&self, tally: &TallySnapshot) -> Option<Dispatch> {
        Chute::ALL.into_iter().find_map(|chute| {
            let count = tally.count(chute);
            self.marks[chute.index()].is_due(count).then(|| Dispatch {
                chute,
                command: Command::StartTrack(chute.track()),
                tally: count,
            })
        })
    }

    /// Call only after the command for `dispatch` was sent successfully.
    pub fn confirm(&mut self, dispatch: &Dispatch) {
        let mark = &mut self.marks[dispatch.chute.index()];
        mark.advance(dispatch.tally);
        debug!("[Dispatch] chute {} watermark -> {}", dispatch.chute.number(), mark.mark());
    }

    pub fn watermark(&self, chute: Chute) -> u64 {
        self.marks[chute.index()].mark()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component_b::track::TrackId;

    fn tally(per_chute: [u64; 3]) -> TallySnapshot {
        TallySnapshot { per_chute, global: per_chute.iter().sum() }
    }

    #[test]
    fn nothing_due_below_threshold() {
        let policy = DispatchPolicy::new(5);
        assert_eq!(policy.decide(&tally([4, 4, 4])), None);
    }

    #[test]
    fn first_qualifying_chute_wins() {
        let policy = DispatchPolicy::with_watermarks(5, [5, 0, 0]);
        let d = policy.decide(&tally([12, 3, 0])).unwrap();
        assert_eq!(d.chute, Chute::One);
        assert_eq!(d.command, Command::StartTrack(TrackId::One));
        assert_eq!(d.tally, 12);
    }

    #[test]
    fn watermark_moves_only_on_confirm() {
        let mut policy = DispatchPolicy::with_watermarks(5, [5, 0, 0]);
        let d = policy.decide(&tally([12, 3, 0])).unwrap();
        assert_eq!(policy.watermark(Chute::One), 5);

        policy.confirm(&d);
        assert_eq!(policy.watermark(Chute::One), 12);
        assert_eq!(policy.decide(&tally([12, 3, 0])), None);
    }

    #[test]
    fn later_chute_waits_while_earlier_one_qualifies() {
        let policy = DispatchPolicy::new(5);
        let d = policy.decide(&tally([5, 9, 7])).unwrap();
        assert_eq!(d.chute, Chute::One);
    }
}
