//! watermark.rs
//! "Fire every N units" gate over a monotonic counter. The mark only moves forward and never
//! passes the counter it tracks.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    threshold: u64,
    mark: u64,
}

impl Watermark {
    pub fn new(threshold: u64) -> Self {
        Self { threshold, mark: 0 }
    }

    pub fn with_mark(threshold: u64, mark: u64) -> Self {
        Self { threshold, mark }
    }

    pub fn is_due(&self, value: u64) -> bool {
        value.saturating_sub(self.mark) >= self.threshold
    }

    /// Moves the mark to `value`. Values behind the current mark are ignored.
    pub fn advance(&mut self, value: u64) {
        self.mark = self.mark.max(value);
    }

    pub fn mark(&self) -> u64 {
        self.mark
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_after_threshold_and_advance_resets() {
        let mut wm = Watermark::new(5);
        assert!(!wm.is_due(4));
        assert!(wm.is_due(5));

        wm.advance(7);
        assert_eq!(wm.mark(), 7);
        assert!(!wm.is_due(11));
        assert!(wm.is_due(12));
    }

    #[test]
    fn mark_never_moves_backwards() {
        let mut wm = Watermark::with_mark(5, 10);
        wm.advance(3);
        assert_eq!(wm.mark(), 10);
        assert!(!wm.is_due(3));
    }
}
