//! Exponential backoff for retry loops

use std::time::Duration;

/// Exponential backoff: doubles on each failure up to a cap, resets to
/// the initial value on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// The delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Double the delay, saturating at the cap.
    pub fn advance(&mut self) {
        self.current = std::cmp::min(self.current * 2, self.max);
    }

    /// Return to the initial delay after a success.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_doubles_and_caps() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));
        assert_eq!(b.current(), Duration::from_millis(100));
        b.advance();
        assert_eq!(b.current(), Duration::from_millis(200));
        for _ in 0..10 {
            b.advance();
        }
        assert_eq!(b.current(), Duration::from_secs(5));
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_secs(5));
        b.advance();
        b.advance();
        b.reset();
        assert_eq!(b.current(), Duration::from_millis(100));
    }
}
