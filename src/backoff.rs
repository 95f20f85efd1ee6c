//! Capped exponential backoff with jitter.
//!
//! Used for WebSocket connects and for header re-subscription. Each delay is
//! spread by ±25% so that many clients do not retry in lockstep.

use std::time::Duration;

/// Delay sequence: `initial`, `2 * initial`, ... capped at `max`, each jittered.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff starting at `initial` and never exceeding `max`
    /// (before jitter).
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt; doubles the base delay.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        jitter(base)
    }

    /// Start over from the initial delay after a success.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Base delay of the next attempt, without jitter.
    #[must_use]
    pub const fn current(&self) -> Duration {
        self.current
    }
}

impl Default for Backoff {
    /// 1 second initial delay, capped at 60 seconds.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn jitter(delay: Duration) -> Duration {
    let factor = 0.25 * (rand::random::<f64>() * 2.0 - 1.0);
    let shift = Duration::from_millis((delay.as_millis() as f64 * factor.abs()).round() as u64);
    if factor >= 0.0 {
        delay + shift
    } else {
        delay.saturating_sub(shift)
    }
}
