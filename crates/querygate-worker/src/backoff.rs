//! Reconnect backoff.

use std::time::Duration;

/// Exponential backoff with bounded randomization, used between attempts to
/// reopen a frontend stream.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    randomization: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2.0,
            randomization: 0.2,
        }
    }

    /// Randomization factor in `[0.0, 1.0]`; zero makes delays exact.
    pub fn randomization(mut self, factor: f64) -> Self {
        self.randomization = factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before reconnection attempt `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exp);
        let capped = base.min(self.max.as_secs_f64());

        let jitter = if self.randomization > 0.0 {
            1.0 + self.randomization * (2.0 * rand::random::<f64>() - 1.0)
        } else {
            1.0
        };
        Duration::from_secs_f64((capped * jitter).clamp(0.0, self.max.as_secs_f64()))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(5))
    }
}
