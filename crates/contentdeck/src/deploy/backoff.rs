use std::time::Duration;

/// Growth factor between consecutive delays.
pub const BACKOFF_FACTOR: f64 = 1.5;

/// Capped exponential backoff: `min(initial * 1.5^attempt, max)`.
///
/// Iterating yields the delay for attempt 0, 1, 2, ... and never ends.
///
/// ```
/// use std::time::Duration;
/// use contentdeck::deploy::Backoff;
///
/// let delays: Vec<u128> = Backoff::new(Duration::from_millis(2000), Duration::from_millis(10000))
///     .take(6)
///     .map(|d| d.as_millis())
///     .collect();
/// assert_eq!(delays, vec![2000, 3000, 4500, 6750, 10000, 10000]);
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    /// Delay before the given (zero-based) attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let scaled = self.initial.as_millis() as f64 * BACKOFF_FACTOR.powi(exponent);
        let capped = scaled.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn default_sequence_grows_by_half_and_caps() {
        let backoff = Backoff::new(Duration::from_millis(2000), Duration::from_millis(10000));
        let delays: Vec<Duration> = backoff.take(7).collect();
        assert_eq!(delays, ms(&[2000, 3000, 4500, 6750, 10000, 10000, 10000]));
    }

    #[test]
    fn delay_is_stateless_and_saturates() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_millis(225));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn cap_below_initial_wins() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next(), Some(Duration::from_secs(1)));
    }
}
