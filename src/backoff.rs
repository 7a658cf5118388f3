//! Exponential backoff for dial retries

use std::time::Duration;
use tokio::time::Instant;

/// Delay before the first retry.
pub const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Growth factor between consecutive delays.
pub const MULTIPLIER: f64 = 1.5;

/// Upper bound for a single delay.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Retry schedule bounded by a retry count and an overall deadline.
#[derive(Debug, Clone)]
pub struct Backoff {
    max_retries: u32,
    retries: u32,
    deadline: Instant,
}

impl Backoff {
    /// Allow up to `max_retries` retries, none of them starting after `deadline`.
    pub fn new(max_retries: u32, deadline: Instant) -> Self {
        Self {
            max_retries,
            retries: 0,
            deadline,
        }
    }

    /// Delay for a given retry number (1-based).
    pub fn delay_for_retry(retry: u32) -> Duration {
        #[allow(clippy::cast_possible_wrap)]
        let secs = INITIAL_DELAY.as_secs_f64() * MULTIPLIER.powi(retry.saturating_sub(1) as i32);
        Duration::from_secs_f64(secs.min(MAX_DELAY.as_secs_f64()))
    }

    /// Retries handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Next delay, or `None` once the retry budget or the deadline is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.max_retries {
            return None;
        }
        let delay = Self::delay_for_retry(self.retries + 1);
        if Instant::now() + delay >= self.deadline {
            return None;
        }
        self.retries += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        assert_eq!(Backoff::delay_for_retry(1), Duration::from_millis(500));
        assert_eq!(Backoff::delay_for_retry(2), Duration::from_millis(750));
        assert_eq!(Backoff::delay_for_retry(3), Duration::from_millis(1125));
    }

    #[test]
    fn test_delay_capped() {
        assert_eq!(Backoff::delay_for_retry(100), MAX_DELAY);
    }

    #[tokio::test]
    async fn test_retry_budget() {
        let mut backoff = Backoff::new(2, Instant::now() + Duration::from_secs(3600));
        assert!(backoff
            .next_delay()
            .is_some());
        assert!(backoff
            .next_delay()
            .is_some());
        assert!(backoff
            .next_delay()
            .is_none());
        assert_eq!(backoff.retries(), 2);
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let mut backoff = Backoff::new(0, Instant::now() + Duration::from_secs(3600));
        assert!(backoff
            .next_delay()
            .is_none());
    }

    #[tokio::test]
    async fn test_deadline_stops_retries() {
        let mut backoff = Backoff::new(10, Instant::now() + Duration::from_millis(100));
        assert!(backoff
            .next_delay()
            .is_none());
    }
}
