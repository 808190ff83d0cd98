//! Randomized pause between consecutive mutating Drive calls
//!
//! This is a pacing sleep, not backoff: the delay does not grow with
//! failures and nothing is retried. The first call passes through
//! immediately; every later call waits a uniformly random duration in
//! `[min_delay, max_delay]`.

use rand::Rng;
use std::time::Duration;
use tracing::trace;

use crate::config::ThrottleConfig;

#[derive(Debug, Clone)]
pub struct CallThrottle {
    min_delay: Duration,
    max_delay: Duration,
    calls: u64,
}

impl CallThrottle {
    /// Bounds are swapped if given in the wrong order
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };
        Self {
            min_delay,
            max_delay,
            calls: 0,
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// A throttle that never sleeps
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Pick the next delay within the configured bounds
    pub fn next_delay(&self) -> Duration {
        if self.min_delay == self.max_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Wait before the next call, except before the very first one
    pub async fn pause(&mut self) {
        if self.calls > 0 {
            let delay = self.next_delay();
            if !delay.is_zero() {
                trace!("Throttling next call by {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
        }
        self.calls += 1;
    }

    /// Number of calls that went through `pause`
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_next_delay_within_bounds() {
        let throttle = CallThrottle::new(Duration::from_millis(250), Duration::from_millis(1000));
        for _ in 0..200 {
            let delay = throttle.next_delay();
            assert!(delay >= Duration::from_millis(250));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_bounds_are_normalized() {
        let throttle = CallThrottle::new(Duration::from_millis(90), Duration::from_millis(10));
        let delay = throttle.next_delay();
        assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(90));
    }

    #[test]
    fn test_from_config() {
        let config = ThrottleConfig {
            min_delay_ms: 5,
            max_delay_ms: 5,
        };
        assert_eq!(
            CallThrottle::from_config(&config).next_delay(),
            Duration::from_millis(5)
        );
    }

    #[tokio::test]
    async fn test_first_call_is_not_delayed() {
        let mut throttle = CallThrottle::new(Duration::from_millis(40), Duration::from_millis(60));

        let start = Instant::now();
        throttle.pause().await;
        assert!(start.elapsed() < Duration::from_millis(40));

        let start = Instant::now();
        throttle.pause().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(throttle.calls(), 2);
    }

    #[tokio::test]
    async fn test_disabled_never_sleeps() {
        let mut throttle = CallThrottle::disabled();
        let start = Instant::now();
        for _ in 0..10 {
            throttle.pause().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(throttle.calls(), 10);
    }
}
