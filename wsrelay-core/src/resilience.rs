//! Resilience primitives for calls against storage and the push channel
//!
//! Default timeouts for external calls and the bounded exponential backoff
//! used by retry loops.

pub mod timeout {
    //! Default timeouts for external service calls

    use std::time::Duration;

    /// Default timeout for Redis operations
    pub const REDIS_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default timeout for push-channel HTTP requests
    pub const PUSH_REQUEST_TIMEOUT: Duration = Duration::from_secs(4);
}

pub mod backoff {
    //! Bounded exponential backoff
    //!
    //! ```text
    //! Retry  Backoff  Total elapsed
    //! 0      0        0
    //! 1      200ms    0.2s
    //! 2      400ms    0.6s
    //! 3      800ms    1.4s
    //! 4      1600ms   3.0s
    //! 5      3200ms   6.2s
    //! 6      6400ms   12.6s
    //! 7      12800ms  25.4s
    //! ```
    //!
    //! Usage:
    //!
    //! ```ignore
    //! let mut bo = Backoff::new(5);
    //! loop {
    //!     if try_work().await? {
    //!         break;
    //!     }
    //!     bo.wait().await?;
    //! }
    //! ```

    use std::time::Duration;

    use crate::error::BackoffExhausted;

    /// Base unit multiplied by `2^attempt`.
    pub const BASE_DELAY: Duration = Duration::from_millis(100);

    /// Retry state for one logical retry loop.
    ///
    /// Starts at attempt 0 (the first try, no delay). Each `advance` moves to
    /// the next attempt and yields `2^attempt * 100ms`. Once `max_attempts`
    /// advances have been handed out the next call fails.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Backoff {
        attempt: u32,
        max_attempts: u32,
    }

    impl Backoff {
        #[must_use]
        pub const fn new(max_attempts: u32) -> Self {
            Self {
                attempt: 0,
                max_attempts,
            }
        }

        #[must_use]
        pub const fn attempt(&self) -> u32 {
            self.attempt
        }

        #[must_use]
        pub const fn max_attempts(&self) -> u32 {
            self.max_attempts
        }

        /// Move to the next attempt and return how long to wait before it.
        pub fn advance(&mut self) -> Result<Duration, BackoffExhausted> {
            if self.attempt >= self.max_attempts {
                return Err(BackoffExhausted {
                    attempts: self.attempt,
                });
            }
            self.attempt += 1;
            Ok(delay_for(self.attempt))
        }

        /// `advance`, then sleep for the returned delay.
        pub async fn wait(&mut self) -> Result<(), BackoffExhausted> {
            let delay = self.advance()?;
            tracing::debug!(
                attempt = self.attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Backing off"
            );
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }

    /// Delay before attempt `n`; attempt 0 is the first try and never waits.
    #[must_use]
    pub fn delay_for(attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        BASE_DELAY.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::backoff::{delay_for, Backoff};
    use std::time::Duration;

    #[test]
    fn test_backoff_delays_double() {
        let mut bo = Backoff::new(7);
        let delays: Vec<u128> = (0..7)
            .map(|_| bo.advance().unwrap().as_millis())
            .collect();

        assert_eq!(delays, vec![200, 400, 800, 1600, 3200, 6400, 12800]);
    }

    #[test]
    fn test_backoff_cumulative_schedule() {
        let mut bo = Backoff::new(7);
        let mut total = Duration::ZERO;
        let mut elapsed = vec![total.as_millis()];
        for _ in 0..7 {
            total += bo.advance().unwrap();
            elapsed.push(total.as_millis());
        }

        assert_eq!(elapsed, vec![0, 200, 600, 1400, 3000, 6200, 12600, 25400]);
    }

    #[test]
    fn test_backoff_exhausts_on_first_excess_call() {
        for max in 0..6 {
            let mut bo = Backoff::new(max);
            for _ in 0..max {
                assert!(bo.advance().is_ok());
            }
            let err = bo.advance().unwrap_err();
            assert_eq!(err.attempts, max);
            // Stays exhausted
            assert!(bo.advance().is_err());
        }
    }

    #[test]
    fn test_zero_ceiling_never_retries() {
        let mut bo = Backoff::new(0);
        assert!(bo.advance().is_err());
        assert_eq!(bo.attempt(), 0);
    }

    #[test]
    fn test_first_attempt_has_no_delay() {
        assert_eq!(delay_for(0), Duration::ZERO);
        assert_eq!(delay_for(1), Duration::from_millis(200));
    }

    #[test]
    fn test_delay_saturates() {
        assert_eq!(delay_for(64), Duration::from_millis(100).saturating_mul(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_for_schedule() {
        let start = tokio::time::Instant::now();
        let mut bo = Backoff::new(5);
        for _ in 0..5 {
            bo.wait().await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::from_millis(6200));
        assert!(bo.wait().await.is_err());
        assert_eq!(start.elapsed(), Duration::from_millis(6200));
    }
}
