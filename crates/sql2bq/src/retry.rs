//! Retry policy with exponential backoff for batch loads.
//!
//! The attempt ceiling is the contract; backoff between attempts only spreads
//! load when BigQuery is throttling or briefly unavailable.

use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Creates a config that retries immediately (for tests).
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Calculates the delay before the attempt following `failed_attempts` failures.
    pub fn delay_for_attempt(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(failed_attempts.saturating_sub(1) as i32);

        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.add_jitter {
            // Add up to 25% jitter
            let jitter = capped_delay * 0.25 * rand_jitter();
            capped_delay + jitter
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Backoff delay, stretched to the wait the destination asked for.
    pub fn delay_after(&self, failed_attempts: u32, retry_after: Option<Duration>) -> Duration {
        self.delay_for_attempt(failed_attempts)
            .max(retry_after.unwrap_or_default())
    }
}

/// Simple pseudo-random jitter (0.0 to 1.0) without external dependencies.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        // Arrange & Act
        let config = RetryConfig::default();

        // Assert
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.add_jitter);
    }

    #[test]
    fn test_no_delay_config() {
        // Arrange
        let config = RetryConfig::no_delay(3);

        // Act & Assert
        assert_eq!(config.max_attempts, 3);
        for failed in 0..5 {
            assert_eq!(config.delay_for_attempt(failed), Duration::ZERO);
        }
    }

    #[test]
    fn test_delay_for_first_attempt_is_zero() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn test_delay_exponential() {
        // Arrange
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(100),
            add_jitter: false,
            ..Default::default()
        };

        // Act & Assert
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_max() {
        // Arrange
        let config = RetryConfig {
            initial_delay: Duration::from_secs(10),
            backoff_multiplier: 10.0,
            max_delay: Duration::from_secs(30),
            add_jitter: false,
            ..Default::default()
        };

        // Act
        let delay = config.delay_for_attempt(5);

        // Assert
        assert_eq!(delay, Duration::from_secs(30));
    }

    #[test]
    fn test_delay_after_honors_longer_retry_after() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            add_jitter: false,
            ..Default::default()
        };

        assert_eq!(
            config.delay_after(1, Some(Duration::from_secs(20))),
            Duration::from_secs(20)
        );
        assert_eq!(
            config.delay_after(3, Some(Duration::from_millis(100))),
            Duration::from_secs(4)
        );
        assert_eq!(config.delay_after(2, None), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
            ..Default::default()
        };

        let delay = config.delay_for_attempt(1);

        assert!(delay >= Duration::from_secs(4));
        assert!(delay <= Duration::from_secs(5));
    }
}
