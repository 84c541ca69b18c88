//! Reconnection policy and retry bookkeeping
//!
//! The reconnection controller runs a bounded loop: attempt `n` waits
//! `base_delay * backoff_multiplier^(n-1)` before tearing the old link down
//! and establishing a fresh session. With the defaults that is 2000, 3000
//! and 4500 ms before giving up.
//!
//! ```rust
//! # use skylark_client_core::client::recovery::RetryConfig;
//! # use std::time::Duration;
//! let config = RetryConfig::default();
//! assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
//! assert_eq!(config.delay_for_attempt(2), Duration::from_millis(3000));
//! assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4500));
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::client::config::{duration_ms, option_duration_ms};
use crate::error::{ClientError, ClientResult};

/// Configuration for reconnection behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before the controller gives up
    pub max_attempts: u32,
    /// Delay before the first attempt
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Growth factor between attempts
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay
    #[serde(rename = "max_delay_ms", with = "option_duration_ms")]
    pub max_delay: Option<Duration>,
    /// Spread delays by +/-10%
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            backoff_multiplier: 1.5,
            max_delay: None,
            use_jitter: false,
        }
    }
}

impl RetryConfig {
    /// Delay to wait before attempt number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut millis = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        if let Some(max_delay) = self.max_delay {
            millis = millis.min(max_delay.as_millis() as f64);
        }

        if self.use_jitter {
            let jitter = (rand::random::<f64>() - 0.5) * 0.2;
            millis *= 1.0 + jitter;
        }

        Duration::from_millis(millis.round().max(0.0) as u64)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.base_delay.is_zero() {
            return Err(ClientError::invalid_configuration("retry.base_delay", "must be positive"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ClientError::invalid_configuration(
                "retry.backoff_multiplier",
                "must be a finite number >= 1.0",
            ));
        }
        if let Some(max_delay) = self.max_delay {
            if max_delay < self.base_delay {
                return Err(ClientError::invalid_configuration(
                    "retry.max_delay",
                    "must not be shorter than base_delay",
                ));
            }
        }
        Ok(())
    }
}

/// Where the reconnection controller currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectPhase {
    /// No reconnection running
    #[default]
    Idle,
    /// Attempts are in progress
    Attempting,
    /// Attempts ran out; only `start()` leaves this phase
    Exhausted,
}

/// Live retry bookkeeping of one client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryState {
    /// Attempts made in the current reconnection sequence
    pub attempt_count: u32,
    /// True while a reconnection sequence owns the link
    pub is_reconnecting: bool,
    pub phase: ReconnectPhase,
    /// Generation of a link that failed while a sequence owned the link
    pub pending_failure: Option<u64>,
}

impl RetryState {
    /// Clear the attempt counter. Returns true when it was non-zero.
    pub fn reset_attempts(&mut self) -> bool {
        let had_attempts = self.attempt_count > 0;
        self.attempt_count = 0;
        had_attempts
    }

    /// Back to idle with no attempts
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Run `future`, failing with [`ClientError::OperationTimeout`] after `timeout`
pub async fn with_timeout<T, F>(operation_name: &str, timeout: Duration, future: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "Operation timed out"
            );
            Err(ClientError::OperationTimeout {
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}
