//! Host-side retry policy.
//!
//! The retry decision is host policy, not part of the ABI: the plugin
//! classifies each failure as retryable or not, and the policy decides
//! how often to resubmit and how long to back off. Only errors the plugin
//! marked retryable are ever resubmitted.

use std::time::Duration;

use crate::{Error, Result};

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Values below 1 behave
    /// like 1.
    pub max_attempts: u32,

    /// Backoff before the first retry.
    pub initial_backoff: Duration,

    /// Backoff multiplier applied after each retry.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            ..Self::default()
        }
    }

    /// Run an operation, resubmitting it while it fails with a retryable
    /// plugin error. Non-retryable and host-side errors propagate on
    /// first occurrence.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(Error::Plugin(error)) if error.retryable && attempt < self.max_attempts => {
                    tracing::warn!(
                        entry_point = %error.entry_point,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        %error,
                        "retrying after transient plugin failure"
                    );
                    std::thread::sleep(backoff);
                    backoff = backoff.saturating_mul(self.multiplier);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgehub_plugin_api::PluginError;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = policy(5).run(|| {
            calls += 1;
            if calls < 3 {
                Err(Error::Plugin(
                    PluginError::new("reading_append", "transient").retryable(),
                ))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_non_retryable_error_propagates_immediately() {
        let mut calls = 0;
        let result: Result<()> = policy(5).run(|| {
            calls += 1;
            Err(Error::Plugin(PluginError::new("common_insert", "bad request")))
        });
        assert!(matches!(result, Err(Error::Plugin(e)) if !e.retryable));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retry_bound_is_honored() {
        let mut calls = 0;
        let result: Result<()> = policy(3).run(|| {
            calls += 1;
            Err(Error::Plugin(
                PluginError::new("common_insert", "still down").retryable(),
            ))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
