//! Retry policy for transient engine failures.
//!
//! Provider plugin downloads and registry lookups fail intermittently in CI.
//! A [`RetryPolicy`] knows which error messages are worth another attempt
//! and re-runs an operation with a fixed delay until it succeeds, fails
//! permanently, or runs out of attempts.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::Result;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between attempts, in seconds.
pub const DEFAULT_TIME_BETWEEN_RETRIES_SECS: u64 = 5;

/// Known transient engine error messages and why they are retried.
const BUILTIN_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    ("connection reset by peer", "Transient network failure"),
    ("TLS handshake timeout", "Transient network failure"),
    (
        "registry service is unreachable",
        "Provider registry temporarily unavailable",
    ),
    (
        "unable to verify signature",
        "Provider plugin download failed",
    ),
    (
        "unable to verify checksum",
        "Provider plugin download failed",
    ),
    (
        "no provider exists with the given name",
        "Provider registry returned an incomplete index",
    ),
    ("transport is closing", "Provider plugin exited mid-call"),
];

/// Bounded, fixed-delay retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay between attempts.
    pub time_between_retries: Duration,
    /// Substring patterns that mark an error as transient.
    pub retryable_errors: BTreeMap<String, String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            time_between_retries: Duration::from_secs(DEFAULT_TIME_BETWEEN_RETRIES_SECS),
            retryable_errors: builtin_patterns(),
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from suite settings, merging extra patterns over the
    /// built-in list.
    #[must_use]
    pub fn from_settings(settings: &RetrySettings) -> Self {
        let mut retryable_errors = builtin_patterns();
        retryable_errors.extend(
            settings
                .retryable_errors
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        Self {
            max_retries: settings.max_retries,
            time_between_retries: Duration::from_secs(settings.time_between_retries_secs),
            retryable_errors,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.time_between_retries = delay;
        self
    }

    /// Returns the explanation of the first pattern matching `output`.
    #[must_use]
    pub fn transient_reason(&self, output: &str) -> Option<&str> {
        self.retryable_errors
            .iter()
            .find(|(pattern, _)| output.contains(pattern.as_str()))
            .map(|(_, reason)| reason.as_str())
    }

    /// Runs `f` until it succeeds or fails with a non-retryable error.
    ///
    /// `op` names the operation in log messages.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last retryable error
    /// once `max_retries` retries have been used.
    pub async fn run<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{op} succeeded after {attempt} retries");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{op} failed with a transient error (retry {attempt} of {}): {e}",
                        self.max_retries
                    );
                    tokio::time::sleep(self.time_between_retries).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn builtin_patterns() -> BTreeMap<String, String> {
    BUILTIN_RETRYABLE_ERRORS
        .iter()
        .map(|(pattern, reason)| ((*pattern).to_string(), (*reason).to_string()))
        .collect()
}
