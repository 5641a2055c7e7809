//! Polling primitives for waiting on remote state.
//!
//! ECE plans, Fleet setup and prebuilt rule installation all complete
//! asynchronously on the server. This module provides a small poll loop
//! that repeatedly checks a condition with a configurable backoff until the
//! condition holds or a timeout passes.
//!
//! # Example
//!
//! ```rust,ignore
//! use rustible_elastic::poll::PollPolicy;
//! use std::time::Duration;
//!
//! let policy = PollPolicy::constant(Duration::from_secs(5), Duration::from_secs(300));
//! let info = policy
//!     .poll_until("kibana to start", || async {
//!         let status = ece.resource_status(&id, ResourceKind::Kibana, "main-kibana").await?;
//!         Ok((status == "started").then_some(status))
//!     })
//!     .await?;
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Backoff strategy for calculating the delay between polls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Constant delay between polls.
    Constant,

    /// Exponential backoff: delay = interval * multiplier^attempt
    Exponential {
        /// Multiplier for exponential growth (default: 2.0)
        multiplier: f64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Constant
    }
}

impl BackoffStrategy {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn calculate_delay(&self, attempt: u32, interval: Duration) -> Duration {
        let base_millis = interval.as_millis() as f64;

        let delay_millis = match self {
            Self::Constant => base_millis,
            Self::Exponential { multiplier } => base_millis * multiplier.powf(attempt as f64),
        };

        Duration::from_millis(delay_millis as u64)
    }
}

/// Configuration for a poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second check.
    pub interval: Duration,

    /// Maximum total time to keep polling.
    pub timeout: Duration,

    /// Backoff strategy for calculating delays.
    pub backoff: BackoffStrategy,

    /// Maximum delay between polls (caps exponential growth).
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(600),
            backoff: BackoffStrategy::Constant,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl PollPolicy {
    /// Create a policy that polls at a fixed interval.
    pub fn constant(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            backoff: BackoffStrategy::Constant,
            max_interval: interval,
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(interval: Duration, timeout: Duration, max_interval: Duration) -> Self {
        Self {
            interval,
            timeout,
            backoff: BackoffStrategy::Exponential { multiplier: 2.0 },
            max_interval,
        }
    }

    /// Replace the timeout, keeping the rest of the policy.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Calculate the delay after the given attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff
            .calculate_delay(attempt, self.interval)
            .min(self.max_interval)
    }

    /// Poll `check` until it yields a value.
    ///
    /// `Ok(None)` means the condition does not hold yet; errors abort the
    /// loop immediately. The check always runs at least once.
    pub async fn poll_until<F, Fut, T>(&self, what: &str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            debug!("Polling for {} (attempt {})", what, attempt + 1);

            if let Some(value) = check().await? {
                if attempt > 0 {
                    debug!("{} satisfied after {} polls", what, attempt + 1);
                }
                return Ok(value);
            }

            let delay = self.delay_for_attempt(attempt);
            let remaining = self.timeout.saturating_sub(start_time.elapsed());
            if delay > remaining {
                warn!(
                    "Gave up waiting for {} after {:?} ({} polls)",
                    what,
                    start_time.elapsed(),
                    attempt + 1
                );
                return Err(Error::Timeout {
                    what: what.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
