//! Retry policy with exponential backoff

use crate::config::DocsConfig;
use crate::error::DocsError;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Decides whether a failed attempt is retried and how long to wait first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
    /// Upper bound for any single delay, including `Retry-After` hints
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DocsConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: None,
        }
    }

    pub fn from_config(config: &DocsConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Should the failure of 0-based `attempt` be followed by another attempt?
    ///
    /// A status code is judged on its own (429 and 5xx retry); otherwise the
    /// error kind decides. With neither, there is nothing to retry.
    pub fn should_retry(
        &self,
        attempt: u32,
        status: Option<u16>,
        error: Option<&DocsError>,
    ) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match (status, error) {
            (Some(status), _) => is_retryable_status(status),
            (None, Some(error)) => error.is_transient(),
            (None, None) => false,
        }
    }

    /// Shorthand for [`should_retry`](Self::should_retry) with an error value
    pub fn should_retry_error(&self, attempt: u32, error: &DocsError) -> bool {
        self.should_retry(attempt, error.status(), Some(error))
    }

    /// `base * 2^attempt`, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        self.cap(delay)
    }

    /// Delay after `error`; a server `Retry-After` hint wins over backoff
    pub fn delay_for_error(&self, attempt: u32, error: &DocsError) -> Duration {
        match error.retry_after() {
            Some(hint) => self.cap(hint),
            None => self.delay_for(attempt),
        }
    }

    fn cap(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// 429 and any 5xx
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Per-fetch retry bookkeeping
#[derive(Debug, Default)]
pub struct RetryState {
    /// 0-based index of the current attempt
    pub attempt: u32,
    pub last_error: Option<DocsError>,
    pub next_delay: Option<Duration>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed attempt; returns the delay to sleep if it is retried
    pub fn record_failure(&mut self, policy: &RetryPolicy, error: DocsError) -> Option<Duration> {
        let retry = policy.should_retry_error(self.attempt, &error);
        self.next_delay = retry.then(|| policy.delay_for_error(self.attempt, &error));
        self.last_error = Some(error);
        if retry {
            self.attempt += 1;
        }
        self.next_delay
    }

    /// Final error once retrying stops
    ///
    /// Transient errors that used up retries are wrapped with the attempt
    /// count; anything else is returned unchanged.
    pub fn into_error(self) -> DocsError {
        let attempts = self.attempt + 1;
        match self.last_error {
            Some(error) if error.is_transient() && attempts > 1 => DocsError::RetriesExhausted {
                attempts,
                source: Box::new(error),
            },
            Some(error) => error,
            None => DocsError::Request("request failed without an error".to_string()),
        }
    }
}

/// Parse a `Retry-After` header: delta-seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
