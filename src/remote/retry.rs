//! Response classification and retry with exponential backoff
//!
//! Every remote response is first classified into an [`Outcome`]. The
//! [`RetryPolicy`] then turns that outcome, together with the per-request
//! [`RetryState`], into a [`RetryDecision`].
//!
//! | Condition | Outcome | Action |
//! |-----------|---------|--------|
//! | 2xx | Success | return body |
//! | HTTP 429 | RateLimited | wait Retry-After (or default), retry |
//! | HTTP 5xx, 408 | Transient | wait `base * 2^step`, retry |
//! | Timeout / connection failure | Transient | wait `base * 2^step`, retry |
//! | Other 4xx, unexpected status | NonRetryable | fail immediately |
//!
//! Rate-limited responses count toward the attempt ceiling but do not advance the
//! backoff step.

use crate::config::RemoteConfig;
use reqwest::StatusCode;
use std::time::{Duration, SystemTime};

/// Upper bound honored for a server-sent Retry-After
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Classification of one response or transport failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    RateLimited { retry_after: Option<Duration> },
    Transient,
    NonRetryable,
}

impl Outcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient)
    }
}

/// Classifies an HTTP status, with the raw Retry-After header if one was sent
pub fn classify_status(status: StatusCode, retry_after: Option<&str>) -> Outcome {
    if status.is_success() {
        Outcome::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Outcome::RateLimited {
            retry_after: retry_after.and_then(parse_retry_after),
        }
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        Outcome::Transient
    } else {
        Outcome::NonRetryable
    }
}

/// Classifies a request that produced no usable response
///
/// Timeouts, refused or reset connections and truncated bodies are transient; a
/// request that could not be built or followed too many redirects is not.
pub fn classify_transport(error: &reqwest::Error) -> Outcome {
    if error.is_builder() || error.is_redirect() {
        Outcome::NonRetryable
    } else {
        Outcome::Transient
    }
}

/// Parses a Retry-After header given as delay-seconds or an HTTP-date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER));
    }

    let date = httpdate::parse_http_date(value).ok()?;
    // a date in the past means "retry now"
    let delay = date
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    Some(delay.min(MAX_RETRY_AFTER))
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again
    Retry(Duration),
    /// The attempt ceiling is reached
    GiveUp,
    /// The outcome is not retryable
    Stop,
}

/// Attempt bookkeeping for a single logical request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    backoff_step: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of an attempt and returns its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Retry ceiling and backoff timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RemoteConfig::default())
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is raised to at least one
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        rate_limit_delay: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            rate_limit_delay,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            Duration::from_millis(config.rate_limit_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry following backoff step `step` (0-based)
    ///
    /// `min(base_delay * 2^step, max_delay)`, so successive delays never shrink.
    pub fn backoff_delay(&self, step: u32) -> Duration {
        let factor = 2u32.checked_pow(step).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decides how to continue after an attempt ended with `outcome`
    pub fn decide(&self, state: &mut RetryState, outcome: &Outcome) -> RetryDecision {
        if !outcome.is_retryable() {
            return RetryDecision::Stop;
        }

        if state.attempts >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        match outcome {
            Outcome::RateLimited { retry_after } => {
                RetryDecision::Retry(retry_after.unwrap_or(self.rate_limit_delay))
            }
            _ => {
                let delay = self.backoff_delay(state.backoff_step);
                state.backoff_step += 1;
                RetryDecision::Retry(delay)
            }
        }
    }
}
