//! Limits and pacing for recovery retries.
//!
//! A call is re-sent when the server asks for a captcha answer or rejects the
//! access token. [`RetryPolicy`] caps how many times that may happen within one
//! call and how long to wait before each re-send.

use rand::Rng;
use std::time::Duration;

/// Default cap on recovery retries per call.
pub const DEFAULT_MAX_RETRIES: usize = 5;

/// How long to wait before a recovery retry.
///
/// # Examples
///
/// ```
/// use vkcall::retry::RetryDelay;
/// use std::time::Duration;
///
/// // Re-send immediately
/// let immediate = RetryDelay::None;
///
/// // Exponential backoff: 100ms, 200ms, 400ms, 800ms...
/// let exponential = RetryDelay::ExponentialBackoff {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(5),
///     jitter: true,
/// };
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RetryDelay {
    /// Re-send right away.
    #[default]
    None,

    /// Wait the same amount of time before every retry.
    Fixed(Duration),

    /// Wait `initial_delay * 2^(retry - 1)`, capped at `max_delay`.
    ///
    /// With `jitter`, the delay is scaled by a random factor between 0.5 and 1.0.
    ExponentialBackoff {
        /// The delay before the first retry.
        initial_delay: Duration,
        /// The maximum delay between retries.
        max_delay: Duration,
        /// Whether to add random jitter to delays.
        jitter: bool,
    },
}

impl RetryDelay {
    /// Returns the delay before the given retry (1-indexed).
    pub fn delay_for_retry(&self, retry: usize) -> Duration {
        match self {
            RetryDelay::None => Duration::ZERO,
            RetryDelay::Fixed(delay) => *delay,
            RetryDelay::ExponentialBackoff {
                initial_delay,
                max_delay,
                jitter,
            } => {
                let multiplier = 2u64.saturating_pow(retry.saturating_sub(1) as u32);
                let base_delay =
                    initial_delay.saturating_mul(multiplier.try_into().unwrap_or(u32::MAX));
                let delay = base_delay.min(*max_delay);

                if *jitter {
                    let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
                    delay.mul_f64(jitter_factor)
                } else {
                    delay
                }
            }
        }
    }
}

/// Caps and paces the captcha and access-token retries of a single call.
///
/// Both recovery paths share one budget. Once it is spent, the next recoverable
/// error ends the call with [`crate::Error::MaxRetriesExceeded`].
///
/// # Examples
///
/// ```
/// use vkcall::RetryPolicy;
/// use vkcall::retry::RetryDelay;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3).with_delay(RetryDelay::Fixed(Duration::from_millis(250)));
/// assert!(policy.allows_retry(3));
/// assert!(!policy.allows_retry(4));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// The maximum number of recovery retries per call.
    pub max_retries: usize,
    /// The wait before each retry.
    pub delay: RetryDelay,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` immediate retries.
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            delay: RetryDelay::None,
        }
    }

    /// A policy that never gives up.
    ///
    /// A server that keeps issuing captchas or rejecting tokens will keep the call
    /// running forever.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Sets the wait before each retry.
    pub fn with_delay(mut self, delay: RetryDelay) -> Self {
        self.delay = delay;
        self
    }

    /// Returns `true` if retry number `retry` (1-indexed) is within budget.
    pub fn allows_retry(&self, retry: usize) -> bool {
        retry <= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}
