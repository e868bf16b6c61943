//! Retry policy with configurable backoff and jitter strategies.
//!
//! Transient stage errors are retried with exponential backoff and jitter;
//! the orchestrator drives the loop so it can race each delay against
//! cancellation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the un-jittered delay grows with each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base * 2^retry`
    #[default]
    Exponential,
    /// `base * (retry + 1)`
    Linear,
    /// `base`
    Constant,
}

impl BackoffStrategy {
    /// Delay in milliseconds before retry number `retry` (zero-based), capped
    /// at `max_ms`.
    #[must_use]
    pub fn delay_ms(self, retry: usize, base_ms: u64, max_ms: u64) -> u64 {
        let raw = match self {
            Self::Exponential => {
                let shift = u32::try_from(retry).unwrap_or(u32::MAX);
                base_ms.saturating_mul(2u64.saturating_pow(shift))
            }
            Self::Linear => base_ms.saturating_mul(u64::try_from(retry).map_or(u64::MAX, |r| r + 1)),
            Self::Constant => base_ms,
        };
        raw.min(max_ms)
    }
}

/// Randomization applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Use the backoff delay as is.
    None,
    /// Uniform in `0..=delay`.
    #[default]
    Full,
    /// `delay / 2` plus uniform in `0..=delay / 2`.
    Equal,
    /// Uniform in `base..=min(max, previous * 3)`.
    Decorrelated,
}

impl JitterStrategy {
    fn apply(self, delay: u64, bounds: (u64, u64), previous: Option<u64>, rng: &mut impl Rng) -> u64 {
        let (base, max) = bounds;
        match self {
            Self::None => delay,
            Self::Full if delay == 0 => 0,
            Self::Full => rng.gen_range(0..=delay),
            Self::Equal => {
                let half = delay / 2;
                half + if half == 0 { delay % 2 } else { rng.gen_range(0..=half) }
            }
            Self::Decorrelated => {
                let upper = previous.unwrap_or(base).saturating_mul(3).min(max);
                if upper <= base {
                    base.min(max)
                } else {
                    rng.gen_range(base..=upper)
                }
            }
        }
    }
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

/// Retry policy shared by every stage and fan-out task of an orchestrator.
///
/// Loaded from the `[orchestrator]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per stage or task, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth of the delay between retries.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Randomization of each delay.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffStrategy::default(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetryConfig {
    /// The default policy: 3 attempts, exponential backoff from 500 ms, full
    /// jitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget. Zero is treated as one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    fn attempt_budget(&self) -> usize {
        self.max_attempts.max(1)
    }
}

/// Attempt bookkeeping for one stage or one fan-out task.
#[derive(Debug, Default)]
pub struct RetryState {
    failures: usize,
    last_delay_ms: Option<u64>,
}

impl RetryState {
    /// A fresh state with no failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transient failures recorded so far.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// The attempt number about to run, starting at 1.
    #[must_use]
    pub fn attempt(&self) -> usize {
        self.failures + 1
    }

    /// Records a transient failure.
    ///
    /// Returns the delay before the next attempt, or `None` once the attempt
    /// budget is spent.
    pub fn record_failure(&mut self, config: &RetryConfig) -> Option<Duration> {
        self.failures += 1;
        (self.failures < config.attempt_budget()).then(|| self.next_delay(config))
    }

    fn next_delay(&mut self, config: &RetryConfig) -> Duration {
        let retry = self.failures.saturating_sub(1);
        let delay = config
            .backoff
            .delay_ms(retry, config.base_delay_ms, config.max_delay_ms);
        let jittered = config.jitter.apply(
            delay,
            (config.base_delay_ms, config.max_delay_ms),
            self.last_delay_ms,
            &mut rand::thread_rng(),
        );
        self.last_delay_ms = Some(jittered);
        Duration::from_millis(jittered)
    }
}
