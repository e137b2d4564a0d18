//! Retry utilities with configurable backoff and jitter strategies.
//!
//! [`poll_until`] is the bounded polling loop used to gate on dependent
//! services. It never blocks past `max_attempts` probes and reports, rather
//! than raises, an exhausted budget.

use crate::cancellation::CancellationToken;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts (including initial).
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }
}

/// State tracking for retry operations.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Current attempt number (0-indexed).
    pub attempt: usize,
    /// Previous delays for decorrelated jitter.
    previous_delays: HashMap<String, u64>,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the attempt counter and returns true if more attempts remain.
    pub fn increment(&mut self, config: &RetryConfig) -> bool {
        self.attempt += 1;
        self.attempt < config.max_attempts
    }

    /// Calculates the delay for the current attempt.
    #[must_use]
    pub fn calculate_delay(&mut self, key: &str, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let attempt = self.attempt;

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => {
                let exp = u32::try_from(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exp)).min(max)
            }
            BackoffStrategy::Linear => base
                .saturating_mul(u64::try_from(attempt + 1).unwrap_or(u64::MAX))
                .min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delays.get(key).copied().unwrap_or(base);
                let upper = (prev.saturating_mul(3)).min(max);
                let new_delay = if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                };
                self.previous_delays.insert(key.to_string(), new_delay);
                new_delay
            }
        };

        Duration::from_millis(jittered)
    }
}

/// How a bounded poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// The probe succeeded.
    Ready {
        /// Probes performed, including the successful one.
        attempts: usize,
    },
    /// Every probe failed.
    Exhausted {
        /// Probes performed.
        attempts: usize,
    },
    /// The token was cancelled before the probe succeeded.
    Cancelled {
        /// Probes performed.
        attempts: usize,
    },
}

impl PollOutcome {
    /// Returns true if the probe succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Number of probes performed.
    #[must_use]
    pub fn attempts(&self) -> usize {
        match *self {
            Self::Ready { attempts } | Self::Exhausted { attempts } | Self::Cancelled { attempts } => {
                attempts
            }
        }
    }
}

/// Probes until `probe` returns true or `config.max_attempts` probes fail.
///
/// The probe receives the one-based attempt number. Delays between probes
/// follow the config's backoff and jitter; there is no delay after the last
/// probe. Sleeping is interrupted by `cancel`.
pub async fn poll_until<F, Fut>(
    config: &RetryConfig,
    key: &str,
    cancel: &CancellationToken,
    mut probe: F,
) -> PollOutcome
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = bool>,
{
    if config.max_attempts == 0 {
        return PollOutcome::Exhausted { attempts: 0 };
    }

    let mut state = RetryState::new();

    loop {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled {
                attempts: state.attempt,
            };
        }

        if probe(state.attempt + 1).await {
            return PollOutcome::Ready {
                attempts: state.attempt + 1,
            };
        }

        let delay = state.calculate_delay(key, config);
        if !state.increment(config) {
            return PollOutcome::Exhausted {
                attempts: state.attempt,
            };
        }

        tracing::debug!(
            key = %key,
            attempt = state.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Probe failed, retrying"
        );

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => {
                return PollOutcome::Cancelled { attempts: state.attempt };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fixed_interval(attempts: usize, delay_ms: u64) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(attempts)
            .with_base_delay_ms(delay_ms)
            .with_max_delay_ms(delay_ms)
            .with_backoff(BackoffStrategy::Constant)
            .with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_base_delay_ms(500)
            .with_max_delay_ms(10000)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.jitter_strategy, JitterStrategy::None);
    }

    #[test]
    fn test_retry_state_increment() {
        let config = RetryConfig::new().with_max_attempts(3);
        let mut state = RetryState::new();

        assert!(state.increment(&config)); // 1
        assert!(state.increment(&config)); // 2
        assert!(!state.increment(&config)); // 3, exhausted
    }

    #[test]
    fn test_calculate_delay_exponential_no_jitter() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Exponential)
            .with_jitter(JitterStrategy::None);

        let mut state = RetryState::new();
        let delays: Vec<_> = (0..3)
            .map(|attempt| {
                state.attempt = attempt;
                state.calculate_delay("key", &config)
            })
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[test]
    fn test_calculate_delay_constant_capped() {
        let config = fixed_interval(30, 1000).with_max_delay_ms(250);
        let mut state = RetryState::new();
        state.attempt = 7;
        assert_eq!(state.calculate_delay("key", &config), Duration::from_millis(250));
    }

    #[test]
    fn test_calculate_delay_linear_no_jitter() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_max_delay_ms(250)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);

        let mut state = RetryState::new();
        let delays: Vec<_> = (0..3)
            .map(|attempt| {
                state.attempt = attempt;
                state.calculate_delay("key", &config)
            })
            .collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(250)
            ]
        );
    }

    #[test]
    fn test_calculate_delay_equal_jitter_bounded() {
        let config = fixed_interval(3, 100).with_jitter(JitterStrategy::Equal);
        let mut state = RetryState::new();
        for _ in 0..20 {
            let delay = state.calculate_delay("key", &config);
            assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_calculate_delay_decorrelated_bounded() {
        let config = fixed_interval(3, 100)
            .with_max_delay_ms(1000)
            .with_jitter(JitterStrategy::Decorrelated);
        let mut state = RetryState::new();
        for _ in 0..20 {
            let delay = state.calculate_delay("key", &config);
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_strategies_deserialize_snake_case() {
        let backoff: BackoffStrategy = serde_json::from_str(r#""linear""#).unwrap();
        let jitter: JitterStrategy = serde_json::from_str(r#""decorrelated""#).unwrap();
        assert_eq!(backoff, BackoffStrategy::Linear);
        assert_eq!(jitter, JitterStrategy::Decorrelated);
    }

    async fn elapsed_until_exhausted(config: RetryConfig) -> Duration {
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();
        let outcome = poll_until(&config, "db", &cancel, |_| async { false }).await;
        assert_eq!(outcome, PollOutcome::Exhausted { attempts: config.max_attempts });
        started.elapsed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_growing_backoffs() {
        let base = RetryConfig::new()
            .with_max_attempts(4)
            .with_base_delay_ms(100)
            .with_max_delay_ms(10_000)
            .with_jitter(JitterStrategy::None);

        // Gaps of 100, 200, 300 ms.
        let linear = elapsed_until_exhausted(base.clone().with_backoff(BackoffStrategy::Linear)).await;
        assert_eq!(linear, Duration::from_millis(600));

        // Gaps of 100, 200, 400 ms.
        let exponential = elapsed_until_exhausted(base.with_backoff(BackoffStrategy::Exponential)).await;
        assert_eq!(exponential, Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_jittered_delays_stay_in_range() {
        let base = fixed_interval(4, 100).with_max_delay_ms(1000);

        let full = elapsed_until_exhausted(base.clone().with_jitter(JitterStrategy::Full)).await;
        assert!(full <= Duration::from_millis(300));

        let equal = elapsed_until_exhausted(base.clone().with_jitter(JitterStrategy::Equal)).await;
        assert!(equal >= Duration::from_millis(150) && equal <= Duration::from_millis(300));

        let decorrelated = elapsed_until_exhausted(base.with_jitter(JitterStrategy::Decorrelated)).await;
        assert!(decorrelated >= Duration::from_millis(300) && decorrelated <= Duration::from_millis(3000));
    }

    #[test]
    fn test_calculate_delay_full_jitter_bounded() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant)
            .with_jitter(JitterStrategy::Full);

        let mut state = RetryState::new();
        for _ in 0..10 {
            assert!(state.calculate_delay("key", &config) <= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_exhausts_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let outcome = poll_until(&fixed_interval(30, 1000), "db", &cancel, |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            }
        })
        .await;

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 30 });
        assert_eq!(calls.load(Ordering::SeqCst), 30);
        // 29 one-second gaps between 30 probes
        assert_eq!(started.elapsed(), Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_on_first_success() {
        let cancel = CancellationToken::new();

        let outcome = poll_until(&fixed_interval(30, 1000), "db", &cancel, |attempt| async move {
            attempt >= 4
        })
        .await;

        assert_eq!(outcome, PollOutcome::Ready { attempts: 4 });
        assert!(outcome.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_when_cancelled() {
        let cancel = Arc::new(CancellationToken::new());
        let canceller = cancel.clone();

        let outcome = poll_until(&fixed_interval(30, 1000), "db", &cancel, |attempt| {
            if attempt == 3 {
                canceller.cancel("deadline");
            }
            async { false }
        })
        .await;

        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 3 });
    }

    #[tokio::test]
    async fn test_poll_zero_attempts_never_probes() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let outcome = poll_until(&fixed_interval(0, 1), "db", &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { true }
        })
        .await;

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
