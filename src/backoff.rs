//! Randomized exponential backoff with a hard ceiling.
//!
//! # Example
//! ```
//! use subject_expiry_controller::backoff::BackoffConfig;
//!
//! let config = BackoffConfig::new(
//!     std::time::Duration::from_secs(1),
//!     std::time::Duration::from_secs(60),
//!     0.5,
//! ).unwrap();
//!
//! let mut generator = config.generator();
//! let mut current = config.min;
//! current = generator.next(current);
//! assert!(current >= config.min && current <= config.max);
//! ```

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Construction-time validation failure for a [`BackoffConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum BackoffConfigError {
    /// `min` must be strictly positive.
    #[error("backoff min must be greater than zero")]
    MinIsZero,
    /// `max` must be at least `min`.
    #[error("backoff max ({max:?}) must be greater than or equal to min ({min:?})")]
    MaxBelowMin {
        /// The configured minimum.
        min: Duration,
        /// The configured maximum.
        max: Duration,
    },
    /// `randomFactor` must be non-negative (it is a jitter amplitude, not a rate).
    #[error("backoff randomFactor must be >= 0, got {0}")]
    NegativeRandomFactor(f64),
}

/// Immutable backoff policy: an initial delay, a ceiling, and a jitter amplitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Initial backoff, and the floor every subsequent retry is computed from.
    pub min: Duration,
    /// Hard ceiling no computed backoff may exceed.
    pub max: Duration,
    /// Jitter amplitude in `[0, ∞)`. `0` disables jitter (always returns exactly `max`
    /// once saturated); larger values widen the spread between `1.0x` and `1.0x + factor`.
    pub random_factor: f64,
}

impl BackoffConfig {
    /// Validate and construct a backoff policy.
    pub fn new(min: Duration, max: Duration, random_factor: f64) -> Result<Self, BackoffConfigError> {
        if min.is_zero() {
            return Err(BackoffConfigError::MinIsZero);
        }
        if max < min {
            return Err(BackoffConfigError::MaxBelowMin { min, max });
        }
        if random_factor < 0.0 {
            return Err(BackoffConfigError::NegativeRandomFactor(random_factor));
        }
        Ok(Self { min, max, random_factor })
    }

    /// Build a generator seeded from the OS entropy source.
    pub fn generator(&self) -> BackoffGenerator {
        BackoffGenerator::new(*self)
    }

    /// Build a generator seeded deterministically, for reproducible tests.
    pub fn generator_with_seed(&self, seed: u64) -> BackoffGenerator {
        BackoffGenerator::with_seed(*self, seed)
    }
}

/// Stateless-per-call backoff computation with an internal seedable PRNG.
///
/// Holds no notion of "current backoff" itself — callers own that as part of
/// controller state (`nextBackOff`) and pass it to [`BackoffGenerator::next`].
pub struct BackoffGenerator {
    config: BackoffConfig,
    rng: StdRng,
}

impl BackoffGenerator {
    fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Construct with a fixed seed so retry sequences are reproducible in tests.
    pub fn with_seed(config: BackoffConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Compute the next backoff from `current`.
    ///
    /// Guarantees the result is in `[current, config.max]`: any overflow, negative
    /// result, or computed value outside that range collapses to `config.max`.
    pub fn next(&mut self, current: Duration) -> Duration {
        let base = current.min(self.config.max);
        let jitter_roll: f64 = self.rng.gen_range(0.0..1.0);
        let factor = 0.5 + 0.5 * self.config.random_factor * jitter_roll;

        let jitter_nanos = (base.as_nanos() as f64) * factor;
        let result = if jitter_nanos.is_finite() && jitter_nanos >= 0.0 {
            base.checked_add(Duration::from_nanos(jitter_nanos as u64))
        } else {
            None
        };

        match result {
            Some(result) if result >= current && result <= self.config.max => result,
            _ => self.config.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_zero_min() {
        assert_eq!(
            BackoffConfig::new(Duration::ZERO, Duration::from_secs(1), 0.0),
            Err(BackoffConfigError::MinIsZero)
        );
    }

    #[test]
    fn rejects_max_below_min() {
        let err = BackoffConfig::new(Duration::from_secs(2), Duration::from_secs(1), 0.0).unwrap_err();
        assert!(matches!(err, BackoffConfigError::MaxBelowMin { .. }));
    }

    #[test]
    fn rejects_negative_random_factor() {
        assert_eq!(
            BackoffConfig::new(Duration::from_secs(1), Duration::from_secs(2), -0.1),
            Err(BackoffConfigError::NegativeRandomFactor(-0.1))
        );
    }

    #[test]
    fn next_is_non_decreasing_and_bounded() {
        let config = BackoffConfig::new(
            Duration::from_millis(100),
            Duration::from_secs(5),
            0.5,
        )
        .unwrap();
        let mut gen = config.generator_with_seed(42);

        let mut current = config.min;
        for _ in 0..50 {
            let next = gen.next(current);
            assert!(next >= current, "backoff must never decrease");
            assert!(next <= config.max, "backoff must never exceed max");
            current = next;
        }
    }

    #[test]
    fn saturates_at_max_once_base_is_at_ceiling() {
        let config = BackoffConfig::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            0.9,
        )
        .unwrap();
        let mut gen = config.generator_with_seed(7);
        assert_eq!(gen.next(Duration::from_secs(1)), Duration::from_secs(1));
    }

    #[test]
    fn zero_jitter_never_exceeds_double_without_factor() {
        let config = BackoffConfig::new(
            Duration::from_millis(10),
            Duration::from_secs(10),
            0.0,
        )
        .unwrap();
        let mut gen = config.generator_with_seed(1);
        // With random_factor == 0, factor is always exactly 0.5, so the result is 1.5x base.
        let next = gen.next(Duration::from_millis(10));
        assert_eq!(next, Duration::from_millis(15));
    }

    proptest! {
        #[test]
        fn prop_next_respects_bounds(
            min_ms in 1u64..1000,
            span_ms in 0u64..100_000,
            random_factor in 0.0f64..5.0,
            current_ms in 1u64..200_000,
            seed in any::<u64>(),
        ) {
            let min = Duration::from_millis(min_ms);
            let max = min + Duration::from_millis(span_ms);
            let config = BackoffConfig::new(min, max, random_factor).unwrap();
            let mut gen = config.generator_with_seed(seed);
            let current = min.max(Duration::from_millis(current_ms)).min(max);

            let next = gen.next(current);
            prop_assert!(next >= current);
            prop_assert!(next <= max);
        }
    }
}
