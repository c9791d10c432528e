//! Seeded RNG wrapper for reproducible behavior.
//!
//! Thread-safe, seeded random number generator so fault scenarios are
//! deterministic in tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;

/// Seeded RNG wrapper for reproducible random behavior
pub struct SimRng {
    inner: Mutex<ChaCha8Rng>,
}

impl SimRng {
    /// Create a new RNG with optional seed.
    /// If seed is None, uses a random seed from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            inner: Mutex::new(rng),
        }
    }

    /// Check if an operation should fail based on the given failure rate.
    ///
    /// `rate` is a probability from 0.0 (never fail) to 1.0 (always fail).
    pub fn should_fail(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let mut rng = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen::<f64>() < rate
    }

    /// Generate a random u64 value
    pub fn next_u64(&self) -> u64 {
        let mut rng = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen()
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for SimRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRng")
            .field("inner", &"<Mutex<ChaCha8Rng>>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_deterministic() {
        let rng1 = SimRng::new(Some(42));
        let rng2 = SimRng::new(Some(42));

        assert_eq!(rng1.next_u64(), rng2.next_u64());
    }

    #[test]
    fn test_should_fail_never() {
        let rng = SimRng::new(Some(42));
        for _ in 0..100 {
            assert!(!rng.should_fail(0.0), "Rate 0.0 should never fail");
        }
    }

    #[test]
    fn test_should_fail_always() {
        let rng = SimRng::new(Some(42));
        for _ in 0..100 {
            assert!(rng.should_fail(1.0), "Rate 1.0 should always fail");
        }
    }

    #[test]
    fn test_should_fail_probability() {
        let rng = SimRng::new(Some(42));
        let rate = 0.3;
        let samples = 10000;
        let failures = (0..samples).filter(|_| rng.should_fail(rate)).count();

        // With 10000 samples at 30% rate, expect roughly 3000 failures.
        // Allow 10% deviation (2700-3300).
        let expected = (rate * samples as f64) as usize;
        let tolerance = (expected as f64 * 0.1) as usize;
        assert!(
            failures > expected - tolerance && failures < expected + tolerance,
            "Expected ~{} failures, got {}",
            expected,
            failures
        );
    }
}
