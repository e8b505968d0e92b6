//! Backoff policy
//!
//! Maps a retry attempt number to the delay inserted before that retry.
//! Exponential from the initial backoff, doubling per attempt, capped at the
//! maximum. Optional jitter is derived from a seed rather than a clock, so a
//! given policy always answers the same way for the same attempt.

use std::time::Duration;

use crate::profile::RetryConfig;

/// Largest doubling exponent; beyond this the cap always applies in practice
const MAX_EXPONENT: u32 = 20;

/// Delay schedule between retries of a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial_ms: u64,
    max_ms: u64,
    jitter_seed: Option<u64>,
}

impl BackoffPolicy {
    /// Create a policy without jitter
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms,
            max_ms,
            jitter_seed: None,
        }
    }

    /// Create a policy from a retry configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.initial_backoff_ms, config.max_backoff_ms)
    }

    /// Enable jitter with an explicit seed
    pub fn with_jitter(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }

    /// Enable jitter seeded from a key, typically the object name
    ///
    /// Handles for different objects then spread their retries apart.
    pub fn seeded_for(self, key: &str) -> Self {
        // FNV-1a
        let seed = key.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
        self.with_jitter(seed)
    }

    /// Delay to wait before retry number `attempt`
    ///
    /// Attempts 0 and 1 both map to the initial backoff. The result never
    /// decreases as `attempt` grows and never exceeds the configured maximum.
    pub fn wait(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        let base_ms = self.initial_ms.saturating_mul(1u64 << exponent);

        if base_ms >= self.max_ms {
            return Duration::from_millis(self.max_ms);
        }
        if base_ms == 0 {
            return Duration::ZERO;
        }

        // Jitter stays below the base, so the next doubling always covers it
        let jitter_ms = self
            .jitter_seed
            .map(|seed| splitmix64(seed ^ u64::from(exponent)) % base_ms)
            .unwrap_or(0);

        Duration::from_millis(base_ms.saturating_add(jitter_ms).min(self.max_ms))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
