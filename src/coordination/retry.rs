//! Exponential backoff shared by the collector and the alert dispatcher.

use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// Exponential backoff with an upper bound and optional jitter
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry (default: 500ms)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries (default: 30s)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Add up to 20% random jitter to each delay
    #[serde(default)]
    pub jitter: bool,
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::collector_default()
    }
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter: false,
        }
    }

    /// Backoff for chain fetch failures
    pub fn collector_default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: true,
        }
    }

    /// Backoff for sink delivery failures
    pub fn delivery_default() -> Self {
        Self {
            base_delay_ms: 250,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry.min(32)));
        let capped = delay.min(self.max_delay_ms);

        if self.jitter && capped > 0 {
            let spread = capped / 5;
            let extra = rand::thread_rng().gen_range(0..=spread);
            Duration::from_millis(capped.saturating_add(extra).min(self.max_delay_ms.max(capped)))
        } else {
            Duration::from_millis(capped)
        }
    }
}
