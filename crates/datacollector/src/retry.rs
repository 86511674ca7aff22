// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded retry policy for vendor calls.

use crate::config::CollectorConfig;
use crate::error::CollectionError;
use rand::Rng;
use std::time::Duration;

/// Jitter added to every wait, in units of [`RetryPolicy::jitter_unit`].
const JITTER_UNITS: std::ops::RangeInclusive<u32> = 1..=4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_sleep: Duration,
    rate_limit_sleep: Duration,
    jitter_unit: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        retry_sleep: Duration,
        rate_limit_sleep: Duration,
        jitter_unit: Duration,
    ) -> Self {
        Self {
            max_retries,
            retry_sleep,
            rate_limit_sleep,
            jitter_unit,
        }
    }

    /// Policy for best-effort calls: one attempt, no waiting.
    pub fn single_attempt() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decides what to do after attempt number `attempt` (starting at 1) failed with `error`.
    pub fn next_action(&self, attempt: u32, error: &CollectionError) -> RetryDecision {
        let units = rand::thread_rng().gen_range(JITTER_UNITS);
        self.decide(attempt, error, units)
    }

    fn decide(&self, attempt: u32, error: &CollectionError, jitter_units: u32) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.max_attempts() {
            return RetryDecision::Fail;
        }
        let base = if error.is_rate_limited() {
            self.rate_limit_sleep
        } else {
            self.retry_sleep
        };
        RetryDecision::RetryAfter(base.saturating_add(self.jitter_unit.saturating_mul(jitter_units)))
    }
}

impl From<&CollectorConfig> for RetryPolicy {
    fn from(config: &CollectorConfig) -> Self {
        Self::new(
            config.max_retries,
            config.retry_sleep,
            config.rate_limit_sleep,
            config.jitter_unit,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&CollectorConfig::default())
    }
}
