// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::CollectionError;
use std::env;
use std::time::Duration;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_SLEEP_MS: u64 = 1_000;
const DEFAULT_RATE_LIMIT_SLEEP_MS: u64 = 10_000;
const DEFAULT_JITTER_UNIT_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RATE_LIMIT_STATUS: u16 = 429;

/// Configuration shared by the request executor and every collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Retries after the first attempt; a call is tried `max_retries + 1` times
    pub max_retries: u32,
    pub retry_sleep: Duration,
    /// Base wait after a rate-limit response
    pub rate_limit_sleep: Duration,
    /// One jitter unit; each wait adds between one and four of them
    pub jitter_unit: Duration,
    pub request_timeout: Duration,
    /// Status codes treated as rate limiting
    pub rate_limit_status_codes: Vec<u16>,
    pub https_proxy: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_sleep: Duration::from_millis(DEFAULT_RETRY_SLEEP_MS),
            rate_limit_sleep: Duration::from_millis(DEFAULT_RATE_LIMIT_SLEEP_MS),
            jitter_unit: Duration::from_millis(DEFAULT_JITTER_UNIT_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            rate_limit_status_codes: vec![DEFAULT_RATE_LIMIT_STATUS],
            https_proxy: None,
        }
    }
}

fn millis_from_env(key: &str, default: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|millis| millis.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(default))
}

impl CollectorConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, CollectionError> {
        let max_retries = env::var("DATA_COLLECTION_MAX_RETRIES")
            .ok()
            .and_then(|retries| retries.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let request_timeout = env::var("DATA_COLLECTION_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        let rate_limit_status_codes = match env::var("DATA_COLLECTION_RATE_LIMIT_STATUS_CODES") {
            Ok(codes) => codes
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(|code| {
                    code.parse::<u16>().map_err(|_| {
                        CollectionError::InvalidConfig(format!("invalid status code '{code}'"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Err(_) => vec![DEFAULT_RATE_LIMIT_STATUS],
        };

        let config = Self {
            max_retries,
            retry_sleep: millis_from_env("DATA_COLLECTION_RETRY_SLEEP_MS", DEFAULT_RETRY_SLEEP_MS),
            rate_limit_sleep: millis_from_env(
                "DATA_COLLECTION_RATE_LIMIT_SLEEP_MS",
                DEFAULT_RATE_LIMIT_SLEEP_MS,
            ),
            jitter_unit: millis_from_env("DATA_COLLECTION_JITTER_UNIT_MS", DEFAULT_JITTER_UNIT_MS),
            request_timeout,
            rate_limit_status_codes,
            https_proxy: env::var("HTTPS_PROXY")
                .ok()
                .filter(|proxy| !proxy.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), CollectionError> {
        if self.request_timeout.is_zero() {
            return Err(CollectionError::InvalidConfig(
                "request timeout must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_status_codes.is_empty() {
            return Err(CollectionError::InvalidConfig(
                "at least one rate limit status code is required".to_string(),
            ));
        }

        if let Some(code) = self
            .rate_limit_status_codes
            .iter()
            .find(|code| !(100..=599).contains(*code) || (200..300).contains(*code))
        {
            return Err(CollectionError::InvalidConfig(format!(
                "{code} cannot be used as a rate limit status code"
            )));
        }

        Ok(())
    }

    pub fn is_rate_limit_status(&self, status: u16) -> bool {
        self.rate_limit_status_codes.contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 7] = [
        "DATA_COLLECTION_MAX_RETRIES",
        "DATA_COLLECTION_RETRY_SLEEP_MS",
        "DATA_COLLECTION_RATE_LIMIT_SLEEP_MS",
        "DATA_COLLECTION_JITTER_UNIT_MS",
        "DATA_COLLECTION_REQUEST_TIMEOUT_SECS",
        "DATA_COLLECTION_RATE_LIMIT_STATUS_CODES",
        "HTTPS_PROXY",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_default_config() {
        clear_env();
        let config = CollectorConfig::from_env().unwrap();
        assert_eq!(config, CollectorConfig::default());
        assert_eq!(config.max_retries, 3);
        assert!(config.is_rate_limit_status(429));
        assert!(!config.is_rate_limit_status(503));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clear_env();
        env::set_var("DATA_COLLECTION_MAX_RETRIES", "5");
        env::set_var("DATA_COLLECTION_RETRY_SLEEP_MS", "10");
        env::set_var("DATA_COLLECTION_RATE_LIMIT_SLEEP_MS", "20");
        env::set_var("DATA_COLLECTION_JITTER_UNIT_MS", "0");
        env::set_var("DATA_COLLECTION_RATE_LIMIT_STATUS_CODES", "429, 420");
        env::set_var("HTTPS_PROXY", "http://proxy.internal:3128");

        let config = CollectorConfig::from_env().unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_sleep, Duration::from_millis(10));
        assert_eq!(config.rate_limit_sleep, Duration::from_millis(20));
        assert_eq!(config.jitter_unit, Duration::ZERO);
        assert_eq!(config.rate_limit_status_codes, vec![429, 420]);
        assert_eq!(
            config.https_proxy.as_deref(),
            Some("http://proxy.internal:3128")
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_status_codes() {
        clear_env();
        env::set_var("DATA_COLLECTION_RATE_LIMIT_STATUS_CODES", "too-many");
        assert!(matches!(
            CollectorConfig::from_env(),
            Err(CollectionError::InvalidConfig(_))
        ));

        env::set_var("DATA_COLLECTION_RATE_LIMIT_STATUS_CODES", "200");
        assert!(matches!(
            CollectorConfig::from_env(),
            Err(CollectionError::InvalidConfig(_))
        ));
        clear_env();
    }
}
