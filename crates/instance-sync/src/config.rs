// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::InstanceSyncError;
use std::env;
use std::time::Duration;

const DEFAULT_VALIDATION_TIMEOUT_SECS: u64 = 5 * 60;
const DEFAULT_DELEGATE_QUEUE_TIMEOUT_SECS: u64 = 6;
const DEFAULT_PARAMS_VERSION: u32 = 1;

/// Configuration for instance sync task building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSyncConfig {
    /// Execution budget granted to a validation task on the delegate
    pub validation_timeout: Duration,
    /// How long a validation task may wait in the delegate queue before it expires
    pub delegate_queue_timeout: Duration,
    /// Version stamped on every serialized periodic payload
    pub params_version: u32,
}

impl Default for InstanceSyncConfig {
    fn default() -> Self {
        Self {
            validation_timeout: Duration::from_secs(DEFAULT_VALIDATION_TIMEOUT_SECS),
            delegate_queue_timeout: Duration::from_secs(DEFAULT_DELEGATE_QUEUE_TIMEOUT_SECS),
            params_version: DEFAULT_PARAMS_VERSION,
        }
    }
}

impl InstanceSyncConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, InstanceSyncError> {
        let validation_timeout = env::var("INSTANCE_SYNC_VALIDATION_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_VALIDATION_TIMEOUT_SECS));
        let delegate_queue_timeout = env::var("INSTANCE_SYNC_DELEGATE_QUEUE_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_DELEGATE_QUEUE_TIMEOUT_SECS));
        let params_version = env::var("INSTANCE_SYNC_PARAMS_VERSION")
            .ok()
            .and_then(|version| version.parse::<u32>().ok())
            .unwrap_or(DEFAULT_PARAMS_VERSION);

        let config = Self {
            validation_timeout,
            delegate_queue_timeout,
            params_version,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), InstanceSyncError> {
        if self.validation_timeout.is_zero() {
            return Err(InstanceSyncError::InvalidConfig(
                "validation timeout must be greater than 0".to_string(),
            ));
        }

        // expiry must land strictly after task creation
        if self.delegate_queue_timeout.as_millis() == 0 {
            return Err(InstanceSyncError::InvalidConfig(
                "delegate queue timeout must be at least 1ms".to_string(),
            ));
        }

        if self.params_version == 0 {
            return Err(InstanceSyncError::InvalidConfig(
                "params version must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
