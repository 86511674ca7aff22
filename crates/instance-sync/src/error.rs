// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use infra_resolver::ResolverError;

/// Errors raised while building or validating instance sync tasks.
#[derive(Debug, thiserror::Error)]
pub enum InstanceSyncError {
    /// Target descriptor missing or of the wrong type. Never retried.
    #[error("failed to resolve target: {0}")]
    Resolution(ResolverError),

    /// Credentials of the target could not be decrypted. Never retried.
    #[error("failed to decrypt target credentials: {0}")]
    Credential(ResolverError),

    #[error("target reference is missing required key '{0}'")]
    MissingTargetField(String),

    #[error("target reference has invalid value for '{key}': {value}")]
    InvalidTargetField { key: String, value: String },

    /// The delegate reported a failure or the queue timed out.
    #[error("validation task {task_id} failed: {reason}")]
    ValidationTaskFailure { task_id: String, reason: String },

    #[error("wire params carry {actual}, expected {expected}")]
    WireTypeMismatch { expected: String, actual: String },

    #[error("failed to decode wire params: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl InstanceSyncError {
    /// True for every failure that happens before anything is queued.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            InstanceSyncError::Resolution(_)
                | InstanceSyncError::Credential(_)
                | InstanceSyncError::MissingTargetField(_)
                | InstanceSyncError::InvalidTargetField { .. }
        )
    }
}

impl From<ResolverError> for InstanceSyncError {
    fn from(error: ResolverError) -> Self {
        if error.is_credential() {
            InstanceSyncError::Credential(error)
        } else {
            InstanceSyncError::Resolution(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infra_resolver::{DescriptorKind, SecretError};

    #[test]
    fn test_resolver_errors_are_split_by_cause() {
        let mismatch = ResolverError::DescriptorMismatch {
            target_id: "infra-1".to_string(),
            expected: DescriptorKind::Pcf,
            actual: DescriptorKind::Container,
        };
        assert!(matches!(
            InstanceSyncError::from(mismatch),
            InstanceSyncError::Resolution(_)
        ));

        let credential = ResolverError::Credential {
            setting_id: "pcf-1".to_string(),
            source: SecretError::NotFound("pcf-1".to_string()),
        };
        assert!(matches!(
            InstanceSyncError::from(credential),
            InstanceSyncError::Credential(_)
        ));
    }

    #[test]
    fn test_error_display() {
        let error = InstanceSyncError::MissingTargetField("functionName".to_string());
        assert_eq!(
            error.to_string(),
            "target reference is missing required key 'functionName'"
        );
        assert!(error.is_resolution_error());

        let error = InstanceSyncError::ValidationTaskFailure {
            task_id: "t-1".to_string(),
            reason: "timed out".to_string(),
        };
        assert!(!error.is_resolution_error());
    }
}
