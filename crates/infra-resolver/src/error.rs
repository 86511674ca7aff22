// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::descriptor::DescriptorKind;

/// Failure reported by a secret store while decrypting a setting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("setting {0} not found in secret store")]
    NotFound(String),

    #[error("secret store failure: {0}")]
    Backend(String),
}

/// Failure reported by the infrastructure descriptor store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("descriptor lookup failed: {0}")]
pub struct LookupError(pub String);

/// Errors that can occur while resolving a target's configuration.
///
/// None of these are retried: a target that cannot be resolved must never be
/// scheduled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    #[error("no infrastructure descriptor {target_id} in account {account_id}")]
    DescriptorNotFound {
        account_id: String,
        target_id: String,
    },

    #[error("descriptor {target_id} is {actual}, expected {expected}")]
    DescriptorMismatch {
        target_id: String,
        expected: DescriptorKind,
        actual: DescriptorKind,
    },

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("failed to decrypt setting {setting_id}: {source}")]
    Credential {
        setting_id: String,
        #[source]
        source: SecretError,
    },
}

impl ResolverError {
    /// Returns true when the failure came from the secret store rather than the
    /// descriptor lookup.
    pub fn is_credential(&self) -> bool {
        matches!(self, ResolverError::Credential { .. })
    }
}
