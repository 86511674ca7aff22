// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::descriptor::{DescriptorKind, InfraDescriptor, InfraDescriptorLookup, TargetScope};
use crate::error::ResolverError;
use crate::secrets::{DecryptedSetting, SecretManager, SecretScope, SettingRef};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Looks up infrastructure descriptors and decrypts the settings they reference.
///
/// Holds no state besides the two collaborators; results are produced fresh on
/// every call and are never cached.
#[derive(Clone)]
pub struct ConfigResolver {
    descriptors: Arc<dyn InfraDescriptorLookup>,
    secrets: Arc<dyn SecretManager>,
}

impl ConfigResolver {
    pub fn new(
        descriptors: Arc<dyn InfraDescriptorLookup>,
        secrets: Arc<dyn SecretManager>,
    ) -> Self {
        Self {
            descriptors,
            secrets,
        }
    }

    /// Fetches the descriptor of `target_id` and checks it is of the `expected` kind.
    pub fn descriptor(
        &self,
        scope: &TargetScope,
        target_id: &str,
        expected: DescriptorKind,
    ) -> Result<InfraDescriptor, ResolverError> {
        let descriptor = self.descriptors.get(scope, target_id)?.ok_or_else(|| {
            ResolverError::DescriptorNotFound {
                account_id: scope.account_id.clone(),
                target_id: target_id.to_string(),
            }
        })?;

        let actual = descriptor.kind();
        if actual != expected {
            warn!(
                account_id = %scope.account_id,
                target_id,
                %expected,
                %actual,
                "Infrastructure descriptor type does not match"
            );
            return Err(ResolverError::DescriptorMismatch {
                target_id: target_id.to_string(),
                expected,
                actual,
            });
        }

        debug!(account_id = %scope.account_id, target_id, kind = %actual, "Resolved infrastructure descriptor");
        Ok(descriptor)
    }

    /// Decrypts every secret-bearing field of `setting`.
    pub fn decrypt(
        &self,
        setting: &SettingRef,
        scope: &SecretScope,
    ) -> Result<DecryptedSetting, ResolverError> {
        let fields =
            self.secrets
                .decrypt(setting, scope)
                .map_err(|source| ResolverError::Credential {
                    setting_id: setting.id.clone(),
                    source,
                })?;
        debug!(
            setting_id = %setting.id,
            fields = fields.len(),
            "Decrypted setting"
        );
        Ok(DecryptedSetting {
            setting_id: setting.id.clone(),
            fields,
        })
    }
}

impl fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigResolver")
    }
}
