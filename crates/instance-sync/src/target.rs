// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::InstanceSyncError;
use infra_resolver::{SecretScope, TargetScope};
use std::collections::BTreeMap;

/// Well-known keys of a [`TargetReference`].
pub mod keys {
    pub const ACCOUNT_ID: &str = "accountId";
    pub const APP_ID: &str = "appId";
    pub const INFRA_MAPPING_ID: &str = "infraMappingId";
    pub const FUNCTION_NAME: &str = "functionName";
    pub const QUALIFIER: &str = "qualifier";
    pub const START_DATE: &str = "startDate";
    pub const CONTAINER_SERVICE_NAME: &str = "containerServiceName";
    pub const NAMESPACE: &str = "namespace";
    pub const RELEASE_NAME: &str = "releaseName";
    pub const CLUSTER_NAME: &str = "clusterName";
    pub const ELASTIGROUP_ID: &str = "elastigroupId";
    pub const ASG_NAME: &str = "asgName";
    pub const VMSS_ID: &str = "vmssId";
    pub const APP_NAME: &str = "appName";
    pub const SLOT_NAME: &str = "slotName";
    pub const APPLICATION_NAME: &str = "applicationName";
    pub const HOST_NAMES: &str = "hostNames";
}

/// Caller-supplied identification of a deployment target.
///
/// Immutable once built; every builder reads only the keys it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetReference {
    fields: BTreeMap<String, String>,
}

impl TargetReference {
    pub fn new<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Returns the value of `key`, treating blank values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn required(&self, key: &str) -> Result<&str, InstanceSyncError> {
        self.get(key)
            .ok_or_else(|| InstanceSyncError::MissingTargetField(key.to_string()))
    }

    pub fn account_id(&self) -> Result<&str, InstanceSyncError> {
        self.required(keys::ACCOUNT_ID)
    }

    pub fn infra_mapping_id(&self) -> Result<&str, InstanceSyncError> {
        self.required(keys::INFRA_MAPPING_ID)
    }

    /// Epoch millis stored under `key`, if present.
    pub fn millis(&self, key: &str) -> Result<Option<i64>, InstanceSyncError> {
        self.get(key)
            .map(|value| {
                value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| InstanceSyncError::InvalidTargetField {
                        key: key.to_string(),
                        value: value.to_string(),
                    })
            })
            .transpose()
    }

    /// Comma-separated list stored under `key`; empty entries are dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn scope(&self) -> Result<TargetScope, InstanceSyncError> {
        Ok(TargetScope {
            account_id: self.account_id()?.to_string(),
            app_id: self.get(keys::APP_ID).map(str::to_string),
        })
    }

    pub fn secret_scope(&self) -> Result<SecretScope, InstanceSyncError> {
        Ok(SecretScope {
            account_id: self.account_id()?.to_string(),
            app_id: self.get(keys::APP_ID).map(str::to_string),
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TargetReference {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_missing() {
        let target = TargetReference::new([(keys::FUNCTION_NAME, "  ")]);
        assert!(matches!(
            target.required(keys::FUNCTION_NAME),
            Err(InstanceSyncError::MissingTargetField(key)) if key == "functionName"
        ));
    }

    #[test]
    fn test_millis_parsing() {
        let target: TargetReference = [(keys::START_DATE, "1700000000000")].into_iter().collect();
        assert_eq!(target.millis(keys::START_DATE).unwrap(), Some(1_700_000_000_000));
        assert_eq!(target.millis(keys::QUALIFIER).unwrap(), None);

        let target = TargetReference::new([(keys::START_DATE, "yesterday")]);
        assert!(matches!(
            target.millis(keys::START_DATE),
            Err(InstanceSyncError::InvalidTargetField { .. })
        ));
    }

    #[test]
    fn test_list_parsing() {
        let target = TargetReference::new([(keys::HOST_NAMES, "host-a, host-b,,host-c ")]);
        assert_eq!(target.list(keys::HOST_NAMES), vec!["host-a", "host-b", "host-c"]);
        assert!(target.list(keys::APP_NAME).is_empty());
    }

    #[test]
    fn test_scope_requires_account() {
        let target = TargetReference::new([(keys::APP_ID, "app")]);
        assert!(target.scope().is_err());

        let target = TargetReference::new([(keys::ACCOUNT_ID, "acct"), (keys::APP_ID, "app")]);
        let scope = target.scope().unwrap();
        assert_eq!(scope.account_id, "acct");
        assert_eq!(scope.app_id.as_deref(), Some("app"));
    }
}
