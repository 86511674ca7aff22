// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{lookup_descriptor, mismatch, InstanceSyncProvider};
use crate::delegate_task::{TaskParameters, TaskType};
use crate::error::InstanceSyncError;
use crate::target::{keys, TargetReference};
use crate::wire::{AzureWebAppInstanceSyncParams, Credentials};
use infra_resolver::{ConfigResolver, DecryptedSetting, DescriptorKind, InfraDescriptor};

/// Slot used when the target does not name one.
pub const DEFAULT_SLOT: &str = "production";

#[derive(Debug, Clone, PartialEq)]
pub struct AzureWebAppConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub app_name: String,
    pub slot_name: String,
    pub credentials: DecryptedSetting,
    pub routing_tag: Option<String>,
}

pub(crate) fn resolve(
    resolver: &ConfigResolver,
    target: &TargetReference,
) -> Result<AzureWebAppConfig, InstanceSyncError> {
    let app_name = target.required(keys::APP_NAME)?.to_string();
    let slot_name = target.get(keys::SLOT_NAME).unwrap_or(DEFAULT_SLOT).to_string();

    let descriptor = lookup_descriptor(resolver, target, DescriptorKind::AzureWebApp)?;
    let InfraDescriptor::AzureWebApp(infra) = &descriptor else {
        return Err(mismatch(target, DescriptorKind::AzureWebApp, &descriptor));
    };
    let credentials = resolver.decrypt(&infra.cloud_provider, &target.secret_scope()?)?;

    Ok(AzureWebAppConfig {
        subscription_id: infra.subscription_id.clone(),
        resource_group: infra.resource_group.clone(),
        app_name,
        slot_name,
        credentials,
        routing_tag: descriptor.routing_tag().map(str::to_string),
    })
}

impl InstanceSyncProvider for AzureWebAppConfig {
    type Params = AzureWebAppInstanceSyncParams;

    const TASK_TYPE: TaskType = TaskType::AzureAppService;

    fn periodic_params(&self) -> AzureWebAppInstanceSyncParams {
        AzureWebAppInstanceSyncParams {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            app_name: self.app_name.clone(),
            slot_name: self.slot_name.clone(),
            credentials: Some(Credentials::from(&self.credentials)),
        }
    }

    fn validation_parameters(&self) -> TaskParameters {
        TaskParameters::ListWebAppInstances {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            app_name: self.app_name.clone(),
            slot_name: self.slot_name.clone(),
            credentials: self.credentials.clone(),
        }
    }

    fn routing_tag(&self) -> Option<&str> {
        self.routing_tag.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;

    #[test]
    fn test_slot_defaults_to_production() {
        let (resolver, _) = resolver(descriptor(DescriptorKind::AzureWebApp));
        let config = resolve(&resolver, &target(&[(keys::APP_NAME, "web")])).unwrap();
        assert_eq!(config.app_name, "web");
        assert_eq!(config.slot_name, DEFAULT_SLOT);

        let config = resolve(
            &resolver,
            &target(&[(keys::APP_NAME, "web"), (keys::SLOT_NAME, "staging")]),
        )
        .unwrap();
        assert_eq!(config.slot_name, "staging");
    }
}
