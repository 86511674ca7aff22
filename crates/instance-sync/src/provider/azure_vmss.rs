// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{lookup_descriptor, mismatch, InstanceSyncProvider};
use crate::delegate_task::{TaskParameters, TaskType};
use crate::error::InstanceSyncError;
use crate::target::{keys, TargetReference};
use crate::wire::{AzureVmssInstanceSyncParams, Credentials};
use infra_resolver::{ConfigResolver, DecryptedSetting, DescriptorKind, InfraDescriptor};

#[derive(Debug, Clone, PartialEq)]
pub struct AzureVmssConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub vmss_id: String,
    pub credentials: DecryptedSetting,
    pub routing_tag: Option<String>,
}

pub(crate) fn resolve(
    resolver: &ConfigResolver,
    target: &TargetReference,
) -> Result<AzureVmssConfig, InstanceSyncError> {
    let vmss_id = target.required(keys::VMSS_ID)?.to_string();

    let descriptor = lookup_descriptor(resolver, target, DescriptorKind::AzureVmss)?;
    let InfraDescriptor::AzureVmss(infra) = &descriptor else {
        return Err(mismatch(target, DescriptorKind::AzureVmss, &descriptor));
    };
    let credentials = resolver.decrypt(&infra.cloud_provider, &target.secret_scope()?)?;

    Ok(AzureVmssConfig {
        subscription_id: infra.subscription_id.clone(),
        resource_group: infra.resource_group.clone(),
        vmss_id,
        credentials,
        routing_tag: descriptor.routing_tag().map(str::to_string),
    })
}

impl InstanceSyncProvider for AzureVmssConfig {
    type Params = AzureVmssInstanceSyncParams;

    const TASK_TYPE: TaskType = TaskType::AzureVmss;

    fn periodic_params(&self) -> AzureVmssInstanceSyncParams {
        AzureVmssInstanceSyncParams {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            vmss_id: self.vmss_id.clone(),
            credentials: Some(Credentials::from(&self.credentials)),
        }
    }

    fn validation_parameters(&self) -> TaskParameters {
        TaskParameters::ListScaleSetInstances {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            vmss_id: self.vmss_id.clone(),
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
    fn test_resolve() {
        let (resolver, _) = resolver(descriptor(DescriptorKind::AzureVmss));
        let config = resolve(&resolver, &target(&[(keys::VMSS_ID, "vmss-1")])).unwrap();
        assert_eq!(config.subscription_id, "sub-1");
        assert_eq!(config.resource_group, "rg-1");
        assert_eq!(config.vmss_id, "vmss-1");
    }

    #[test]
    fn test_vmss_id_is_required() {
        let (resolver, _) = resolver(descriptor(DescriptorKind::AzureVmss));
        assert!(matches!(
            resolve(&resolver, &target(&[])),
            Err(InstanceSyncError::MissingTargetField(key)) if key == keys::VMSS_ID
        ));
    }
}
