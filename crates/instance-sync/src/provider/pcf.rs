// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{lookup_descriptor, mismatch, InstanceSyncProvider};
use crate::delegate_task::{TaskParameters, TaskType};
use crate::error::InstanceSyncError;
use crate::target::{keys, TargetReference};
use crate::wire::{Credentials, PcfInstanceSyncParams};
use infra_resolver::{ConfigResolver, DecryptedSetting, DescriptorKind, InfraDescriptor};

#[derive(Debug, Clone, PartialEq)]
pub struct PcfConfig {
    pub organization: String,
    pub space: String,
    pub application_name: String,
    pub credentials: DecryptedSetting,
    pub routing_tag: Option<String>,
}

pub(crate) fn resolve(
    resolver: &ConfigResolver,
    target: &TargetReference,
) -> Result<PcfConfig, InstanceSyncError> {
    let application_name = target.required(keys::APPLICATION_NAME)?.to_string();

    let descriptor = lookup_descriptor(resolver, target, DescriptorKind::Pcf)?;
    let InfraDescriptor::Pcf(infra) = &descriptor else {
        return Err(mismatch(target, DescriptorKind::Pcf, &descriptor));
    };
    let credentials = resolver.decrypt(&infra.cloud_provider, &target.secret_scope()?)?;

    Ok(PcfConfig {
        organization: infra.organization.clone(),
        space: infra.space.clone(),
        application_name,
        credentials,
        routing_tag: descriptor.routing_tag().map(str::to_string),
    })
}

impl InstanceSyncProvider for PcfConfig {
    type Params = PcfInstanceSyncParams;

    const TASK_TYPE: TaskType = TaskType::Pcf;

    fn periodic_params(&self) -> PcfInstanceSyncParams {
        PcfInstanceSyncParams {
            organization: self.organization.clone(),
            space: self.space.clone(),
            application_name: self.application_name.clone(),
            credentials: Some(Credentials::from(&self.credentials)),
        }
    }

    fn validation_parameters(&self) -> TaskParameters {
        TaskParameters::ListApplicationInstances {
            organization: self.organization.clone(),
            space: self.space.clone(),
            application_name: self.application_name.clone(),
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
        let (resolver, _) = resolver(descriptor(DescriptorKind::Pcf));
        let config = resolve(&resolver, &target(&[(keys::APPLICATION_NAME, "checkout")])).unwrap();
        assert_eq!(config.organization, "org");
        assert_eq!(config.space, "dev");
        assert_eq!(config.application_name, "checkout");
    }
}
