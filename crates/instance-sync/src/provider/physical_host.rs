// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{lookup_descriptor, mismatch, InstanceSyncProvider};
use crate::delegate_task::{TaskParameters, TaskType};
use crate::error::InstanceSyncError;
use crate::target::{keys, TargetReference};
use crate::wire::{Credentials, PhysicalHostInstanceSyncParams};
use infra_resolver::{ConfigResolver, DecryptedSetting, DescriptorKind, InfraDescriptor};

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalHostConfig {
    pub host_names: Vec<String>,
    pub connection_credentials: DecryptedSetting,
    pub routing_tag: Option<String>,
}

pub(crate) fn resolve(
    resolver: &ConfigResolver,
    target: &TargetReference,
) -> Result<PhysicalHostConfig, InstanceSyncError> {
    let descriptor = lookup_descriptor(resolver, target, DescriptorKind::PhysicalHost)?;
    let InfraDescriptor::PhysicalHost(infra) = &descriptor else {
        return Err(mismatch(target, DescriptorKind::PhysicalHost, &descriptor));
    };

    let mut host_names = target.list(keys::HOST_NAMES);
    if host_names.is_empty() {
        host_names = infra
            .host_names
            .iter()
            .map(|host| host.trim())
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .collect();
    }
    if host_names.is_empty() {
        return Err(InstanceSyncError::InvalidTargetField {
            key: keys::HOST_NAMES.to_string(),
            value: String::new(),
        });
    }
    let connection_credentials =
        resolver.decrypt(&infra.host_connection_attrs, &target.secret_scope()?)?;

    Ok(PhysicalHostConfig {
        host_names,
        connection_credentials,
        routing_tag: descriptor.routing_tag().map(str::to_string),
    })
}

impl InstanceSyncProvider for PhysicalHostConfig {
    type Params = PhysicalHostInstanceSyncParams;

    const TASK_TYPE: TaskType = TaskType::HostValidation;

    fn periodic_params(&self) -> PhysicalHostInstanceSyncParams {
        PhysicalHostInstanceSyncParams {
            host_names: self.host_names.clone(),
            connection_credentials: Some(Credentials::from(&self.connection_credentials)),
        }
    }

    fn validation_parameters(&self) -> TaskParameters {
        TaskParameters::CheckHostReachability {
            host_names: self.host_names.clone(),
            connection_credentials: self.connection_credentials.clone(),
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
    use infra_resolver::descriptor::PhysicalHostInfra;
    use infra_resolver::SettingRef;

    #[test]
    fn test_host_names_fall_back_to_descriptor() {
        let (resolver, _) = resolver(descriptor(DescriptorKind::PhysicalHost));
        let config = resolve(&resolver, &target(&[])).unwrap();
        assert_eq!(config.host_names, vec!["host-a", "host-b"]);

        let config = resolve(&resolver, &target(&[(keys::HOST_NAMES, "host-c")])).unwrap();
        assert_eq!(config.host_names, vec!["host-c"]);
    }

    #[test]
    fn test_no_hosts_is_invalid() {
        let (resolver, secrets) = resolver(InfraDescriptor::PhysicalHost(PhysicalHostInfra {
            host_names: vec![" ".to_string()],
            host_connection_attrs: SettingRef::new("ssh-1"),
            routing_tag: None,
        }));
        assert!(matches!(
            resolve(&resolver, &target(&[])),
            Err(InstanceSyncError::InvalidTargetField { key, .. }) if key == keys::HOST_NAMES
        ));
        assert_eq!(secrets.calls(), 0);
    }
}
