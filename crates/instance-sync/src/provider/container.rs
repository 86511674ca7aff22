// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes releases and ECS services.
//!
//! Kubernetes targets are identified by release name, ECS targets by container
//! service name; the other identifier is optional.

use super::{lookup_descriptor, mismatch, InstanceSyncProvider};
use crate::delegate_task::{TaskParameters, TaskType};
use crate::error::InstanceSyncError;
use crate::target::{keys, TargetReference};
use crate::wire::{ContainerInstanceSyncParams, Credentials};
use infra_resolver::{
    ConfigResolver, DecryptedSetting, DescriptorKind, InfraDescriptor, Orchestrator,
};

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerConfig {
    pub orchestrator: Orchestrator,
    pub cluster_name: String,
    pub namespace: String,
    pub release_name: Option<String>,
    pub container_service_name: Option<String>,
    pub region: Option<String>,
    pub credentials: DecryptedSetting,
    pub routing_tag: Option<String>,
}

pub(crate) fn resolve(
    resolver: &ConfigResolver,
    target: &TargetReference,
) -> Result<ContainerConfig, InstanceSyncError> {
    let descriptor = lookup_descriptor(resolver, target, DescriptorKind::Container)?;
    let InfraDescriptor::Container(infra) = &descriptor else {
        return Err(mismatch(target, DescriptorKind::Container, &descriptor));
    };

    let release_name = target.get(keys::RELEASE_NAME).map(str::to_string);
    let container_service_name = target.get(keys::CONTAINER_SERVICE_NAME).map(str::to_string);
    match infra.orchestrator {
        Orchestrator::Kubernetes if release_name.is_none() => {
            return Err(InstanceSyncError::MissingTargetField(
                keys::RELEASE_NAME.to_string(),
            ))
        }
        Orchestrator::Ecs if container_service_name.is_none() => {
            return Err(InstanceSyncError::MissingTargetField(
                keys::CONTAINER_SERVICE_NAME.to_string(),
            ))
        }
        _ => {}
    }

    let cluster_name = target
        .get(keys::CLUSTER_NAME)
        .unwrap_or(&infra.cluster_name)
        .to_string();
    let namespace = target
        .get(keys::NAMESPACE)
        .or(infra.namespace.as_deref())
        .filter(|namespace| !namespace.trim().is_empty())
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string();
    let credentials = resolver.decrypt(&infra.cloud_provider, &target.secret_scope()?)?;

    Ok(ContainerConfig {
        orchestrator: infra.orchestrator,
        cluster_name,
        namespace,
        release_name,
        container_service_name,
        region: infra.region.clone(),
        credentials,
        routing_tag: descriptor.routing_tag().map(str::to_string),
    })
}

impl InstanceSyncProvider for ContainerConfig {
    type Params = ContainerInstanceSyncParams;

    const TASK_TYPE: TaskType = TaskType::ContainerValidation;

    fn periodic_params(&self) -> ContainerInstanceSyncParams {
        ContainerInstanceSyncParams {
            orchestrator: self.orchestrator.to_string(),
            cluster_name: self.cluster_name.clone(),
            namespace: self.namespace.clone(),
            release_name: self.release_name.clone(),
            container_service_name: self.container_service_name.clone(),
            region: self.region.clone(),
            credentials: Some(Credentials::from(&self.credentials)),
        }
    }

    fn validation_parameters(&self) -> TaskParameters {
        TaskParameters::ListContainers {
            orchestrator: self.orchestrator,
            cluster_name: self.cluster_name.clone(),
            namespace: self.namespace.clone(),
            release_name: self.release_name.clone(),
            container_service_name: self.container_service_name.clone(),
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
    use infra_resolver::descriptor::ContainerInfra;
    use infra_resolver::SettingRef;

    fn ecs_descriptor(namespace: Option<&str>) -> InfraDescriptor {
        InfraDescriptor::Container(ContainerInfra {
            cloud_provider: SettingRef::new("cloud-1"),
            orchestrator: Orchestrator::Ecs,
            cluster_name: "ecs-cluster".to_string(),
            namespace: namespace.map(str::to_string),
            region: Some("eu-west-1".to_string()),
            routing_tag: None,
        })
    }

    #[test]
    fn test_kubernetes_requires_release_name() {
        let (resolver, secrets) = resolver(descriptor(DescriptorKind::Container));
        assert!(matches!(
            resolve(&resolver, &target(&[])),
            Err(InstanceSyncError::MissingTargetField(key)) if key == keys::RELEASE_NAME
        ));
        assert_eq!(secrets.calls(), 0);
    }

    #[test]
    fn test_kubernetes_namespace_precedence() {
        let (resolver, _) = resolver(descriptor(DescriptorKind::Container));
        let config = resolve(&resolver, &target(&[(keys::RELEASE_NAME, "release-1")])).unwrap();
        assert_eq!(config.namespace, "payments");
        assert_eq!(config.cluster_name, "prod-cluster");
        assert_eq!(config.routing_tag.as_deref(), Some("k8s-delegates"));

        let config = resolve(
            &resolver,
            &target(&[(keys::RELEASE_NAME, "release-1"), (keys::NAMESPACE, "canary")]),
        )
        .unwrap();
        assert_eq!(config.namespace, "canary");
    }

    #[test]
    fn test_ecs_requires_service_name_and_defaults_namespace() {
        let (resolver, _) = resolver(ecs_descriptor(None));
        assert!(matches!(
            resolve(&resolver, &target(&[(keys::RELEASE_NAME, "release-1")])),
            Err(InstanceSyncError::MissingTargetField(key)) if key == keys::CONTAINER_SERVICE_NAME
        ));

        let config = resolve(
            &resolver,
            &target(&[(keys::CONTAINER_SERVICE_NAME, "checkout-svc")]),
        )
        .unwrap();
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));

        let params = config.periodic_params();
        assert_eq!(params.orchestrator, "ecs");
        assert_eq!(params.container_service_name.as_deref(), Some("checkout-svc"));
    }
}
