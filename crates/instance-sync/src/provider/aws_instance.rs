// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{lookup_descriptor, mismatch, InstanceSyncProvider};
use crate::delegate_task::{TaskParameters, TaskType};
use crate::error::InstanceSyncError;
use crate::target::{keys, TargetReference};
use crate::wire::{AwsInstanceSyncParams, Credentials};
use infra_resolver::{ConfigResolver, DecryptedSetting, DescriptorKind, InfraDescriptor};
use std::collections::BTreeMap;

/// EC2 instances reached over SSH, selected by VPC and tags or by auto scaling group.
#[derive(Debug, Clone, PartialEq)]
pub struct AwsInstanceConfig {
    pub region: String,
    pub vpc_ids: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub asg_name: Option<String>,
    pub credentials: DecryptedSetting,
    pub routing_tag: Option<String>,
}

pub(crate) fn resolve(
    resolver: &ConfigResolver,
    target: &TargetReference,
) -> Result<AwsInstanceConfig, InstanceSyncError> {
    let descriptor = lookup_descriptor(resolver, target, DescriptorKind::AwsInstance)?;
    let InfraDescriptor::AwsInstance(infra) = &descriptor else {
        return Err(mismatch(target, DescriptorKind::AwsInstance, &descriptor));
    };
    let credentials = resolver.decrypt(&infra.cloud_provider, &target.secret_scope()?)?;

    // A group named on the target overrides the one provisioned with the infrastructure.
    let asg_name = target
        .get(keys::ASG_NAME)
        .map(str::to_string)
        .or_else(|| infra.asg_name.clone());

    Ok(AwsInstanceConfig {
        region: infra.region.clone(),
        vpc_ids: infra.vpc_ids.clone(),
        tags: infra.tags.clone(),
        asg_name,
        credentials,
        routing_tag: descriptor.routing_tag().map(str::to_string),
    })
}

impl InstanceSyncProvider for AwsInstanceConfig {
    type Params = AwsInstanceSyncParams;

    const TASK_TYPE: TaskType = TaskType::AwsEc2;

    fn periodic_params(&self) -> AwsInstanceSyncParams {
        AwsInstanceSyncParams {
            region: self.region.clone(),
            vpc_ids: self.vpc_ids.clone(),
            tags: self.tags.clone(),
            asg_name: self.asg_name.clone(),
            credentials: Some(Credentials::from(&self.credentials)),
        }
    }

    fn validation_parameters(&self) -> TaskParameters {
        TaskParameters::ListEc2Instances {
            region: self.region.clone(),
            vpc_ids: self.vpc_ids.clone(),
            tags: self.tags.clone(),
            asg_name: self.asg_name.clone(),
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
    fn test_resolve_copies_filters() {
        let (resolver, _) = resolver(descriptor(DescriptorKind::AwsInstance));
        let config = resolve(&resolver, &target(&[])).unwrap();

        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.vpc_ids, vec!["vpc-1"]);
        assert_eq!(config.tags.get("team").map(String::as_str), Some("payments"));
        assert_eq!(config.asg_name, None);
    }

    #[test]
    fn test_target_asg_overrides_descriptor() {
        let (resolver, _) = resolver(descriptor(DescriptorKind::AwsInstance));
        let config = resolve(&resolver, &target(&[(keys::ASG_NAME, "web-asg")])).unwrap();
        assert_eq!(config.asg_name.as_deref(), Some("web-asg"));

        match config.validation_parameters() {
            TaskParameters::ListEc2Instances { asg_name, .. } => {
                assert_eq!(asg_name.as_deref(), Some("web-asg"))
            }
            other => panic!("unexpected parameters {other:?}"),
        }
    }
}
