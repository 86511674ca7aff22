// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{lookup_descriptor, mismatch, InstanceSyncProvider};
use crate::delegate_task::{TaskParameters, TaskType};
use crate::error::InstanceSyncError;
use crate::target::{keys, TargetReference};
use crate::wire::{Credentials, SpotinstInstanceSyncParams};
use infra_resolver::{ConfigResolver, DecryptedSetting, DescriptorKind, InfraDescriptor};

/// Elastigroup listing needs the Spotinst token and the AWS account behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotinstConfig {
    pub region: String,
    pub elastigroup_id: String,
    pub spotinst_credentials: DecryptedSetting,
    pub aws_credentials: DecryptedSetting,
    pub routing_tag: Option<String>,
}

pub(crate) fn resolve(
    resolver: &ConfigResolver,
    target: &TargetReference,
) -> Result<SpotinstConfig, InstanceSyncError> {
    let elastigroup_id = target.required(keys::ELASTIGROUP_ID)?.to_string();

    let descriptor = lookup_descriptor(resolver, target, DescriptorKind::Spotinst)?;
    let InfraDescriptor::Spotinst(infra) = &descriptor else {
        return Err(mismatch(target, DescriptorKind::Spotinst, &descriptor));
    };
    let scope = target.secret_scope()?;
    let spotinst_credentials = resolver.decrypt(&infra.spotinst_account, &scope)?;
    let aws_credentials = resolver.decrypt(&infra.aws_cloud_provider, &scope)?;

    Ok(SpotinstConfig {
        region: infra.region.clone(),
        elastigroup_id,
        spotinst_credentials,
        aws_credentials,
        routing_tag: descriptor.routing_tag().map(str::to_string),
    })
}

impl InstanceSyncProvider for SpotinstConfig {
    type Params = SpotinstInstanceSyncParams;

    const TASK_TYPE: TaskType = TaskType::Spotinst;

    fn periodic_params(&self) -> SpotinstInstanceSyncParams {
        SpotinstInstanceSyncParams {
            region: self.region.clone(),
            elastigroup_id: self.elastigroup_id.clone(),
            spotinst_credentials: Some(Credentials::from(&self.spotinst_credentials)),
            aws_credentials: Some(Credentials::from(&self.aws_credentials)),
        }
    }

    fn validation_parameters(&self) -> TaskParameters {
        TaskParameters::ListElastigroupInstances {
            region: self.region.clone(),
            elastigroup_id: self.elastigroup_id.clone(),
            spotinst_credentials: self.spotinst_credentials.clone(),
            aws_credentials: self.aws_credentials.clone(),
        }
    }

    fn routing_tag(&self) -> Option<&str> {
        self.routing_tag.as_deref()
    }
}
