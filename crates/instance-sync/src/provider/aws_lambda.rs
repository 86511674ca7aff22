// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{lookup_descriptor, mismatch, InstanceSyncProvider};
use crate::delegate_task::{TaskParameters, TaskType};
use crate::error::InstanceSyncError;
use crate::target::{keys, TargetReference};
use crate::wire::{AwsLambdaInstanceSyncParams, Credentials};
use infra_resolver::{ConfigResolver, DecryptedSetting, DescriptorKind, InfraDescriptor};

#[derive(Debug, Clone, PartialEq)]
pub struct AwsLambdaConfig {
    pub region: String,
    pub function_name: String,
    pub qualifier: Option<String>,
    /// Only versions deployed after this instant are reported.
    pub start_date: Option<i64>,
    pub credentials: DecryptedSetting,
    pub routing_tag: Option<String>,
}

pub(crate) fn resolve(
    resolver: &ConfigResolver,
    target: &TargetReference,
) -> Result<AwsLambdaConfig, InstanceSyncError> {
    let function_name = target.required(keys::FUNCTION_NAME)?.to_string();
    let start_date = target.millis(keys::START_DATE)?;

    let descriptor = lookup_descriptor(resolver, target, DescriptorKind::AwsLambda)?;
    let InfraDescriptor::AwsLambda(infra) = &descriptor else {
        return Err(mismatch(target, DescriptorKind::AwsLambda, &descriptor));
    };
    let credentials = resolver.decrypt(&infra.cloud_provider, &target.secret_scope()?)?;

    Ok(AwsLambdaConfig {
        region: infra.region.clone(),
        function_name,
        qualifier: target.get(keys::QUALIFIER).map(str::to_string),
        start_date,
        credentials,
        routing_tag: descriptor.routing_tag().map(str::to_string),
    })
}

impl InstanceSyncProvider for AwsLambdaConfig {
    type Params = AwsLambdaInstanceSyncParams;

    const TASK_TYPE: TaskType = TaskType::AwsLambda;

    fn periodic_params(&self) -> AwsLambdaInstanceSyncParams {
        AwsLambdaInstanceSyncParams {
            region: self.region.clone(),
            function_name: self.function_name.clone(),
            qualifier: self.qualifier.clone(),
            start_date: self.start_date,
            credentials: Some(Credentials::from(&self.credentials)),
        }
    }

    fn validation_parameters(&self) -> TaskParameters {
        TaskParameters::ListFunctionVersions {
            region: self.region.clone(),
            function_name: self.function_name.clone(),
            qualifier: self.qualifier.clone(),
            credentials: self.credentials.clone(),
        }
    }

    fn routing_tag(&self) -> Option<&str> {
        self.routing_tag.as_deref()
    }
}
