// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-target-kind resolution and task building.
//!
//! [`InstanceSyncKind`] selects the builder; [`InstanceSyncKind::resolve`] produces a
//! [`ResolvedProviderConfig`] carrying only the fields that kind needs, from which
//! both the periodic payload and the validation task are derived.

pub mod aws_instance;
pub mod aws_lambda;
pub mod azure_vmss;
pub mod azure_web_app;
pub mod container;
pub mod pcf;
pub mod physical_host;
pub mod spotinst;

use crate::config::InstanceSyncConfig;
use crate::delegate_task::{DelegateTask, TaskParameters, TaskType};
use crate::error::InstanceSyncError;
use crate::target::{keys, TargetReference};
use crate::wire::{WireMessage, WireTaskParams};
use infra_resolver::{ConfigResolver, DescriptorKind, InfraDescriptor, ResolverError};
use tracing::debug;

/// Deployment target kinds supporting instance sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum InstanceSyncKind {
    #[display("aws-lambda")]
    AwsLambda,
    #[display("aws-ssh-instance")]
    AwsSshInstance,
    #[display("azure-vmss")]
    AzureVmss,
    #[display("azure-web-app")]
    AzureWebApp,
    #[display("container")]
    Container,
    #[display("spotinst-elastigroup")]
    SpotinstElastigroup,
    #[display("physical-host")]
    PhysicalHost,
    #[display("pcf")]
    Pcf,
}

impl InstanceSyncKind {
    pub const ALL: [InstanceSyncKind; 8] = [
        InstanceSyncKind::AwsLambda,
        InstanceSyncKind::AwsSshInstance,
        InstanceSyncKind::AzureVmss,
        InstanceSyncKind::AzureWebApp,
        InstanceSyncKind::Container,
        InstanceSyncKind::SpotinstElastigroup,
        InstanceSyncKind::PhysicalHost,
        InstanceSyncKind::Pcf,
    ];

    /// Descriptor type this kind expects to find for its target.
    pub fn descriptor_kind(self) -> DescriptorKind {
        match self {
            InstanceSyncKind::AwsLambda => DescriptorKind::AwsLambda,
            InstanceSyncKind::AwsSshInstance => DescriptorKind::AwsInstance,
            InstanceSyncKind::AzureVmss => DescriptorKind::AzureVmss,
            InstanceSyncKind::AzureWebApp => DescriptorKind::AzureWebApp,
            InstanceSyncKind::Container => DescriptorKind::Container,
            InstanceSyncKind::SpotinstElastigroup => DescriptorKind::Spotinst,
            InstanceSyncKind::PhysicalHost => DescriptorKind::PhysicalHost,
            InstanceSyncKind::Pcf => DescriptorKind::Pcf,
        }
    }

    /// Looks up the target's descriptor and decrypts its credentials.
    pub fn resolve(
        self,
        resolver: &ConfigResolver,
        target: &TargetReference,
    ) -> Result<ResolvedProviderConfig, InstanceSyncError> {
        let resolved = match self {
            InstanceSyncKind::AwsLambda => {
                ResolvedProviderConfig::AwsLambda(aws_lambda::resolve(resolver, target)?)
            }
            InstanceSyncKind::AwsSshInstance => {
                ResolvedProviderConfig::AwsSshInstance(aws_instance::resolve(resolver, target)?)
            }
            InstanceSyncKind::AzureVmss => {
                ResolvedProviderConfig::AzureVmss(azure_vmss::resolve(resolver, target)?)
            }
            InstanceSyncKind::AzureWebApp => {
                ResolvedProviderConfig::AzureWebApp(azure_web_app::resolve(resolver, target)?)
            }
            InstanceSyncKind::Container => {
                ResolvedProviderConfig::Container(container::resolve(resolver, target)?)
            }
            InstanceSyncKind::SpotinstElastigroup => {
                ResolvedProviderConfig::SpotinstElastigroup(spotinst::resolve(resolver, target)?)
            }
            InstanceSyncKind::PhysicalHost => {
                ResolvedProviderConfig::PhysicalHost(physical_host::resolve(resolver, target)?)
            }
            InstanceSyncKind::Pcf => ResolvedProviderConfig::Pcf(pcf::resolve(resolver, target)?),
        };
        debug!(kind = %self, "Resolved instance sync target");
        Ok(resolved)
    }
}

/// Resolved, decrypted configuration of one target. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedProviderConfig {
    AwsLambda(aws_lambda::AwsLambdaConfig),
    AwsSshInstance(aws_instance::AwsInstanceConfig),
    AzureVmss(azure_vmss::AzureVmssConfig),
    AzureWebApp(azure_web_app::AzureWebAppConfig),
    Container(container::ContainerConfig),
    SpotinstElastigroup(spotinst::SpotinstConfig),
    PhysicalHost(physical_host::PhysicalHostConfig),
    Pcf(pcf::PcfConfig),
}

impl ResolvedProviderConfig {
    pub fn kind(&self) -> InstanceSyncKind {
        match self {
            ResolvedProviderConfig::AwsLambda(_) => InstanceSyncKind::AwsLambda,
            ResolvedProviderConfig::AwsSshInstance(_) => InstanceSyncKind::AwsSshInstance,
            ResolvedProviderConfig::AzureVmss(_) => InstanceSyncKind::AzureVmss,
            ResolvedProviderConfig::AzureWebApp(_) => InstanceSyncKind::AzureWebApp,
            ResolvedProviderConfig::Container(_) => InstanceSyncKind::Container,
            ResolvedProviderConfig::SpotinstElastigroup(_) => InstanceSyncKind::SpotinstElastigroup,
            ResolvedProviderConfig::PhysicalHost(_) => InstanceSyncKind::PhysicalHost,
            ResolvedProviderConfig::Pcf(_) => InstanceSyncKind::Pcf,
        }
    }

    /// Serializes the configuration into the periodic payload. No I/O.
    pub fn build_periodic_params(&self, version: u32) -> WireTaskParams {
        match self {
            ResolvedProviderConfig::AwsLambda(config) => pack(config, version),
            ResolvedProviderConfig::AwsSshInstance(config) => pack(config, version),
            ResolvedProviderConfig::AzureVmss(config) => pack(config, version),
            ResolvedProviderConfig::AzureWebApp(config) => pack(config, version),
            ResolvedProviderConfig::Container(config) => pack(config, version),
            ResolvedProviderConfig::SpotinstElastigroup(config) => pack(config, version),
            ResolvedProviderConfig::PhysicalHost(config) => pack(config, version),
            ResolvedProviderConfig::Pcf(config) => pack(config, version),
        }
    }

    /// Builds the one-shot connectivity check, stamped with the current clock.
    pub fn build_validation_task(
        &self,
        account_id: &str,
        config: &InstanceSyncConfig,
    ) -> DelegateTask {
        self.build_validation_task_at(account_id, config, chrono::Utc::now().timestamp_millis())
    }

    pub fn build_validation_task_at(
        &self,
        account_id: &str,
        config: &InstanceSyncConfig,
        now_millis: i64,
    ) -> DelegateTask {
        match self {
            ResolvedProviderConfig::AwsLambda(provider) => {
                validation_task(provider, account_id, config, now_millis)
            }
            ResolvedProviderConfig::AwsSshInstance(provider) => {
                validation_task(provider, account_id, config, now_millis)
            }
            ResolvedProviderConfig::AzureVmss(provider) => {
                validation_task(provider, account_id, config, now_millis)
            }
            ResolvedProviderConfig::AzureWebApp(provider) => {
                validation_task(provider, account_id, config, now_millis)
            }
            ResolvedProviderConfig::Container(provider) => {
                validation_task(provider, account_id, config, now_millis)
            }
            ResolvedProviderConfig::SpotinstElastigroup(provider) => {
                validation_task(provider, account_id, config, now_millis)
            }
            ResolvedProviderConfig::PhysicalHost(provider) => {
                validation_task(provider, account_id, config, now_millis)
            }
            ResolvedProviderConfig::Pcf(provider) => {
                validation_task(provider, account_id, config, now_millis)
            }
        }
    }
}

/// Shared contract of the resolved per-kind configurations.
trait InstanceSyncProvider {
    type Params: WireMessage;

    const TASK_TYPE: TaskType;

    fn periodic_params(&self) -> Self::Params;

    fn validation_parameters(&self) -> TaskParameters;

    fn routing_tag(&self) -> Option<&str>;
}

fn pack<P: InstanceSyncProvider>(provider: &P, version: u32) -> WireTaskParams {
    WireTaskParams::pack(&provider.periodic_params(), version)
}

fn validation_task<P: InstanceSyncProvider>(
    provider: &P,
    account_id: &str,
    config: &InstanceSyncConfig,
    now_millis: i64,
) -> DelegateTask {
    DelegateTask::validation(
        account_id,
        P::TASK_TYPE,
        provider.validation_parameters(),
        provider.routing_tag(),
        config,
        now_millis,
    )
}

/// Fetches the descriptor referenced by the target's infra mapping id.
fn lookup_descriptor(
    resolver: &ConfigResolver,
    target: &TargetReference,
    expected: DescriptorKind,
) -> Result<InfraDescriptor, InstanceSyncError> {
    let scope = target.scope()?;
    let target_id = target.infra_mapping_id()?;
    Ok(resolver.descriptor(&scope, target_id, expected)?)
}

fn mismatch(
    target: &TargetReference,
    expected: DescriptorKind,
    descriptor: &InfraDescriptor,
) -> InstanceSyncError {
    InstanceSyncError::Resolution(ResolverError::DescriptorMismatch {
        target_id: target
            .get(keys::INFRA_MAPPING_ID)
            .unwrap_or_default()
            .to_string(),
        expected,
        actual: descriptor.kind(),
    })
}
