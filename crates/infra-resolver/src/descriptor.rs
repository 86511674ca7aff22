// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::LookupError;
use crate::secrets::SettingRef;
use std::collections::BTreeMap;

/// Scope a descriptor is looked up in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetScope {
    pub account_id: String,
    pub app_id: Option<String>,
}

/// Concrete platform type of an infrastructure descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum DescriptorKind {
    #[display("AwsLambda")]
    AwsLambda,
    #[display("AwsInstance")]
    AwsInstance,
    #[display("AzureVmss")]
    AzureVmss,
    #[display("AzureWebApp")]
    AzureWebApp,
    #[display("Container")]
    Container,
    #[display("Spotinst")]
    Spotinst,
    #[display("PhysicalHost")]
    PhysicalHost,
    #[display("Pcf")]
    Pcf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsLambdaInfra {
    pub cloud_provider: SettingRef,
    pub region: String,
    pub routing_tag: Option<String>,
}

/// EC2 instances selected either by filter or by auto scaling group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsInstanceInfra {
    pub cloud_provider: SettingRef,
    pub region: String,
    pub vpc_ids: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub asg_name: Option<String>,
    pub routing_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureVmssInfra {
    pub cloud_provider: SettingRef,
    pub subscription_id: String,
    pub resource_group: String,
    pub routing_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureWebAppInfra {
    pub cloud_provider: SettingRef,
    pub subscription_id: String,
    pub resource_group: String,
    pub routing_tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Orchestrator {
    #[display("kubernetes")]
    Kubernetes,
    #[display("ecs")]
    Ecs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfra {
    pub cloud_provider: SettingRef,
    pub orchestrator: Orchestrator,
    pub cluster_name: String,
    pub namespace: Option<String>,
    pub region: Option<String>,
    pub routing_tag: Option<String>,
}

/// Elastigroups need both the Spotinst account and the AWS account backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotinstInfra {
    pub spotinst_account: SettingRef,
    pub aws_cloud_provider: SettingRef,
    pub region: String,
    pub routing_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalHostInfra {
    pub host_names: Vec<String>,
    pub host_connection_attrs: SettingRef,
    pub routing_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcfInfra {
    pub cloud_provider: SettingRef,
    pub organization: String,
    pub space: String,
    pub routing_tag: Option<String>,
}

/// Typed infrastructure descriptor as stored for a target group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfraDescriptor {
    AwsLambda(AwsLambdaInfra),
    AwsInstance(AwsInstanceInfra),
    AzureVmss(AzureVmssInfra),
    AzureWebApp(AzureWebAppInfra),
    Container(ContainerInfra),
    Spotinst(SpotinstInfra),
    PhysicalHost(PhysicalHostInfra),
    Pcf(PcfInfra),
}

impl InfraDescriptor {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            InfraDescriptor::AwsLambda(_) => DescriptorKind::AwsLambda,
            InfraDescriptor::AwsInstance(_) => DescriptorKind::AwsInstance,
            InfraDescriptor::AzureVmss(_) => DescriptorKind::AzureVmss,
            InfraDescriptor::AzureWebApp(_) => DescriptorKind::AzureWebApp,
            InfraDescriptor::Container(_) => DescriptorKind::Container,
            InfraDescriptor::Spotinst(_) => DescriptorKind::Spotinst,
            InfraDescriptor::PhysicalHost(_) => DescriptorKind::PhysicalHost,
            InfraDescriptor::Pcf(_) => DescriptorKind::Pcf,
        }
    }

    /// Delegate selector carried by the descriptor, if any.
    pub fn routing_tag(&self) -> Option<&str> {
        let tag = match self {
            InfraDescriptor::AwsLambda(infra) => &infra.routing_tag,
            InfraDescriptor::AwsInstance(infra) => &infra.routing_tag,
            InfraDescriptor::AzureVmss(infra) => &infra.routing_tag,
            InfraDescriptor::AzureWebApp(infra) => &infra.routing_tag,
            InfraDescriptor::Container(infra) => &infra.routing_tag,
            InfraDescriptor::Spotinst(infra) => &infra.routing_tag,
            InfraDescriptor::PhysicalHost(infra) => &infra.routing_tag,
            InfraDescriptor::Pcf(infra) => &infra.routing_tag,
        };
        tag.as_deref().filter(|tag| !tag.trim().is_empty())
    }
}

/// External store of infrastructure descriptors.
pub trait InfraDescriptorLookup: Send + Sync {
    fn get(
        &self,
        scope: &TargetScope,
        target_id: &str,
    ) -> Result<Option<InfraDescriptor>, LookupError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lambda(routing_tag: Option<&str>) -> InfraDescriptor {
        InfraDescriptor::AwsLambda(AwsLambdaInfra {
            cloud_provider: SettingRef::new("aws-1"),
            region: "us-east-1".to_string(),
            routing_tag: routing_tag.map(str::to_string),
        })
    }

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(lambda(None).kind(), DescriptorKind::AwsLambda);
        assert_eq!(DescriptorKind::Spotinst.to_string(), "Spotinst");
        assert_eq!(Orchestrator::Kubernetes.to_string(), "kubernetes");
    }

    #[test]
    fn test_blank_routing_tag_is_ignored() {
        assert_eq!(lambda(Some("prod-delegates")).routing_tag(), Some("prod-delegates"));
        assert_eq!(lambda(Some("  ")).routing_tag(), None);
        assert_eq!(lambda(None).routing_tag(), None);
    }
}
