// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Protobuf payloads shipped to delegates for periodic instance sync.
//!
//! Every target kind has its own message; the message is packed into a
//! [`WireTaskParams`] envelope carrying a schema version and a type URL so the
//! delegate can dispatch on it. Messages skip the derived `Debug` because they
//! carry decrypted credentials.

use crate::error::InstanceSyncError;
use infra_resolver::DecryptedSetting;
use prost::Message;
use std::collections::BTreeMap;
use std::fmt;

/// A message that can travel inside [`WireTaskParams`].
pub trait WireMessage: Message + Default {
    const TYPE_URL: &'static str;
}

/// Versioned envelope around a serialized instance sync payload.
#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct WireTaskParams {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(string, tag = "2")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "3")]
    pub value: Vec<u8>,
}

impl WireTaskParams {
    pub fn pack<M: WireMessage>(message: &M, version: u32) -> Self {
        Self {
            version,
            type_url: M::TYPE_URL.to_string(),
            value: message.encode_to_vec(),
        }
    }

    pub fn unpack<M: WireMessage>(&self) -> Result<M, InstanceSyncError> {
        if self.type_url != M::TYPE_URL {
            return Err(InstanceSyncError::WireTypeMismatch {
                expected: M::TYPE_URL.to_string(),
                actual: self.type_url.clone(),
            });
        }
        Ok(M::decode(self.value.as_slice())?)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InstanceSyncError> {
        Ok(Self::decode(bytes)?)
    }
}

impl fmt::Debug for WireTaskParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireTaskParams")
            .field("version", &self.version)
            .field("type_url", &self.type_url)
            .field("value_len", &self.value.len())
            .finish()
    }
}

/// One decrypted credential field.
#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct CredentialField {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

impl fmt::Debug for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialField")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// All decrypted fields of one setting, tagged with the setting id.
#[derive(Clone, PartialEq, Message)]
pub struct Credentials {
    #[prost(string, tag = "1")]
    pub setting_id: String,
    #[prost(message, repeated, tag = "2")]
    pub fields: Vec<CredentialField>,
}

impl From<&DecryptedSetting> for Credentials {
    fn from(setting: &DecryptedSetting) -> Self {
        Self {
            setting_id: setting.setting_id.clone(),
            fields: setting
                .fields
                .iter()
                .map(|detail| CredentialField {
                    name: detail.field_name.clone(),
                    value: detail.value.expose().to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct AwsLambdaInstanceSyncParams {
    #[prost(string, tag = "1")]
    pub region: String,
    #[prost(string, tag = "2")]
    pub function_name: String,
    #[prost(string, optional, tag = "3")]
    pub qualifier: Option<String>,
    #[prost(int64, optional, tag = "4")]
    pub start_date: Option<i64>,
    #[prost(message, optional, tag = "5")]
    pub credentials: Option<Credentials>,
}

#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct AwsInstanceSyncParams {
    #[prost(string, tag = "1")]
    pub region: String,
    #[prost(string, repeated, tag = "2")]
    pub vpc_ids: Vec<String>,
    #[prost(btree_map = "string, string", tag = "3")]
    pub tags: BTreeMap<String, String>,
    #[prost(string, optional, tag = "4")]
    pub asg_name: Option<String>,
    #[prost(message, optional, tag = "5")]
    pub credentials: Option<Credentials>,
}

#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct AzureVmssInstanceSyncParams {
    #[prost(string, tag = "1")]
    pub subscription_id: String,
    #[prost(string, tag = "2")]
    pub resource_group: String,
    #[prost(string, tag = "3")]
    pub vmss_id: String,
    #[prost(message, optional, tag = "4")]
    pub credentials: Option<Credentials>,
}

#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct AzureWebAppInstanceSyncParams {
    #[prost(string, tag = "1")]
    pub subscription_id: String,
    #[prost(string, tag = "2")]
    pub resource_group: String,
    #[prost(string, tag = "3")]
    pub app_name: String,
    #[prost(string, tag = "4")]
    pub slot_name: String,
    #[prost(message, optional, tag = "5")]
    pub credentials: Option<Credentials>,
}

#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct ContainerInstanceSyncParams {
    #[prost(string, tag = "1")]
    pub orchestrator: String,
    #[prost(string, tag = "2")]
    pub cluster_name: String,
    #[prost(string, tag = "3")]
    pub namespace: String,
    #[prost(string, optional, tag = "4")]
    pub release_name: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub container_service_name: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub region: Option<String>,
    #[prost(message, optional, tag = "7")]
    pub credentials: Option<Credentials>,
}

#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct SpotinstInstanceSyncParams {
    #[prost(string, tag = "1")]
    pub region: String,
    #[prost(string, tag = "2")]
    pub elastigroup_id: String,
    #[prost(message, optional, tag = "3")]
    pub spotinst_credentials: Option<Credentials>,
    #[prost(message, optional, tag = "4")]
    pub aws_credentials: Option<Credentials>,
}

#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct PhysicalHostInstanceSyncParams {
    #[prost(string, repeated, tag = "1")]
    pub host_names: Vec<String>,
    #[prost(message, optional, tag = "2")]
    pub connection_credentials: Option<Credentials>,
}

#[derive(Clone, PartialEq, Message)]
#[prost(skip_debug)]
pub struct PcfInstanceSyncParams {
    #[prost(string, tag = "1")]
    pub organization: String,
    #[prost(string, tag = "2")]
    pub space: String,
    #[prost(string, tag = "3")]
    pub application_name: String,
    #[prost(message, optional, tag = "4")]
    pub credentials: Option<Credentials>,
}

macro_rules! wire_message {
    ($($message:ident),+ $(,)?) => {
        $(
            impl WireMessage for $message {
                const TYPE_URL: &'static str =
                    concat!("type.googleapis.com/instancesync.", stringify!($message));
            }

            impl fmt::Debug for $message {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(concat!(stringify!($message), " { .. }"))
                }
            }
        )+
    };
}

wire_message!(
    AwsLambdaInstanceSyncParams,
    AwsInstanceSyncParams,
    AzureVmssInstanceSyncParams,
    AzureWebAppInstanceSyncParams,
    ContainerInstanceSyncParams,
    SpotinstInstanceSyncParams,
    PhysicalHostInstanceSyncParams,
    PcfInstanceSyncParams,
);
