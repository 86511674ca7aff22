// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resolution of deployment-target configuration for delegate tasks.
//!
//! A target is identified by an infrastructure descriptor id. The descriptor names
//! the concrete platform (cloud function, VM group, scale set, ...) and references
//! one or more settings whose secret-bearing fields are decrypted through a
//! [`SecretManager`]. Both collaborators sit behind traits so callers plug in their
//! own persistence and secret stores.
//!
//! Decrypted values are wrapped in [`SecretValue`], which never prints its content.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod descriptor;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod resolver;
pub mod secrets;

pub use descriptor::{
    DescriptorKind, InfraDescriptor, InfraDescriptorLookup, Orchestrator, TargetScope,
};
pub use error::{LookupError, ResolverError, SecretError};
pub use resolver::ConfigResolver;
pub use secrets::{
    DecryptedSetting, EncryptedFieldDetail, SecretManager, SecretScope, SecretValue, SettingRef,
};
