// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory collaborators used by tests of this crate and of downstream crates
//! (enable the `test-support` feature).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::descriptor::{InfraDescriptor, InfraDescriptorLookup, TargetScope};
use crate::error::{LookupError, SecretError};
use crate::secrets::{EncryptedFieldDetail, SecretManager, SecretScope, SettingRef};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryDescriptorStore {
    descriptors: RwLock<HashMap<String, InfraDescriptor>>,
}

impl InMemoryDescriptorStore {
    pub fn insert(&self, target_id: &str, descriptor: InfraDescriptor) {
        self.descriptors
            .write()
            .expect("lock poisoned")
            .insert(target_id.to_string(), descriptor);
    }
}

impl InfraDescriptorLookup for InMemoryDescriptorStore {
    fn get(
        &self,
        _scope: &TargetScope,
        target_id: &str,
    ) -> Result<Option<InfraDescriptor>, LookupError> {
        Ok(self
            .descriptors
            .read()
            .expect("lock poisoned")
            .get(target_id)
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySecretManager {
    settings: RwLock<HashMap<String, Result<Vec<(String, String)>, SecretError>>>,
    calls: AtomicUsize,
}

impl InMemorySecretManager {
    pub fn insert(&self, setting_id: &str, fields: &[(&str, &str)]) {
        let fields = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        self.settings
            .write()
            .expect("lock poisoned")
            .insert(setting_id.to_string(), Ok(fields));
    }

    pub fn fail_with(&self, setting_id: &str, error: SecretError) {
        self.settings
            .write()
            .expect("lock poisoned")
            .insert(setting_id.to_string(), Err(error));
    }

    /// Number of `decrypt` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SecretManager for InMemorySecretManager {
    fn decrypt(
        &self,
        setting: &SettingRef,
        _scope: &SecretScope,
    ) -> Result<Vec<EncryptedFieldDetail>, SecretError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.settings.read().expect("lock poisoned").get(&setting.id) {
            Some(Ok(fields)) => Ok(fields
                .iter()
                .map(|(name, value)| EncryptedFieldDetail::new(name.as_str(), value.as_str()))
                .collect()),
            Some(Err(error)) => Err(error.clone()),
            None => Err(SecretError::NotFound(setting.id.clone())),
        }
    }
}
