// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::SecretError;
use std::fmt;

const REDACTED: &str = "<redacted>";

/// A decrypted secret.
///
/// `Debug` and `Display` never print the value; callers must go through
/// [`SecretValue::expose`] to read it.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Reference to a stored setting (cloud provider account, vendor connector, ...)
/// whose secret-bearing fields can be decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SettingRef {
    pub id: String,
}

impl SettingRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Scope in which a setting is decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretScope {
    pub account_id: String,
    pub app_id: Option<String>,
}

impl SecretScope {
    pub fn account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            app_id: None,
        }
    }
}

/// One decrypted field of a setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFieldDetail {
    pub field_name: String,
    pub value: SecretValue,
}

impl EncryptedFieldDetail {
    pub fn new(field_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            value: SecretValue::new(value),
        }
    }
}

/// External secret store.
pub trait SecretManager: Send + Sync {
    fn decrypt(
        &self,
        setting: &SettingRef,
        scope: &SecretScope,
    ) -> Result<Vec<EncryptedFieldDetail>, SecretError>;
}

/// All decrypted fields of one setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedSetting {
    pub setting_id: String,
    pub fields: Vec<EncryptedFieldDetail>,
}

impl DecryptedSetting {
    pub fn field(&self, name: &str) -> Option<&SecretValue> {
        self.fields
            .iter()
            .find(|detail| detail.field_name == name)
            .map(|detail| &detail.value)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|detail| detail.field_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_value_is_redacted() {
        let value = SecretValue::new("hunter2");
        assert_eq!(format!("{value}"), "<redacted>");
        assert_eq!(format!("{value:?}"), "<redacted>");
        assert_eq!(value.expose(), "hunter2");

        let detail = EncryptedFieldDetail::new("secretKey", "hunter2");
        assert!(!format!("{detail:?}").contains("hunter2"));
    }

    #[test]
    fn test_decrypted_setting_field_lookup() {
        let setting = DecryptedSetting {
            setting_id: "aws-1".to_string(),
            fields: vec![
                EncryptedFieldDetail::new("accessKey", "AKIA"),
                EncryptedFieldDetail::new("secretKey", "s3cr3t"),
            ],
        };
        assert_eq!(setting.field("secretKey").map(SecretValue::expose), Some("s3cr3t"));
        assert!(setting.field("sessionToken").is_none());
        assert_eq!(
            setting.field_names().collect::<Vec<_>>(),
            vec!["accessKey", "secretKey"]
        );
    }
}
