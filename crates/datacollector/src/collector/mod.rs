// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Vendor collectors and the contract they share.
//!
//! A collector is built once per collection cycle by [`DataCollector::init`], which
//! decrypts the vendor connector into an immutable [`SecretLookup`]. Afterwards the
//! collector only reads its state, so `fetch_hosts` may be called for successive
//! host batches (see [`collect_hosts`]).

pub mod custom_apm;
pub mod datadog;
pub mod elk;
pub mod newrelic;
pub mod prometheus;

use crate::api_call::{ApiCallRecord, MaskPattern, MaskRules};
use crate::error::CollectionError;
use crate::executor::{HttpCall, RequestExecutor};
use crate::records::CollectionWindow;
use crate::template::TemplateVars;
use infra_resolver::{EncryptedFieldDetail, SecretManager, SecretScope, SecretValue, SettingRef};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Identity of the running collection and the executor it calls through.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub account_id: String,
    pub state_execution_id: String,
    pub executor: Arc<RequestExecutor>,
}

impl ExecutionContext {
    pub fn new(
        account_id: impl Into<String>,
        state_execution_id: impl Into<String>,
        executor: Arc<RequestExecutor>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            state_execution_id: state_execution_id.into(),
            executor,
        }
    }

    pub fn api_call_record(&self, title: impl Into<String>) -> ApiCallRecord {
        ApiCallRecord::new(&self.account_id, &self.state_execution_id, title)
    }
}

/// Fields common to every vendor's collection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Vendor connector holding the credentials
    pub connector: SettingRef,
    pub scope: SecretScope,
    pub window: CollectionWindow,
    /// Group (service, tier, application) the records belong to
    pub group_name: String,
}

/// Decrypted connector fields, keyed by field name. Built once, then read only.
#[derive(Clone, Default)]
pub struct SecretLookup {
    values: BTreeMap<String, SecretValue>,
}

impl SecretLookup {
    pub fn decrypt(
        manager: &dyn SecretManager,
        setting: &SettingRef,
        scope: &SecretScope,
    ) -> Result<Self, CollectionError> {
        let fields = manager
            .decrypt(setting, scope)
            .map_err(|source| CollectionError::Credential {
                setting_id: setting.id.clone(),
                source,
            })?;
        debug!(setting_id = %setting.id, fields = fields.len(), "Decrypted collector connector");
        Ok(Self::from_fields(fields))
    }

    pub fn from_fields(fields: impl IntoIterator<Item = EncryptedFieldDetail>) -> Self {
        Self {
            values: fields
                .into_iter()
                .map(|detail| (detail.field_name, detail.value))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SecretValue> {
        self.values.get(name).filter(|value| !value.is_empty())
    }

    pub fn require(&self, name: &str) -> Result<&SecretValue, CollectionError> {
        self.get(name).ok_or_else(|| {
            CollectionError::InvalidConfig(format!("connector is missing field '{name}'"))
        })
    }

    /// Literal masks replacing each secret, raw and percent-encoded, with `<fieldName>`.
    pub fn mask_rules(&self) -> MaskRules {
        self.values
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .fold(MaskRules::new(), |rules, (name, value)| {
                let placeholder = format!("<{name}>");
                let encoded = urlencoding::encode(value.expose()).into_owned();
                let rules = rules.with_literal(value.expose(), placeholder.clone());
                if encoded != value.expose() {
                    rules.with_literal(encoded, placeholder)
                } else {
                    rules
                }
            })
    }

    /// Adds every field as a template token.
    pub fn extend_vars(&self, vars: TemplateVars) -> TemplateVars {
        self.values
            .iter()
            .fold(vars, |vars, (name, value)| vars.with(name, value.expose()))
    }
}

impl fmt::Debug for SecretLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Contract of a vendor collector.
pub trait DataCollector: Sized {
    type Info;
    type Record;

    /// Binds the context and decrypts the connector referenced by `info`.
    fn init(
        context: ExecutionContext,
        info: Self::Info,
        secrets: &dyn SecretManager,
    ) -> Result<Self, CollectionError>;

    /// Hosts handled per [`DataCollector::fetch_hosts`] call.
    fn host_batch_size(&self) -> usize {
        1
    }

    /// Regex masks applied on top of the decrypted-field masks when auditing.
    fn mask_patterns(&self) -> &[MaskPattern] {
        &[]
    }

    fn fetch_hosts(&self, hosts: &[String]) -> Result<Vec<Self::Record>, CollectionError>;

    /// Account or service wide collection, not scoped to hosts.
    fn fetch(&self) -> Result<Vec<Self::Record>, CollectionError>;
}

/// Runs `fetch_hosts` over `hosts` in batches of `host_batch_size`.
pub fn collect_hosts<C: DataCollector>(
    collector: &C,
    hosts: &[String],
) -> Result<Vec<C::Record>, CollectionError> {
    let batch_size = collector.host_batch_size().max(1);
    let mut records = Vec::new();
    for batch in hosts.chunks(batch_size) {
        records.extend(collector.fetch_hosts(batch)?);
    }
    Ok(records)
}

/// State shared by collectors once `init` ran.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) context: ExecutionContext,
    pub(crate) secrets: SecretLookup,
    pub(crate) masks: MaskRules,
}

impl Session {
    pub(crate) fn new(
        context: ExecutionContext,
        secrets: SecretLookup,
        patterns: &[MaskPattern],
    ) -> Self {
        let masks = secrets.mask_rules().with_patterns(patterns.iter().cloned());
        Self {
            context,
            secrets,
            masks,
        }
    }

    /// Audited, retried call returning the parsed JSON body.
    pub(crate) fn call_json(&self, title: &str, call: &HttpCall) -> Result<Value, CollectionError> {
        let record = self.context.api_call_record(title);
        let body = self
            .context
            .executor
            .execute_audited(call, &record, &self.masks)?;
        parse_body(&body)
    }

    /// Single audited attempt; failures are logged and yield `None`.
    pub(crate) fn call_json_best_effort(&self, title: &str, call: &HttpCall) -> Option<Value> {
        let record = self.context.api_call_record(title);
        let result = self
            .context
            .executor
            .execute_best_effort(call, &record, &self.masks)
            .and_then(|body| parse_body(&body));
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    account_id = %self.context.account_id,
                    url = %self.masks.mask(&call.url),
                    "Skipping best-effort request: {}",
                    self.masks.mask(&err.to_string())
                );
                None
            }
        }
    }
}

fn parse_body(body: &str) -> Result<Value, CollectionError> {
    if body.trim().is_empty() {
        return Err(CollectionError::parse("empty response body"));
    }
    Ok(serde_json::from_str(body)?)
}

/// Joins a base URL and a path without doubling or dropping the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}


#[cfg(test)]
mod tests {
    use super::*;
    use infra_resolver::memory::InMemorySecretManager;
    use infra_resolver::SecretError;

    #[test]
    fn test_lookup_masks_raw_and_encoded_secrets() {
        let lookup = SecretLookup::from_fields(vec![
            EncryptedFieldDetail::new("api_key", "k3y/with+chars"),
            EncryptedFieldDetail::new("empty", ""),
        ]);
        let rules = lookup.mask_rules();
        assert_eq!(rules.mask("key=k3y/with+chars"), "key=<api_key>");
        assert_eq!(rules.mask("key=k3y%2Fwith%2Bchars"), "key=<api_key>");
        assert!(lookup.get("empty").is_none());
        assert!(lookup.require("password").is_err());
        assert!(!format!("{lookup:?}").contains("k3y"));
    }

    #[test]
    fn test_decrypt_failure_is_credential_error() {
        let manager = InMemorySecretManager::default();
        manager.fail_with("connector-1", SecretError::Backend("vault sealed".to_string()));
        let err = SecretLookup::decrypt(
            &manager,
            &SettingRef::new("connector-1"),
            &SecretScope::account("acct-1"),
        )
        .unwrap_err();
        assert!(matches!(err, CollectionError::Credential { .. }));
    }

    #[test]
    fn test_lookup_feeds_templates() {
        let lookup = SecretLookup::from_fields(vec![EncryptedFieldDetail::new("token", "abc")]);
        let vars = lookup.extend_vars(TemplateVars::new().with_host("web-1"));
        assert_eq!(vars.render("${host}:${token}").unwrap(), "web-1:abc");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://es:9200/", "/logs/_search"), "http://es:9200/logs/_search");
        assert_eq!(join_url("http://es:9200", "logs"), "http://es:9200/logs");
    }

    struct CountingCollector {
        batch_size: usize,
        batches: std::sync::Mutex<Vec<usize>>,
    }

    impl DataCollector for CountingCollector {
        type Info = usize;
        type Record = String;

        fn init(
            _context: ExecutionContext,
            batch_size: usize,
            _secrets: &dyn SecretManager,
        ) -> Result<Self, CollectionError> {
            Ok(Self {
                batch_size,
                batches: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn host_batch_size(&self) -> usize {
            self.batch_size
        }

        fn fetch_hosts(&self, hosts: &[String]) -> Result<Vec<String>, CollectionError> {
            self.batches.lock().unwrap().push(hosts.len());
            Ok(hosts.to_vec())
        }

        fn fetch(&self) -> Result<Vec<String>, CollectionError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_collect_hosts_respects_batch_size() {
        let (context, _) = fixtures::context();
        let collector =
            CountingCollector::init(context, 2, &InMemorySecretManager::default()).unwrap();
        let hosts: Vec<String> = (0..5).map(|index| format!("host-{index}")).collect();

        let records = collect_hosts(&collector, &hosts).unwrap();
        assert_eq!(records, hosts);
        assert_eq!(*collector.batches.lock().unwrap(), vec![2, 2, 1]);
    }
}
