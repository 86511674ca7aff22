// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Audit trail of vendor calls.
//!
//! Every attempt made by the request executor produces one [`ApiCallRecord`].
//! Request and response text is masked with [`MaskRules`] before it is stored on
//! the record, so a sink never sees a decrypted secret.

use regex::Regex;
use std::borrow::Cow;
use std::sync::Mutex;
use tracing::debug;

/// One audited request/response exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiCallRecord {
    pub account_id: String,
    pub state_execution_id: String,
    /// Short human readable description of the call
    pub title: String,
    pub request_timestamp: i64,
    pub response_timestamp: Option<i64>,
    pub method: String,
    pub url: String,
    pub request_body: Option<String>,
    pub retry_count: u32,
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
}

impl ApiCallRecord {
    pub fn new(
        account_id: impl Into<String>,
        state_execution_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            state_execution_id: state_execution_id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Regex substitution applied to audited text.
#[derive(Debug, Clone)]
pub struct MaskPattern {
    regex: Regex,
    replacement: String,
}

impl MaskPattern {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    /// Masks the value of query parameter `name`, keeping the parameter itself.
    pub fn query_param(name: &str) -> Result<Self, regex::Error> {
        Self::new(
            &format!(r"([?&]{}=)[^&#\s]*", regex::escape(name)),
            "${1}<redacted>",
        )
    }

    fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.regex.replace_all(text, self.replacement.as_str())
    }
}

/// Literal secret substitutions plus regex patterns.
#[derive(Debug, Clone, Default)]
pub struct MaskRules {
    literals: Vec<(String, String)>,
    patterns: Vec<MaskPattern>,
}

impl MaskRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every occurrence of `secret` with `placeholder`. Empty secrets are ignored.
    pub fn with_literal(mut self, secret: impl Into<String>, placeholder: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.literals.push((secret, placeholder.into()));
            // longest first so a secret containing another one is masked whole
            self.literals
                .sort_by(|(left, _), (right, _)| right.len().cmp(&left.len()));
        }
        self
    }

    pub fn with_pattern(mut self, pattern: MaskPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = MaskPattern>) -> Self {
        self.patterns.extend(patterns);
        self
    }

    pub fn mask(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for (secret, placeholder) in &self.literals {
            if masked.contains(secret.as_str()) {
                masked = masked.replace(secret.as_str(), placeholder);
            }
        }
        for pattern in &self.patterns {
            if let Cow::Owned(replaced) = pattern.apply(&masked) {
                masked = replaced;
            }
        }
        masked
    }
}

/// Destination of audited calls.
pub trait ApiCallLogSink: Send + Sync {
    fn save(&self, record: ApiCallRecord);
}

/// Emits every record as a `debug` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingApiCallLog;

impl ApiCallLogSink for TracingApiCallLog {
    fn save(&self, record: ApiCallRecord) {
        debug!(
            account_id = %record.account_id,
            state_execution_id = %record.state_execution_id,
            method = %record.method,
            url = %record.url,
            retry_count = record.retry_count,
            response_code = ?record.response_code,
            "{}",
            record.title
        );
    }
}

/// Keeps records in memory, in save order.
#[derive(Debug, Default)]
pub struct InMemoryApiCallLog {
    records: Mutex<Vec<ApiCallRecord>>,
}

impl InMemoryApiCallLog {
    pub fn records(&self) -> Vec<ApiCallRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ApiCallLogSink for InMemoryApiCallLog {
    fn save(&self, record: ApiCallRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Hands its record to the sink when dropped, whatever path the attempt took.
pub(crate) struct AuditGuard<'a> {
    sink: &'a dyn ApiCallLogSink,
    record: Option<ApiCallRecord>,
}

impl<'a> AuditGuard<'a> {
    pub(crate) fn new(sink: &'a dyn ApiCallLogSink, record: ApiCallRecord) -> Self {
        Self {
            sink,
            record: Some(record),
        }
    }

    pub(crate) fn record(&mut self) -> Option<&mut ApiCallRecord> {
        self.record.as_mut()
    }
}

impl Drop for AuditGuard<'_> {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            self.sink.save(record);
        }
    }
}
