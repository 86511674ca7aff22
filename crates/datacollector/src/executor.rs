// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retrying, rate-limit aware HTTP execution shared by every collector.
//!
//! [`RequestExecutor::execute`] makes a single attempt. [`RequestExecutor::execute_audited`]
//! wraps each attempt in an [`ApiCallRecord`] that is saved exactly once, on
//! success and on failure, and waits between attempts according to the
//! executor's [`RetryPolicy`]. Waits block the calling thread.

use crate::api_call::{ApiCallLogSink, ApiCallRecord, AuditGuard, MaskRules};
use crate::config::CollectorConfig;
use crate::error::CollectionError;
use crate::retry::{RetryDecision, RetryPolicy};
use infra_resolver::SecretValue;
use std::fmt;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum HttpMethod {
    #[display("GET")]
    Get,
    #[display("POST")]
    Post,
}

/// A fully built request.
#[derive(Clone, PartialEq)]
pub struct HttpCall {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, SecretValue)>,
    pub body: Option<String>,
}

impl HttpCall {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![(
                "Content-Type".to_string(),
                SecretValue::new("application/json"),
            )],
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), SecretValue::new(value)));
        self
    }
}

impl fmt::Debug for HttpCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("HttpCall")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("body_len", &self.body.as_ref().map(String::len))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Sends one request. Only failures to obtain a response are errors; status
/// codes are classified by the executor.
pub trait HttpTransport: Send + Sync {
    fn send(&self, call: &HttpCall) -> Result<HttpResponse, CollectionError>;
}

/// Blocking reqwest transport with the configured timeout and proxy.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(config: &CollectorConfig) -> Result<Self, CollectionError> {
        let mut builder = reqwest::blocking::Client::builder().timeout(config.request_timeout);
        if let Some(proxy) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(proxy).map_err(|err| {
                CollectionError::InvalidConfig(format!("invalid HTTPS proxy: {err}"))
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|err| {
            CollectionError::InvalidConfig(format!("failed to build HTTP client: {err}"))
        })?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, call: &HttpCall) -> Result<HttpResponse, CollectionError> {
        let mut request = match call.method {
            HttpMethod::Get => self.client.get(&call.url),
            HttpMethod::Post => self.client.post(&call.url),
        };
        for (name, value) in &call.headers {
            request = request.header(name.as_str(), value.expose());
        }
        if let Some(body) = &call.body {
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .map_err(|err| CollectionError::Transport(err.without_url().to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| CollectionError::Transport(err.without_url().to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

/// Shared executor. Holds no per-call state and may be used from many threads.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    sink: Arc<dyn ApiCallLogSink>,
    policy: RetryPolicy,
    rate_limit_status_codes: Vec<u16>,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("policy", &self.policy)
            .field("rate_limit_status_codes", &self.rate_limit_status_codes)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        sink: Arc<dyn ApiCallLogSink>,
        config: &CollectorConfig,
    ) -> Result<Self, CollectionError> {
        config.validate()?;
        Ok(Self {
            transport,
            sink,
            policy: RetryPolicy::from(config),
            rate_limit_status_codes: config.rate_limit_status_codes.clone(),
        })
    }

    /// Executor backed by [`ReqwestTransport`].
    pub fn from_config(
        config: &CollectorConfig,
        sink: Arc<dyn ApiCallLogSink>,
    ) -> Result<Self, CollectionError> {
        let transport = ReqwestTransport::new(config)?;
        Self::new(Arc::new(transport), sink, config)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Single attempt without auditing. Non-2xx answers are errors.
    pub fn execute(&self, call: &HttpCall) -> Result<String, CollectionError> {
        let response = self.transport.send(call)?;
        self.classify(response)
    }

    /// Audited call retried according to the executor's policy.
    pub fn execute_audited(
        &self,
        call: &HttpCall,
        template: &ApiCallRecord,
        masks: &MaskRules,
    ) -> Result<String, CollectionError> {
        self.execute_with_policy(call, template, masks, &self.policy)
    }

    /// Audited call attempted once; used for requests that are not worth retrying.
    pub fn execute_best_effort(
        &self,
        call: &HttpCall,
        template: &ApiCallRecord,
        masks: &MaskRules,
    ) -> Result<String, CollectionError> {
        self.execute_with_policy(call, template, masks, &RetryPolicy::single_attempt())
    }

    fn execute_with_policy(
        &self,
        call: &HttpCall,
        template: &ApiCallRecord,
        masks: &MaskRules,
        policy: &RetryPolicy,
    ) -> Result<String, CollectionError> {
        let masked_url = masks.mask(&call.url);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = self.attempt(call, template, masks, attempt - 1);
            let error = match result {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            match policy.next_action(attempt, &error) {
                RetryDecision::RetryAfter(wait) => {
                    warn!(
                        account_id = %template.account_id,
                        url = %masked_url,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Data collection request failed, retrying: {}",
                        masks.mask(&error.to_string())
                    );
                    thread::sleep(wait);
                }
                RetryDecision::Fail if error.is_retryable() && policy.max_attempts() > 1 => {
                    error!(
                        account_id = %template.account_id,
                        url = %masked_url,
                        attempts = attempt,
                        "Data collection request failed after all retries"
                    );
                    return Err(CollectionError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(error),
                    });
                }
                RetryDecision::Fail => return Err(error),
            }
        }
    }

    fn attempt(
        &self,
        call: &HttpCall,
        template: &ApiCallRecord,
        masks: &MaskRules,
        retry_count: u32,
    ) -> Result<String, CollectionError> {
        let mut record = template.clone();
        record.request_timestamp = chrono::Utc::now().timestamp_millis();
        record.method = call.method.to_string();
        record.url = masks.mask(&call.url);
        record.request_body = call.body.as_deref().map(|body| masks.mask(body));
        record.retry_count = retry_count;
        let mut guard = AuditGuard::new(self.sink.as_ref(), record);

        debug!(
            account_id = %template.account_id,
            method = %call.method,
            url = %masks.mask(&call.url),
            retry_count,
            "Sending data collection request"
        );
        let response = self.transport.send(call);

        if let Some(record) = guard.record() {
            record.response_timestamp = Some(chrono::Utc::now().timestamp_millis());
            match &response {
                Ok(response) => {
                    record.response_code = Some(response.status);
                    record.response_body = Some(masks.mask(&response.body));
                }
                Err(error) => record.response_body = Some(masks.mask(&error.to_string())),
            }
        }

        self.classify(response?)
    }

    fn classify(&self, response: HttpResponse) -> Result<String, CollectionError> {
        match response.status {
            200..=299 => Ok(response.body),
            status if self.rate_limit_status_codes.contains(&status) => {
                Err(CollectionError::RateLimited {
                    status,
                    body: response.body,
                })
            }
            status => Err(CollectionError::Status {
                status,
                body: response.body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_call::{InMemoryApiCallLog, MaskPattern};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_test::traced_test;

    /// Replays scripted responses; repeats the last one when the script runs out.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, CollectionError>>>,
        calls: Mutex<Vec<HttpCall>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse, CollectionError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn send(&self, call: &HttpCall) -> Result<HttpResponse, CollectionError> {
            self.calls.lock().unwrap().push(call.clone());
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            }
        }
    }

    fn ok(body: &str) -> Result<HttpResponse, CollectionError> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn status(status: u16) -> Result<HttpResponse, CollectionError> {
        Ok(HttpResponse {
            status,
            body: format!("status {status}"),
        })
    }

    fn fast_config() -> CollectorConfig {
        CollectorConfig {
            retry_sleep: Duration::ZERO,
            rate_limit_sleep: Duration::ZERO,
            jitter_unit: Duration::ZERO,
            ..Default::default()
        }
    }

    fn executor(
        transport: Arc<ScriptedTransport>,
    ) -> (RequestExecutor, Arc<InMemoryApiCallLog>) {
        let log = Arc::new(InMemoryApiCallLog::default());
        let executor = RequestExecutor::new(transport, log.clone(), &fast_config()).unwrap();
        (executor, log)
    }

    fn template() -> ApiCallRecord {
        ApiCallRecord::new("acct", "exec-1", "Fetching metrics")
    }

    #[test]
    fn test_execute_single_attempt() {
        let transport = ScriptedTransport::new(vec![status(500)]);
        let (executor, log) = executor(transport.clone());

        let err = executor.execute(&HttpCall::get("http://vendor/api")).unwrap_err();
        assert!(matches!(err, CollectionError::Status { status: 500, .. }));
        assert_eq!(transport.calls(), 1);
        assert!(log.records().is_empty());
    }

    #[test]
    fn test_always_failing_call_is_attempted_max_retries_plus_one_times() {
        let transport = ScriptedTransport::new(vec![status(503)]);
        let (executor, log) = executor(transport.clone());

        let err = executor
            .execute_audited(&HttpCall::get("http://vendor/api"), &template(), &MaskRules::new())
            .unwrap_err();

        assert!(matches!(err, CollectionError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(transport.calls(), 4);
        let records = log.records();
        assert_eq!(records.len(), 4);
        let retry_counts: Vec<u32> = records.iter().map(|record| record.retry_count).collect();
        assert_eq!(retry_counts, vec![0, 1, 2, 3]);
        assert!(records.iter().all(|record| record.response_code == Some(503)));
    }

    #[test]
    #[traced_test]
    fn test_rate_limit_then_success() {
        let transport = ScriptedTransport::new(vec![status(429), ok("{\"series\":[]}")]);
        let (executor, log) = executor(transport.clone());

        let body = executor
            .execute_audited(&HttpCall::get("http://vendor/api"), &template(), &MaskRules::new())
            .unwrap();

        assert_eq!(body, "{\"series\":[]}");
        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].response_code, Some(429));
        assert_eq!(records[1].response_code, Some(200));
        assert!(records[1].response_timestamp.is_some());
        assert!(logs_contain("retrying"));
    }

    #[test]
    fn test_transport_errors_are_audited() {
        let transport = ScriptedTransport::new(vec![
            Err(CollectionError::Transport("connection refused".to_string())),
            ok("[]"),
        ]);
        let (executor, log) = executor(transport);

        executor
            .execute_audited(&HttpCall::get("http://vendor/api"), &template(), &MaskRules::new())
            .unwrap();
        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].response_code, None);
        assert_eq!(
            records[0].response_body.as_deref(),
            Some("transport error: connection refused")
        );
    }

    #[test]
    fn test_best_effort_does_not_retry() {
        let transport = ScriptedTransport::new(vec![status(500)]);
        let (executor, log) = executor(transport.clone());

        let err = executor
            .execute_best_effort(&HttpCall::get("http://vendor/api"), &template(), &MaskRules::new())
            .unwrap_err();
        assert!(matches!(err, CollectionError::Status { status: 500, .. }));
        assert_eq!(transport.calls(), 1);
        assert_eq!(log.records().len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_records_and_logs_are_masked() {
        let transport = ScriptedTransport::new(vec![status(500), ok("token=s3cr3t")]);
        let (executor, log) = executor(transport);
        let masks = MaskRules::new()
            .with_literal("s3cr3t", "<password>")
            .with_pattern(MaskPattern::query_param("api_key").unwrap());
        let call = HttpCall::post(
            "http://vendor/api?api_key=abc123",
            "{\"password\":\"s3cr3t\"}",
        );

        executor.execute_audited(&call, &template(), &masks).unwrap();

        for record in log.records() {
            assert_eq!(record.url, "http://vendor/api?api_key=<redacted>");
            assert_eq!(
                record.request_body.as_deref(),
                Some("{\"password\":\"<password>\"}")
            );
            assert!(!record.response_body.unwrap_or_default().contains("s3cr3t"));
        }
        assert!(!logs_contain("abc123"));
        assert!(!logs_contain("s3cr3t"));
    }

    #[test]
    fn test_call_debug_hides_header_values() {
        let call = HttpCall::get("http://vendor/api").header("Authorization", "Basic dXNlcjpwdw==");
        let rendered = format!("{call:?}");
        assert!(rendered.contains("Authorization"));
        assert!(!rendered.contains("dXNlcjpwdw=="));
    }
}
