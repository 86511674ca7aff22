// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Vendor data collection for continuous verification.
//!
//! [`executor::RequestExecutor`] sends every vendor call, retries transient failures
//! with jittered back-off (longer on rate limits) and hands one masked
//! [`api_call::ApiCallRecord`] per attempt to an [`api_call::ApiCallLogSink`].
//! Collectors in [`collector`] turn vendor responses into [`records::MetricRecord`]
//! and [`records::LogRecord`] values for a [`records::CollectionWindow`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod api_call;
pub mod collector;
pub mod config;
pub mod error;
pub mod executor;
pub mod json_path;
pub mod records;
pub mod retry;
pub mod template;

pub use api_call::{
    ApiCallLogSink, ApiCallRecord, InMemoryApiCallLog, MaskPattern, MaskRules, TracingApiCallLog,
};
pub use collector::{
    collect_hosts, CollectionInfo, DataCollector, ExecutionContext, SecretLookup,
};
pub use config::CollectorConfig;
pub use error::CollectionError;
pub use executor::{
    HttpCall, HttpMethod, HttpResponse, HttpTransport, RequestExecutor, ReqwestTransport,
};
pub use json_path::JsonPath;
pub use records::{
    merge_metric_records, CollectionWindow, LogRecord, MetricRecord, TimestampFormat,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use template::TemplateVars;
