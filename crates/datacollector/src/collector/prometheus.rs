// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{join_url, CollectionInfo, DataCollector, ExecutionContext, SecretLookup, Session};
use crate::error::CollectionError;
use crate::executor::HttpCall;
use crate::json_path::as_f64;
use crate::records::{merge_metric_records, MetricRecord, TimestampFormat};
use crate::template::TemplateVars;
use infra_resolver::SecretManager;
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_STEP_SECONDS: u64 = 60;

const BEARER_TOKEN_FIELD: &str = "bearer_token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrometheusMetricQuery {
    pub metric_name: String,
    pub value_kind: String,
    /// PromQL expression; may reference `${host}`
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrometheusCollectionInfo {
    pub collection: CollectionInfo,
    pub url: String,
    pub queries: Vec<PrometheusMetricQuery>,
    pub step_seconds: u64,
}

/// Collects range vectors from `/api/v1/query_range`. The connector may carry a
/// `bearer_token` field; without it requests are unauthenticated.
#[derive(Debug)]
pub struct PrometheusCollector {
    session: Session,
    info: PrometheusCollectionInfo,
}

impl DataCollector for PrometheusCollector {
    type Info = PrometheusCollectionInfo;
    type Record = MetricRecord;

    fn init(
        context: ExecutionContext,
        info: PrometheusCollectionInfo,
        secrets: &dyn SecretManager,
    ) -> Result<Self, CollectionError> {
        if info.step_seconds == 0 {
            return Err(CollectionError::InvalidConfig(
                "step must be greater than 0".to_string(),
            ));
        }
        let lookup =
            SecretLookup::decrypt(secrets, &info.collection.connector, &info.collection.scope)?;
        Ok(Self {
            session: Session::new(context, lookup, &[]),
            info,
        })
    }

    fn fetch_hosts(&self, hosts: &[String]) -> Result<Vec<MetricRecord>, CollectionError> {
        let mut records = Vec::new();
        for host in hosts {
            for query in &self.info.queries {
                records.extend(self.query_range(query, Some(host))?);
            }
        }
        Ok(self.finish(records))
    }

    fn fetch(&self) -> Result<Vec<MetricRecord>, CollectionError> {
        let mut records = Vec::new();
        for query in &self.info.queries {
            records.extend(self.query_range(query, None)?);
        }
        Ok(self.finish(records))
    }
}

impl PrometheusCollector {
    fn query_range(
        &self,
        query: &PrometheusMetricQuery,
        host: Option<&str>,
    ) -> Result<Vec<MetricRecord>, CollectionError> {
        let vars = match host {
            Some(host) => TemplateVars::new().with_host(host),
            None => TemplateVars::new(),
        };
        let expression = vars.render(&query.query)?;
        let window = &self.info.collection.window;
        let url = format!(
            "{}?query={}&start={}&end={}&step={}",
            join_url(&self.info.url, "api/v1/query_range"),
            urlencoding::encode(&expression),
            window.start_seconds(),
            window.end_seconds(),
            self.info.step_seconds,
        );
        let mut call = HttpCall::get(url);
        if let Some(token) = self.session.secrets.get(BEARER_TOKEN_FIELD) {
            call = call.header("Authorization", format!("Bearer {}", token.expose()));
        }
        let response = self
            .session
            .call_json("Fetching metric data from Prometheus", &call)?;

        if response.get("status").and_then(Value::as_str) != Some("success") {
            let error = response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(CollectionError::Parse(format!("Prometheus query failed: {error}")));
        }
        let series = response
            .pointer("/data/result")
            .and_then(Value::as_array)
            .ok_or_else(|| CollectionError::parse("Prometheus response has no data.result array"))?;

        let mut records = Vec::new();
        for entry in series {
            let Some(values) = entry.get("values").and_then(Value::as_array) else {
                continue;
            };
            for sample in values {
                let (Some(timestamp), Some(value)) = (sample.get(0), sample.get(1).and_then(as_f64))
                else {
                    continue;
                };
                // "NaN" and "+Inf" are valid sample values but not readings
                if !value.is_finite() {
                    continue;
                }
                records.push(
                    MetricRecord::new(
                        host.unwrap_or_default(),
                        &self.info.collection.group_name,
                        &query.metric_name,
                        TimestampFormat::EpochSeconds.parse(timestamp)?,
                    )
                    .with_value(&query.value_kind, value),
                );
            }
        }
        debug!(
            account_id = %self.session.context.account_id,
            metric = %query.metric_name,
            samples = records.len(),
            "Fetched Prometheus range"
        );
        Ok(records)
    }

    fn finish(&self, records: Vec<MetricRecord>) -> Vec<MetricRecord> {
        self.info
            .collection
            .window
            .retain(merge_metric_records(records))
    }
}
