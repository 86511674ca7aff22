// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector for user-described metric endpoints.
//!
//! Every metric definition is a request template plus a mapping from the JSON
//! response to records. Templates may use `${host}`, the window tokens and any
//! field of the decrypted connector.

use super::{join_url, CollectionInfo, DataCollector, ExecutionContext, SecretLookup, Session};
use crate::error::CollectionError;
use crate::executor::{HttpCall, HttpMethod};
use crate::json_path::{as_f64, as_text, JsonPath};
use crate::records::{merge_metric_records, MetricRecord, TimestampFormat};
use crate::template::TemplateVars;
use infra_resolver::SecretManager;
use std::collections::BTreeMap;
use tracing::debug;

/// Where records, values and timestamps sit in the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMapping {
    /// Selects the record elements, usually with a wildcard (`data[*]`)
    pub records_path: String,
    pub value_path: String,
    pub timestamp_path: String,
    /// When set, elements of other hosts are dropped
    pub host_path: Option<String>,
    pub timestamp_format: TimestampFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomMetricDefinition {
    pub metric_name: String,
    pub value_kind: String,
    pub method: HttpMethod,
    /// Path or absolute URL template
    pub url: String,
    pub body: Option<String>,
    pub response: ResponseMapping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomApmCollectionInfo {
    pub collection: CollectionInfo,
    pub base_url: String,
    pub headers: BTreeMap<String, String>,
    /// Query parameters added to every request
    pub options: BTreeMap<String, String>,
    pub metrics: Vec<CustomMetricDefinition>,
}

#[derive(Debug)]
struct CompiledMapping {
    records: JsonPath,
    value: JsonPath,
    timestamp: JsonPath,
    host: Option<JsonPath>,
}

impl CompiledMapping {
    fn compile(mapping: &ResponseMapping) -> Result<Self, CollectionError> {
        Ok(Self {
            records: JsonPath::parse(&mapping.records_path)?,
            value: JsonPath::parse(&mapping.value_path)?,
            timestamp: JsonPath::parse(&mapping.timestamp_path)?,
            host: mapping.host_path.as_deref().map(JsonPath::parse).transpose()?,
        })
    }
}

#[derive(Debug)]
pub struct CustomApmCollector {
    session: Session,
    info: CustomApmCollectionInfo,
    mappings: Vec<CompiledMapping>,
}

impl DataCollector for CustomApmCollector {
    type Info = CustomApmCollectionInfo;
    type Record = MetricRecord;

    fn init(
        context: ExecutionContext,
        info: CustomApmCollectionInfo,
        secrets: &dyn SecretManager,
    ) -> Result<Self, CollectionError> {
        let mappings = info
            .metrics
            .iter()
            .map(|metric| CompiledMapping::compile(&metric.response))
            .collect::<Result<Vec<_>, _>>()?;
        let lookup =
            SecretLookup::decrypt(secrets, &info.collection.connector, &info.collection.scope)?;
        Ok(Self {
            session: Session::new(context, lookup, &[]),
            info,
            mappings,
        })
    }

    fn fetch_hosts(&self, hosts: &[String]) -> Result<Vec<MetricRecord>, CollectionError> {
        let mut records = Vec::new();
        for host in hosts {
            for (metric, mapping) in self.info.metrics.iter().zip(&self.mappings) {
                records.extend(self.collect_metric(metric, mapping, Some(host))?);
            }
        }
        Ok(self.finish(records))
    }

    fn fetch(&self) -> Result<Vec<MetricRecord>, CollectionError> {
        let mut records = Vec::new();
        for (metric, mapping) in self.info.metrics.iter().zip(&self.mappings) {
            records.extend(self.collect_metric(metric, mapping, None)?);
        }
        Ok(self.finish(records))
    }
}

impl CustomApmCollector {
    fn vars(&self, host: Option<&str>) -> TemplateVars {
        let vars = TemplateVars::new().with_window(&self.info.collection.window);
        let vars = match host {
            Some(host) => vars.with_host(host),
            None => vars,
        };
        self.session.secrets.extend_vars(vars)
    }

    fn build_call(
        &self,
        metric: &CustomMetricDefinition,
        vars: &TemplateVars,
    ) -> Result<HttpCall, CollectionError> {
        let target = vars.render_url(&metric.url)?;
        let mut url = if target.starts_with("http://") || target.starts_with("https://") {
            target
        } else {
            join_url(&self.info.base_url, &target)
        };
        if !self.info.options.is_empty() {
            let mut query = Vec::with_capacity(self.info.options.len());
            for (name, value) in &self.info.options {
                query.push(format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(&vars.render(value)?)
                ));
            }
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{separator}{}", query.join("&"));
        }

        let mut call = match metric.method {
            HttpMethod::Get => HttpCall::get(url),
            HttpMethod::Post => {
                let body = metric
                    .body
                    .as_deref()
                    .map(|body| vars.render(body))
                    .transpose()?
                    .unwrap_or_default();
                HttpCall::post(url, body)
            }
        };
        for (name, value) in &self.info.headers {
            call = call.header(name, vars.render(value)?);
        }
        Ok(call)
    }

    fn collect_metric(
        &self,
        metric: &CustomMetricDefinition,
        mapping: &CompiledMapping,
        host: Option<&str>,
    ) -> Result<Vec<MetricRecord>, CollectionError> {
        let call = self.build_call(metric, &self.vars(host))?;
        let response = self
            .session
            .call_json("Fetching metric data from custom APM", &call)?;

        let mut records = Vec::new();
        for element in mapping.records.select(&response) {
            let element_host = match &mapping.host {
                Some(path) => match path.first(element).and_then(as_text) {
                    Some(found) => found,
                    None => continue,
                },
                None => host.unwrap_or_default().to_string(),
            };
            if host.is_some_and(|host| host != element_host) {
                continue;
            }
            let Some(value) = mapping.value.first(element).and_then(as_f64) else {
                continue;
            };
            let timestamp = metric
                .response
                .timestamp_format
                .parse(mapping.timestamp.required(element)?)?;
            records.push(
                MetricRecord::new(
                    element_host,
                    &self.info.collection.group_name,
                    &metric.metric_name,
                    timestamp,
                )
                .with_value(&metric.value_kind, value),
            );
        }
        debug!(
            account_id = %self.session.context.account_id,
            metric = %metric.metric_name,
            records = records.len(),
            "Fetched custom APM metric"
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

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::records::CollectionWindow;
    use mockito::Matcher;
    use serde_json::json;

    fn mapping(host_path: Option<&str>) -> ResponseMapping {
        ResponseMapping {
            records_path: "data[*]".to_string(),
            value_path: "value".to_string(),
            timestamp_path: "ts".to_string(),
            host_path: host_path.map(str::to_string),
            timestamp_format: TimestampFormat::EpochSeconds,
        }
    }

    fn info(base_url: &str) -> CustomApmCollectionInfo {
        CustomApmCollectionInfo {
            collection: collection_info(CollectionWindow::new(100_000, 200_000).unwrap()),
            base_url: base_url.to_string(),
            headers: BTreeMap::from([("X-Api-Token".to_string(), "${api_token}".to_string())]),
            options: BTreeMap::from([("tenant".to_string(), "acme corp".to_string())]),
            metrics: vec![
                CustomMetricDefinition {
                    metric_name: "checkout".to_string(),
                    value_kind: "throughput".to_string(),
                    method: HttpMethod::Get,
                    url: "/metrics/${host}?from=${start_time_seconds}".to_string(),
                    body: None,
                    response: mapping(Some("host")),
                },
                CustomMetricDefinition {
                    metric_name: "checkout".to_string(),
                    value_kind: "latency".to_string(),
                    method: HttpMethod::Post,
                    url: "/query".to_string(),
                    body: Some(r#"{"host":"${host}","to":${end_time}}"#.to_string()),
                    response: mapping(None),
                },
            ],
        }
    }

    #[test]
    fn test_templated_requests_and_mapping() {
        let mut server = mockito::Server::new();
        let throughput = server
            .mock("GET", "/metrics/web-1")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("from".into(), "100".into()),
                Matcher::UrlEncoded("tenant".into(), "acme corp".into()),
            ]))
            .match_header("x-api-token", "t0ken")
            .with_status(200)
            .with_body(
                json!({ "data": [
                    { "host": "web-1", "ts": 120, "value": "4" },
                    { "host": "web-2", "ts": 120, "value": "9" },
                    { "host": "web-1", "ts": 900, "value": "1" }
                ] })
                .to_string(),
            )
            .create();
        let latency = server
            .mock("POST", "/query")
            .match_query(Matcher::UrlEncoded("tenant".into(), "acme corp".into()))
            .match_body(Matcher::Json(json!({ "host": "web-1", "to": 200_000 })))
            .with_status(200)
            .with_body(json!({ "data": [{ "ts": 120, "value": 87.5 }] }).to_string())
            .create();

        let (context, log) = context();
        let collector = CustomApmCollector::init(
            context,
            info(&server.url()),
            &secrets(&[("api_token", "t0ken")]),
        )
        .unwrap();
        let records = collector.fetch_hosts(&["web-1".to_string()]).unwrap();

        throughput.assert();
        latency.assert();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "web-1");
        assert_eq!(records[0].timestamp, 120_000);
        assert_eq!(records[0].values["throughput"], 4.0);
        assert_eq!(records[0].values["latency"], 87.5);
        assert_eq!(log.records().len(), 2);
    }

    #[test]
    fn test_invalid_mapping_path_fails_init() {
        let (context, _) = context();
        let mut info = info("http://localhost:1");
        info.metrics[0].response.value_path = "data[x]".to_string();
        let err = CustomApmCollector::init(context, info, &secrets(&[])).unwrap_err();
        assert!(matches!(err, CollectionError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_template_value_is_config_error() {
        let (context, _) = context();
        let collector =
            CustomApmCollector::init(context, info("http://localhost:1"), &secrets(&[])).unwrap();
        let err = collector.fetch_hosts(&["web-1".to_string()]).unwrap_err();
        assert_eq!(
            err,
            CollectionError::InvalidConfig("unresolved placeholders: api_token".to_string())
        );
    }
}
