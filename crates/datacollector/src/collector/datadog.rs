// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Datadog metrics query collector (`/api/v1/query`).

use super::{join_url, CollectionInfo, DataCollector, ExecutionContext, SecretLookup, Session};
use crate::api_call::MaskPattern;
use crate::error::CollectionError;
use crate::executor::HttpCall;
use crate::json_path::as_f64;
use crate::records::{merge_metric_records, MetricRecord};
use crate::template::TemplateVars;
use infra_resolver::{SecretManager, SecretValue};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.datadoghq.com";

const API_KEY_FIELD: &str = "api_key";
const APPLICATION_KEY_FIELD: &str = "application_key";

/// One metric query. `query` may reference `${host}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatadogMetricQuery {
    /// Name of the produced records
    pub metric_name: String,
    /// Value kind the query contributes, e.g. `"latency"`
    pub value_kind: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatadogCollectionInfo {
    pub collection: CollectionInfo,
    pub base_url: String,
    pub queries: Vec<DatadogMetricQuery>,
}

#[derive(Debug)]
pub struct DatadogCollector {
    session: Session,
    info: DatadogCollectionInfo,
    patterns: Vec<MaskPattern>,
    api_key: SecretValue,
    application_key: SecretValue,
}

impl DataCollector for DatadogCollector {
    type Info = DatadogCollectionInfo;
    type Record = MetricRecord;

    fn init(
        context: ExecutionContext,
        info: DatadogCollectionInfo,
        secrets: &dyn SecretManager,
    ) -> Result<Self, CollectionError> {
        let lookup =
            SecretLookup::decrypt(secrets, &info.collection.connector, &info.collection.scope)?;
        let api_key = lookup.require(API_KEY_FIELD)?.clone();
        let application_key = lookup.require(APPLICATION_KEY_FIELD)?.clone();
        let patterns = [API_KEY_FIELD, APPLICATION_KEY_FIELD]
            .into_iter()
            .map(MaskPattern::query_param)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CollectionError::InvalidConfig(err.to_string()))?;

        Ok(Self {
            session: Session::new(context, lookup, &patterns),
            info,
            patterns,
            api_key,
            application_key,
        })
    }

    fn mask_patterns(&self) -> &[MaskPattern] {
        &self.patterns
    }

    fn fetch_hosts(&self, hosts: &[String]) -> Result<Vec<MetricRecord>, CollectionError> {
        let mut records = Vec::new();
        for host in hosts {
            for query in &self.info.queries {
                records.extend(self.run_query(query, Some(host))?);
            }
        }
        Ok(self.finish(records))
    }

    fn fetch(&self) -> Result<Vec<MetricRecord>, CollectionError> {
        let mut records = Vec::new();
        for query in &self.info.queries {
            records.extend(self.run_query(query, None)?);
        }
        Ok(self.finish(records))
    }
}

impl DatadogCollector {
    fn run_query(
        &self,
        query: &DatadogMetricQuery,
        host: Option<&str>,
    ) -> Result<Vec<MetricRecord>, CollectionError> {
        let vars = match host {
            Some(host) => TemplateVars::new().with_host(host),
            None => TemplateVars::new(),
        };
        let url = self.query_url(&vars.render(&query.query)?);
        let response = self
            .session
            .call_json("Fetching metric data from Datadog", &HttpCall::get(url))?;

        let series = response
            .get("series")
            .and_then(Value::as_array)
            .ok_or_else(|| CollectionError::parse("Datadog response has no series array"))?;
        let mut records = Vec::new();
        for entry in series {
            let points = entry
                .get("pointlist")
                .and_then(Value::as_array)
                .ok_or_else(|| CollectionError::parse("Datadog series has no pointlist"))?;
            for point in points {
                let (Some(timestamp), Some(value)) = (
                    point.get(0).and_then(as_f64),
                    point.get(1).and_then(as_f64),
                ) else {
                    continue;
                };
                records.push(
                    MetricRecord::new(
                        host.unwrap_or_default(),
                        &self.info.collection.group_name,
                        &query.metric_name,
                        timestamp as i64,
                    )
                    .with_value(&query.value_kind, value),
                );
            }
        }
        debug!(
            account_id = %self.session.context.account_id,
            metric = %query.metric_name,
            points = records.len(),
            "Fetched Datadog series"
        );
        Ok(records)
    }

    /// Query text goes through percent-encoding so `{`, `:`, `,` and spaces survive.
    fn query_url(&self, query: &str) -> String {
        let window = &self.info.collection.window;
        format!(
            "{}?{}={}&{}={}&from={}&to={}&query={}",
            join_url(&self.info.base_url, "api/v1/query"),
            API_KEY_FIELD,
            urlencoding::encode(self.api_key.expose()),
            APPLICATION_KEY_FIELD,
            urlencoding::encode(self.application_key.expose()),
            window.start_seconds(),
            window.end_seconds(),
            urlencoding::encode(query),
        )
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

    fn info(base_url: &str) -> DatadogCollectionInfo {
        DatadogCollectionInfo {
            collection: collection_info(CollectionWindow::new(60_000, 240_000).unwrap()),
            base_url: base_url.to_string(),
            queries: vec![
                DatadogMetricQuery {
                    metric_name: "checkout".to_string(),
                    value_kind: "latency".to_string(),
                    query: "avg:trace.servlet.request.duration{host:${host}}".to_string(),
                },
                DatadogMetricQuery {
                    metric_name: "checkout".to_string(),
                    value_kind: "error_rate".to_string(),
                    query: "sum:trace.servlet.request.errors{host:${host}}.as_rate()".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_query_results_are_merged_and_masked() {
        let mut server = mockito::Server::new();
        let latency = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api_key".into(), "dd-api-key".into()),
                Matcher::UrlEncoded(
                    "query".into(),
                    "avg:trace.servlet.request.duration{host:web-1}".into(),
                ),
                Matcher::UrlEncoded("from".into(), "60".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({ "series": [{ "pointlist": [[60_000.0, 12.5], [120_000.0, null], [300_000.0, 9.0]] }] })
                    .to_string(),
            )
            .create();
        let errors = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "sum:trace.servlet.request.errors{host:web-1}.as_rate()".into(),
            ))
            .with_status(200)
            .with_body(json!({ "series": [{ "pointlist": [[60_000.0, 0.02]] }] }).to_string())
            .create();

        let (context, log) = context();
        let collector = DatadogCollector::init(
            context,
            info(&server.url()),
            &secrets(&[(API_KEY_FIELD, "dd-api-key"), (APPLICATION_KEY_FIELD, "dd-app-key")]),
        )
        .unwrap();
        let records = collector.fetch_hosts(&["web-1".to_string()]).unwrap();

        latency.assert();
        errors.assert();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].host, "web-1");
        assert_eq!(records[0].timestamp, 60_000);
        assert_eq!(records[0].values["latency"], 12.5);
        assert_eq!(records[0].values["error_rate"], 0.02);

        assert_eq!(collector.mask_patterns().len(), 2);
        for record in log.records() {
            assert!(!record.url.contains("dd-api-key"), "{}", record.url);
            assert!(!record.url.contains("dd-app-key"), "{}", record.url);
        }
    }

    #[test]
    fn test_account_wide_fetch_rejects_host_queries() {
        let (context, _) = context();
        let collector = DatadogCollector::init(
            context,
            info("http://localhost:1"),
            &secrets(&[(API_KEY_FIELD, "a"), (APPLICATION_KEY_FIELD, "b")]),
        )
        .unwrap();
        assert!(matches!(
            collector.fetch(),
            Err(CollectionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_keys_are_required() {
        let (context, _) = context();
        let err = DatadogCollector::init(
            context,
            info("http://localhost:1"),
            &secrets(&[(API_KEY_FIELD, "a")]),
        )
        .unwrap_err();
        assert!(matches!(err, CollectionError::InvalidConfig(_)));
    }
}
