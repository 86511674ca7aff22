// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! New Relic REST v2 collector.
//!
//! Hosts are mapped to application instance ids through the paginated
//! `instances.json` listing, then metric timeslices are read per instance.
//! Metric names are requested in batches; names outside the plain character set
//! are sent alone and on a best-effort basis, since New Relic rejects the whole
//! batch when one of them is unknown.

use super::{join_url, CollectionInfo, DataCollector, ExecutionContext, SecretLookup, Session};
use crate::error::CollectionError;
use crate::executor::HttpCall;
use crate::json_path::as_f64;
use crate::records::{merge_metric_records, MetricRecord, TimestampFormat};
use chrono::{DateTime, SecondsFormat};
use infra_resolver::{SecretManager, SecretValue};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const DEFAULT_URL: &str = "https://api.newrelic.com";
pub const DEFAULT_METRIC_BATCH_SIZE: usize = 30;
pub const HOST_BATCH_SIZE: usize = 10;

const API_KEY_FIELD: &str = "api_key";
const MAX_INSTANCE_PAGES: u32 = 100;

#[allow(clippy::unwrap_used)]
fn standard_name_regex() -> &'static Regex {
    static STANDARD_NAME: OnceLock<Regex> = OnceLock::new();
    STANDARD_NAME.get_or_init(|| Regex::new(r"^[A-Za-z0-9/_.:\- ]+$").unwrap())
}

/// One value of one New Relic metric, e.g. `HttpDispatcher` / `average_call_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelicMetric {
    pub name: String,
    pub value_name: String,
    /// Key the reading is stored under in [`MetricRecord::values`]
    pub value_kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelicCollectionInfo {
    pub collection: CollectionInfo,
    pub url: String,
    pub application_id: String,
    pub metrics: Vec<NewRelicMetric>,
    pub metric_batch_size: usize,
}

#[derive(Debug)]
pub struct NewRelicCollector {
    session: Session,
    info: NewRelicCollectionInfo,
    api_key: SecretValue,
    /// Standard names chunked by the batch size, then odd names one per batch
    batches: Vec<NameBatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NameBatch {
    names: Vec<String>,
    best_effort: bool,
}

impl DataCollector for NewRelicCollector {
    type Info = NewRelicCollectionInfo;
    type Record = MetricRecord;

    fn init(
        context: ExecutionContext,
        info: NewRelicCollectionInfo,
        secrets: &dyn SecretManager,
    ) -> Result<Self, CollectionError> {
        if info.metric_batch_size == 0 {
            return Err(CollectionError::InvalidConfig(
                "metric batch size must be greater than 0".to_string(),
            ));
        }
        let lookup =
            SecretLookup::decrypt(secrets, &info.collection.connector, &info.collection.scope)?;
        let api_key = lookup.require(API_KEY_FIELD)?.clone();
        Ok(Self {
            batches: name_batches(&info.metrics, info.metric_batch_size),
            session: Session::new(context, lookup, &[]),
            api_key,
            info,
        })
    }

    fn host_batch_size(&self) -> usize {
        HOST_BATCH_SIZE
    }

    fn fetch_hosts(&self, hosts: &[String]) -> Result<Vec<MetricRecord>, CollectionError> {
        let instances = self.instances()?;
        let mut records = Vec::new();
        for host in hosts {
            let Some(instance_id) = instances.get(host) else {
                warn!(
                    account_id = %self.session.context.account_id,
                    application_id = %self.info.application_id,
                    host = %host,
                    "No New Relic instance found for host"
                );
                continue;
            };
            let path = format!(
                "v2/applications/{}/instances/{instance_id}/metrics/data.json",
                self.info.application_id
            );
            records.extend(self.metric_data(&path, host)?);
        }
        Ok(self.finish(records))
    }

    fn fetch(&self) -> Result<Vec<MetricRecord>, CollectionError> {
        let path = format!("v2/applications/{}/metrics/data.json", self.info.application_id);
        let records = self.metric_data(&path, "")?;
        Ok(self.finish(records))
    }
}

impl NewRelicCollector {
    fn get(&self, url: String) -> HttpCall {
        HttpCall::get(url).header("X-Api-Key", self.api_key.expose())
    }

    /// Host name to instance id, across every page of the listing.
    fn instances(&self) -> Result<BTreeMap<String, i64>, CollectionError> {
        let base = join_url(
            &self.info.url,
            &format!("v2/applications/{}/instances.json", self.info.application_id),
        );
        let mut instances = BTreeMap::new();
        for page in 1..=MAX_INSTANCE_PAGES {
            let response = self.session.call_json(
                "Fetching New Relic application instances",
                &self.get(format!("{base}?page={page}")),
            )?;
            let listed = response
                .get("application_instances")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    CollectionError::parse("New Relic response has no application_instances array")
                })?;
            if listed.is_empty() {
                break;
            }
            for instance in listed {
                if let (Some(host), Some(id)) = (
                    instance.get("host").and_then(Value::as_str),
                    instance.get("id").and_then(Value::as_i64),
                ) {
                    instances.entry(host.to_string()).or_insert(id);
                }
            }
        }
        debug!(
            application_id = %self.info.application_id,
            instances = instances.len(),
            "Listed New Relic instances"
        );
        Ok(instances)
    }

    fn metric_data(&self, path: &str, host: &str) -> Result<Vec<MetricRecord>, CollectionError> {
        let window = &self.info.collection.window;
        let from = rfc3339(window.start_millis)?;
        let to = rfc3339(window.end_millis)?;
        let base = join_url(&self.info.url, path);

        let mut records = Vec::new();
        for batch in &self.batches {
            let url = format!(
                "{base}?{}&{}&from={}&to={}",
                repeated("names[]", batch.names.iter().map(String::as_str)),
                repeated("values[]", self.value_names(batch)),
                urlencoding::encode(&from),
                urlencoding::encode(&to),
            );
            let title = "Fetching metric data from New Relic";
            let response = if batch.best_effort {
                match self.session.call_json_best_effort(title, &self.get(url)) {
                    Some(response) => response,
                    None => continue,
                }
            } else {
                self.session.call_json(title, &self.get(url))?
            };
            records.extend(self.to_records(&response, host)?);
        }
        Ok(records)
    }

    fn value_names<'a>(&'a self, batch: &NameBatch) -> impl Iterator<Item = &'a str> {
        let names: BTreeSet<&str> = self
            .info
            .metrics
            .iter()
            .filter(|metric| batch.names.contains(&metric.name))
            .map(|metric| metric.value_name.as_str())
            .collect();
        names.into_iter()
    }

    fn to_records(&self, response: &Value, host: &str) -> Result<Vec<MetricRecord>, CollectionError> {
        let metrics = response
            .pointer("/metric_data/metrics")
            .and_then(Value::as_array)
            .ok_or_else(|| CollectionError::parse("New Relic response has no metric_data.metrics array"))?;
        let mut records = Vec::new();
        for metric in metrics {
            let Some(name) = metric.get("name").and_then(Value::as_str) else {
                continue;
            };
            let Some(timeslices) = metric.get("timeslices").and_then(Value::as_array) else {
                continue;
            };
            for timeslice in timeslices {
                let timestamp = TimestampFormat::Rfc3339.parse(
                    timeslice
                        .get("from")
                        .ok_or_else(|| CollectionError::parse("timeslice has no 'from'"))?,
                )?;
                let mut record = MetricRecord::new(
                    host,
                    &self.info.collection.group_name,
                    name,
                    timestamp,
                );
                for wanted in self.info.metrics.iter().filter(|wanted| wanted.name == name) {
                    if let Some(value) = timeslice
                        .get("values")
                        .and_then(|values| values.get(&wanted.value_name))
                        .and_then(as_f64)
                    {
                        record = record.with_value(&wanted.value_kind, value);
                    }
                }
                if !record.values.is_empty() {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    fn finish(&self, records: Vec<MetricRecord>) -> Vec<MetricRecord> {
        self.info
            .collection
            .window
            .retain(merge_metric_records(records))
    }
}

fn name_batches(metrics: &[NewRelicMetric], batch_size: usize) -> Vec<NameBatch> {
    let names: BTreeSet<&str> = metrics.iter().map(|metric| metric.name.as_str()).collect();
    let (standard, odd): (Vec<&str>, Vec<&str>) = names
        .into_iter()
        .partition(|name| standard_name_regex().is_match(name));

    let mut batches: Vec<NameBatch> = standard
        .chunks(batch_size)
        .map(|chunk| NameBatch {
            names: chunk.iter().map(|name| name.to_string()).collect(),
            best_effort: false,
        })
        .collect();
    batches.extend(odd.into_iter().map(|name| NameBatch {
        names: vec![name.to_string()],
        best_effort: true,
    }));
    batches
}

fn repeated<'a>(key: &str, values: impl Iterator<Item = &'a str>) -> String {
    values
        .map(|value| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn rfc3339(millis: i64) -> Result<String, CollectionError> {
    DateTime::from_timestamp_millis(millis)
        .map(|timestamp| timestamp.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| CollectionError::InvalidConfig(format!("timestamp {millis} is out of range")))
}
