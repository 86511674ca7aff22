// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::CollectionError;
use crate::json_path::as_f64;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// Normalized metric sample. `values` maps a value kind (`"throughput"`,
/// `"error_rate"`, ...) to its reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub host: String,
    pub group_name: String,
    pub name: String,
    /// Epoch millis
    pub timestamp: i64,
    pub values: BTreeMap<String, f64>,
}

impl MetricRecord {
    pub fn new(
        host: impl Into<String>,
        group_name: impl Into<String>,
        name: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            host: host.into(),
            group_name: group_name.into(),
            name: name.into(),
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, kind: impl Into<String>, value: f64) -> Self {
        self.values.insert(kind.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub host: String,
    pub group_name: String,
    pub message: String,
    /// Epoch millis
    pub timestamp: i64,
}

pub trait Timestamped {
    fn timestamp(&self) -> i64;
}

impl Timestamped for MetricRecord {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl Timestamped for LogRecord {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Inclusive `[start_millis, end_millis]` range a collection covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionWindow {
    pub start_millis: i64,
    pub end_millis: i64,
}

impl CollectionWindow {
    pub fn new(start_millis: i64, end_millis: i64) -> Result<Self, CollectionError> {
        if start_millis > end_millis {
            return Err(CollectionError::InvalidConfig(format!(
                "collection window starts at {start_millis} after it ends at {end_millis}"
            )));
        }
        Ok(Self {
            start_millis,
            end_millis,
        })
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        (self.start_millis..=self.end_millis).contains(&timestamp)
    }

    /// Drops records outside the window.
    pub fn retain<T: Timestamped>(&self, mut records: Vec<T>) -> Vec<T> {
        records.retain(|record| self.contains(record.timestamp()));
        records
    }

    pub fn start_seconds(&self) -> i64 {
        self.start_millis.div_euclid(1_000)
    }

    pub fn end_seconds(&self) -> i64 {
        self.end_millis.div_euclid(1_000)
    }
}

/// How a vendor encodes timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    EpochMillis,
    EpochSeconds,
    Rfc3339,
    /// chrono `strftime` pattern; values without an offset are read as UTC
    Pattern(String),
}

impl TimestampFormat {
    /// Converts `value` to epoch millis.
    pub fn parse(&self, value: &Value) -> Result<i64, CollectionError> {
        let invalid = || CollectionError::Parse(format!("invalid timestamp {value}"));
        match self {
            TimestampFormat::EpochMillis => as_f64(value).map(|millis| millis as i64).ok_or_else(invalid),
            TimestampFormat::EpochSeconds => as_f64(value)
                .map(|seconds| (seconds * 1_000.0).round() as i64)
                .ok_or_else(invalid),
            TimestampFormat::Rfc3339 => value
                .as_str()
                .and_then(|text| DateTime::parse_from_rfc3339(text.trim()).ok())
                .map(|timestamp| timestamp.timestamp_millis())
                .ok_or_else(invalid),
            TimestampFormat::Pattern(pattern) => {
                let text = value.as_str().ok_or_else(invalid)?.trim();
                if let Ok(timestamp) = DateTime::parse_from_str(text, pattern) {
                    return Ok(timestamp.timestamp_millis());
                }
                NaiveDateTime::parse_from_str(text, pattern)
                    .map(|timestamp| timestamp.and_utc().timestamp_millis())
                    .map_err(|_| invalid())
            }
        }
    }
}

/// Collapses records sharing (host, name, timestamp) into one record holding
/// every contributed value. Output keeps first-seen order; on conflicting value
/// kinds the later reading wins.
pub fn merge_metric_records(records: impl IntoIterator<Item = MetricRecord>) -> Vec<MetricRecord> {
    let mut merged: Vec<MetricRecord> = Vec::new();
    let mut positions: HashMap<(String, String, i64), usize> = HashMap::new();
    for record in records {
        let key = (record.host.clone(), record.name.clone(), record.timestamp);
        match positions.entry(key) {
            Entry::Occupied(position) => {
                let target = &mut merged[*position.get()];
                target.values.extend(record.values);
                if target.group_name.is_empty() {
                    target.group_name = record.group_name;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(record);
            }
        }
    }
    merged
}
