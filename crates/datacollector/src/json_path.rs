// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dotted field references into vendor JSON.
//!
//! `hits.hits[*]._source.host`, `series[0].pointlist` and `[1]` are all valid.
//! Paths without wildcards are resolved through [`serde_json::Value::pointer`].

use crate::error::CollectionError;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

#[derive(Clone, PartialEq, Eq)]
pub struct JsonPath {
    source: String,
    segments: Vec<Segment>,
    pointer: Option<String>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self, CollectionError> {
        let trimmed = path.trim();
        let body = trimmed
            .strip_prefix("$.")
            .or_else(|| trimmed.strip_prefix('$'))
            .unwrap_or(trimmed);

        let mut segments = Vec::new();
        for token in body.split('.').filter(|token| !token.is_empty()) {
            parse_token(token, path, &mut segments)?;
        }

        let pointer = if segments.iter().any(|segment| *segment == Segment::Wildcard) {
            None
        } else {
            Some(to_pointer(&segments))
        };
        Ok(Self {
            source: path.to_string(),
            segments,
            pointer,
        })
    }

    pub fn has_wildcard(&self) -> bool {
        self.pointer.is_none()
    }

    /// Every value addressed by the path, in document order.
    pub fn select<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        if let Some(pointer) = &self.pointer {
            return root.pointer(pointer).into_iter().collect();
        }

        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match segment {
                    Segment::Key(key) => next.extend(value.get(key.as_str())),
                    Segment::Index(index) => next.extend(value.get(*index)),
                    Segment::Wildcard => match value {
                        Value::Array(items) => next.extend(items.iter()),
                        Value::Object(entries) => next.extend(entries.values()),
                        _ => {}
                    },
                }
            }
            current = next;
        }
        current
    }

    /// First value addressed by the path, if any.
    pub fn first<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        match &self.pointer {
            Some(pointer) => root.pointer(pointer),
            None => self.select(root).into_iter().next(),
        }
    }

    /// Like [`JsonPath::first`] but fails with a parse error naming the path.
    pub fn required<'a>(&self, root: &'a Value) -> Result<&'a Value, CollectionError> {
        self.first(root)
            .ok_or_else(|| CollectionError::Parse(format!("no value at '{}'", self.source)))
    }
}

fn parse_token(
    token: &str,
    path: &str,
    segments: &mut Vec<Segment>,
) -> Result<(), CollectionError> {
    let invalid = || CollectionError::InvalidConfig(format!("invalid json path '{path}'"));

    let (key, mut rest) = match token.find('[') {
        Some(open) => token.split_at(open),
        None => (token, ""),
    };
    if !key.is_empty() {
        segments.push(Segment::Key(key.to_string()));
    }
    while !rest.is_empty() {
        let inner_end = rest.find(']').ok_or_else(invalid)?;
        if !rest.starts_with('[') {
            return Err(invalid());
        }
        let inner = rest[1..inner_end].trim();
        if inner == "*" {
            segments.push(Segment::Wildcard);
        } else {
            segments.push(Segment::Index(inner.parse().map_err(|_| invalid())?));
        }
        rest = &rest[inner_end + 1..];
    }
    Ok(())
}

fn to_pointer(segments: &[Segment]) -> String {
    let mut pointer = String::new();
    for segment in segments {
        pointer.push('/');
        match segment {
            Segment::Key(key) => pointer.push_str(&key.replace('~', "~0").replace('/', "~1")),
            Segment::Index(index) => pointer.push_str(&index.to_string()),
            Segment::Wildcard => {}
        }
    }
    pointer
}

impl FromStr for JsonPath {
    type Err = CollectionError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        Self::parse(path)
    }
}

impl fmt::Debug for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonPath({})", self.source)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Reads a number that vendors sometimes send as a string.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Renders scalars as text; `null`, arrays and objects yield `None`.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
