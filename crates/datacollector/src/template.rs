// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `${token}` substitution for vendor URLs, bodies and headers.

use crate::error::CollectionError;
use crate::records::CollectionWindow;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const HOST: &str = "host";
pub const START_TIME: &str = "start_time";
pub const END_TIME: &str = "end_time";
pub const START_TIME_SECONDS: &str = "start_time_seconds";
pub const END_TIME_SECONDS: &str = "end_time_seconds";

#[allow(clippy::unwrap_used)]
fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\$\{([^}\s]+)\}").unwrap())
}

/// Values available to a template.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    values: BTreeMap<String, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_host(self, host: &str) -> Self {
        self.with(HOST, host)
    }

    /// Adds the time-range tokens in epoch millis and epoch seconds.
    pub fn with_window(self, window: &CollectionWindow) -> Self {
        self.with(START_TIME, window.start_millis.to_string())
            .with(END_TIME, window.end_millis.to_string())
            .with(START_TIME_SECONDS, window.start_seconds().to_string())
            .with(END_TIME_SECONDS, window.end_seconds().to_string())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Substitutes every token; unknown tokens are a configuration error.
    pub fn render(&self, template: &str) -> Result<String, CollectionError> {
        self.render_with(template, |value| value.to_string())
    }

    /// Like [`TemplateVars::render`] but percent-encodes substituted values.
    pub fn render_url(&self, template: &str) -> Result<String, CollectionError> {
        self.render_with(template, |value| urlencoding::encode(value).into_owned())
    }

    fn render_with(
        &self,
        template: &str,
        encode: impl Fn(&str) -> String,
    ) -> Result<String, CollectionError> {
        let mut missing = Vec::new();
        let rendered = placeholder_regex().replace_all(template, |captures: &Captures<'_>| {
            let name = &captures[1];
            match self.values.get(name) {
                Some(value) => encode(value),
                None => {
                    missing.push(name.to_string());
                    captures[0].to_string()
                }
            }
        });
        if !missing.is_empty() {
            return Err(CollectionError::InvalidConfig(format!(
                "unresolved placeholders: {}",
                missing.join(", ")
            )));
        }
        Ok(rendered.into_owned())
    }
}

impl std::fmt::Debug for TemplateVars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // values may hold decrypted secrets
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Names of the tokens used by `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(template)
        .map(|captures| captures[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_window_and_host() {
        let window = CollectionWindow::new(1_700_000_000_000, 1_700_000_060_500).unwrap();
        let vars = TemplateVars::new().with_host("web-1").with_window(&window);
        assert_eq!(
            vars.render("/metrics?host=${host}&from=${start_time_seconds}&to=${end_time}")
                .unwrap(),
            "/metrics?host=web-1&from=1700000000&to=1700000060500"
        );
    }

    #[test]
    fn test_render_url_encodes_values() {
        let vars = TemplateVars::new().with("query", "avg:trace.servlet{host:web 1}");
        assert_eq!(
            vars.render_url("/api/v1/query?query=${query}").unwrap(),
            "/api/v1/query?query=avg%3Atrace.servlet%7Bhost%3Aweb%201%7D"
        );
    }

    #[test]
    fn test_unresolved_placeholders_fail() {
        let err = TemplateVars::new()
            .with_host("web-1")
            .render("${host}/${api_key}/${app_key}")
            .unwrap_err();
        assert_eq!(
            err,
            CollectionError::InvalidConfig("unresolved placeholders: api_key, app_key".to_string())
        );
    }

    #[test]
    fn test_placeholders_and_debug() {
        assert_eq!(placeholders("${a}-${b}-$c"), vec!["a", "b"]);
        let vars = TemplateVars::new().with("api_key", "s3cr3t");
        assert!(!format!("{vars:?}").contains("s3cr3t"));
    }
}
