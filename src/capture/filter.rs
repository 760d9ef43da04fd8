//! Network capture configuration and the filter that applies it

use super::event::RequestEvent;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A URL pattern, compiled once when the configuration is parsed.
///
/// Serializes back to the source text so the configuration round-trips
/// through tool calls unchanged.
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Search anywhere in `text`, not a full match.
    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.as_str()).finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source)
            .map_err(|e| de::Error::custom(format!("invalid pattern {source:?}: {e}")))
    }
}

/// Which network traffic gets recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub include_patterns: Vec<Pattern>,
    pub exclude_patterns: Vec<Pattern>,
    pub include_types: Vec<String>,
    pub exclude_types: Vec<String>,
    pub capture_post_data: bool,
    pub capture_response_body: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            capture_post_data: true,
            capture_response_body: true,
        }
    }
}

/// Partial update to a [`CaptureConfig`]; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfigUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub include_patterns: Option<Vec<Pattern>>,
    #[serde(default)]
    pub exclude_patterns: Option<Vec<Pattern>>,
    #[serde(default)]
    pub include_types: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_types: Option<Vec<String>>,
    #[serde(default)]
    pub capture_post_data: Option<bool>,
    #[serde(default)]
    pub capture_response_body: Option<bool>,
}

impl CaptureConfig {
    /// Apply `update` on top of this configuration.
    #[must_use]
    pub fn merged(&self, update: CaptureConfigUpdate) -> Self {
        Self {
            enabled: update.enabled.unwrap_or(self.enabled),
            include_patterns: update
                .include_patterns
                .unwrap_or_else(|| self.include_patterns.clone()),
            exclude_patterns: update
                .exclude_patterns
                .unwrap_or_else(|| self.exclude_patterns.clone()),
            include_types: update
                .include_types
                .unwrap_or_else(|| self.include_types.clone()),
            exclude_types: update
                .exclude_types
                .unwrap_or_else(|| self.exclude_types.clone()),
            capture_post_data: update.capture_post_data.unwrap_or(self.capture_post_data),
            capture_response_body: update
                .capture_response_body
                .unwrap_or(self.capture_response_body),
        }
    }
}

/// Decide whether a request should be recorded under `config`.
pub fn should_capture(request: &RequestEvent, config: &CaptureConfig) -> bool {
    if !config.enabled {
        return false;
    }

    let resource_type = request.resource_type.as_str();
    if !config.include_types.is_empty() && !config.include_types.iter().any(|t| t == resource_type) {
        return false;
    }
    if config.exclude_types.iter().any(|t| t == resource_type) {
        return false;
    }

    let url = request.url.as_str();
    if !config.include_patterns.is_empty() && !config.include_patterns.iter().any(|p| p.is_match(url)) {
        return false;
    }
    if config.exclude_patterns.iter().any(|p| p.is_match(url)) {
        return false;
    }

    true
}
