//! Collapsing of consecutive identical console messages

use super::entry::{ConsoleLocation, ConsoleLogEntry, StackFrame};
use super::most_recent;
use serde::Serialize;

/// A run of consecutive console entries sharing type and text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicatedLogGroup {
    #[serde(rename = "type")]
    pub kind: String,
    /// Display text, suffixed with the repeat count once `count > 1`
    pub text: String,
    pub location: Option<ConsoleLocation>,
    /// First occurrence
    pub timestamp: f64,
    pub count: usize,
    pub timestamps: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<StackFrame>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    original_text: String,
}

impl DeduplicatedLogGroup {
    fn start(entry: &ConsoleLogEntry) -> Self {
        Self {
            kind: entry.kind.clone(),
            text: entry.text.clone(),
            location: entry.location.clone(),
            timestamp: entry.timestamp,
            count: 1,
            timestamps: vec![entry.timestamp],
            stack_trace: entry.stack_trace.clone(),
            args: entry.args.clone(),
            page: entry.page.clone(),
            error: entry.error.clone(),
            original_text: entry.text.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn original_text(&self) -> &str {
        &self.original_text
    }

    fn absorbs(&self, entry: &ConsoleLogEntry) -> bool {
        self.kind == entry.kind && self.original_text == entry.text
    }

    fn push(&mut self, entry: &ConsoleLogEntry) {
        self.count += 1;
        self.timestamps.push(entry.timestamp);
        self.text = format!("{} (重复 {} 次)", self.original_text, self.count);
    }
}

/// Group consecutive repeats and keep the `last_n` most recent groups,
/// oldest first.
pub fn dedup(entries: &[ConsoleLogEntry], last_n: usize) -> Vec<DeduplicatedLogGroup> {
    let mut ordered: Vec<&ConsoleLogEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut groups: Vec<DeduplicatedLogGroup> = Vec::new();
    for entry in ordered {
        match groups.last_mut() {
            Some(group) if group.absorbs(entry) => group.push(entry),
            _ => groups.push(DeduplicatedLogGroup::start(entry)),
        }
    }

    most_recent(groups, last_n, |group| group.timestamp)
}
