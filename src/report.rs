use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::gitlab::EntityKind;
use crate::graph::GraphCounts;

/// Lifecycle of one project run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Extracting,
    MappingLoading,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Pending => "PENDING",
            RunState::Extracting => "EXTRACTING",
            RunState::MappingLoading => "MAPPING_LOADING",
            RunState::Completed => "COMPLETED",
            RunState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Outcome of one project run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub configuration: String,
    pub project: Option<String>,
    pub state: RunState,
    pub records: BTreeMap<EntityKind, usize>,
    pub pages: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(configuration: impl Into<String>) -> Self {
        Self {
            configuration: configuration.into(),
            project: None,
            state: RunState::Pending,
            records: BTreeMap::new(),
            pages: 0,
            nodes_written: 0,
            edges_written: 0,
            graph: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// A run that never started, e.g. because its configuration did not load.
    pub fn failed(configuration: impl Into<String>, error: impl fmt::Display) -> Self {
        let mut report = Self::new(configuration);
        report.fail(error);
        report
    }

    pub fn fail(&mut self, error: impl fmt::Display) {
        self.state = RunState::Failed;
        self.error = Some(error.to_string());
        self.finished_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.state = RunState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn record_count(&self) -> usize {
        self.records.values().sum()
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_report_is_terminal_with_cause() {
        let report = RunReport::failed("broken.toml", "Configuration broken.toml not found.");
        assert!(report.state.is_terminal());
        assert!(!report.succeeded());
        assert_eq!(
            report.error.as_deref(),
            Some("Configuration broken.toml not found.")
        );
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn serialized_state_uses_upper_case_names() {
        let mut report = RunReport::new("demo.toml");
        report.records.insert(EntityKind::Job, 3);
        report.complete();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "COMPLETED");
        assert_eq!(json["records"]["job"], 3);
        assert!(json.get("error").is_none());
        assert_eq!(RunState::MappingLoading.to_string(), "MAPPING_LOADING");
    }
}
