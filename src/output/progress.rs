use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::styling::{bright, by_state};
use crate::gitlab::EntityKind;
use crate::report::{RunReport, RunState};

/// Spinner line for one runner inside a shared `MultiProgress`.
pub struct RunProgress {
    pb: ProgressBar,
}

impl RunProgress {
    pub fn new(multi: &MultiProgress, name: &str) -> Self {
        let pb = multi.add(create_spinner());
        pb.set_prefix(bright(name).to_string());
        pb.set_message(by_state(RunState::Pending, RunState::Pending).to_string());
        Self { pb }
    }

    pub fn set_state(&self, state: RunState) {
        self.pb.set_message(by_state(state, state).to_string());
    }

    pub fn page(&self, kind: EntityKind, total_records: usize) {
        let message = format!("{kind} pages, {total_records} record(s) loaded");
        self.pb
            .set_message(by_state(RunState::MappingLoading, message).to_string());
    }

    pub fn finish(&self, report: &RunReport) {
        let message = if report.succeeded() {
            format!("{} ✓ {} record(s)", report.state, report.record_count())
        } else {
            format!(
                "{} ✗ {}",
                report.state,
                report.error.as_deref().unwrap_or("unknown error")
            )
        };
        self.pb
            .finish_with_message(by_state(report.state, message).to_string());
    }
}

fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner} {prefix} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
