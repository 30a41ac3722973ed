use std::fmt::Write;

use comfy_table::Cell;

use super::styling::{bright, bright_green, bright_red, dim};
use super::tables::{state_cell, table_with_header};
use crate::graph::GraphCounts;
use crate::report::RunReport;

/// Prints one row per runner plus a completion tally to stdout.
pub fn print_summary(reports: &[RunReport]) {
    println!("{}", render_summary(reports));
}

pub fn render_summary(reports: &[RunReport]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{} {}", bright("📊"), bright("Runs").underlined());

    let mut table = table_with_header(&[
        "Configuration",
        "Project",
        "State",
        "Records",
        "Pages",
        "Nodes",
        "Edges",
        "Error",
    ]);

    for report in reports {
        table.add_row(vec![
            Cell::new(&report.configuration),
            Cell::new(report.project.as_deref().unwrap_or("-")),
            state_cell(report.state),
            Cell::new(report.record_count()),
            Cell::new(report.pages),
            Cell::new(report.nodes_written),
            Cell::new(report.edges_written),
            Cell::new(report.error.as_deref().unwrap_or("")),
        ]);
    }
    let _ = writeln!(output, "{table}");

    let completed = reports.iter().filter(|r| r.succeeded()).count();
    let failed = reports.len() - completed;
    let tally = format!("{completed}/{} completed", reports.len());
    if failed == 0 {
        let _ = writeln!(output, "{}", bright_green(tally));
    } else {
        let _ = writeln!(output, "{}, {}", bright_green(tally), bright_red(format!("{failed} failed")));
    }

    output
}

pub fn render_counts(counts: GraphCounts) -> String {
    format!(
        "{} {} node(s), {} relationship(s)",
        dim("In-memory graph:"),
        counts.nodes,
        counts.relationships
    )
}
