mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::export_json;
pub use progress::RunProgress;
pub use styling::{dim, magenta_bold};
pub use summary::{print_summary, render_counts};

/// Prints the banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🕸  gitlab2graph"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitLab CI/CD to Neo4j")
    );
}
