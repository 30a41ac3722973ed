use anyhow::{Context, Result};
use clap::Parser;
use indicatif::MultiProgress;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ProjectConfig;
use crate::graph::MemoryStore;
use crate::output;
use crate::runner::{run_all, RunOptions, RunSettings, StoreTarget};

#[derive(Parser)]
#[command(name = "gitlab2graph")]
#[command(author, version, about = "Loads GitLab CI/CD metadata into a Neo4j graph", long_about = None)]
pub struct Cli {
    /// Project configuration files, as paths or names inside the configuration directory
    #[arg(required = true)]
    configurations: Vec<String>,

    /// Directory holding project configurations
    #[arg(short = 'd', long, env = "G2G_CONFIG_DIR", default_value = "configurations")]
    config_dir: PathBuf,

    /// Maximum number of projects processed concurrently
    #[arg(short, long, default_value_t = 4)]
    jobs: usize,

    /// Load into an in-memory graph instead of Neo4j and print its size
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Write run reports as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, default_value_t = false)]
    pretty: bool,
}

impl Cli {
    /// Runs every configuration; `Ok(true)` when all of them completed.
    pub async fn execute(&self) -> Result<bool> {
        let configs: Vec<_> = self
            .configurations
            .iter()
            .map(|identifier| {
                (
                    identifier.clone(),
                    ProjectConfig::load(identifier, &self.config_dir),
                )
            })
            .collect();

        let memory = Arc::new(MemoryStore::new());
        let target = if self.dry_run {
            info!("Dry run: writing to an in-memory graph");
            StoreTarget::Memory(Arc::clone(&memory))
        } else {
            StoreTarget::Neo4j
        };
        let settings = RunSettings {
            jobs: self.jobs,
            target,
            options: RunOptions::default(),
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping runners at the next page boundary");
                flag.store(true, Ordering::SeqCst);
            }
        });

        let multi = MultiProgress::new();
        let reports = run_all(configs, &settings, cancel, &multi).await;
        eprintln!();

        output::print_summary(&reports);
        if self.dry_run {
            println!("{}", output::render_counts(memory.snapshot().await.counts()));
        }

        if let Some(path) = &self.output {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            output::export_json(&reports, self.pretty, &mut file)?;
            info!("Run reports written to: {}", path.display());
        }

        Ok(reports.iter().all(|report| report.succeeded()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_apply() {
        let cli = Cli::try_parse_from(["gitlab2graph", "project.toml"]).unwrap();
        assert_eq!(cli.configurations, vec!["project.toml".to_string()]);
        assert_eq!(cli.jobs, 4);
        assert!(!cli.dry_run);
    }

    #[test]
    fn at_least_one_configuration_is_required() {
        assert!(Cli::try_parse_from(["gitlab2graph"]).is_err());
    }
}
