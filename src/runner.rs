//! Per-project extract, map and load sequencing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::MultiProgress;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::ProjectConfig;
use crate::error::{G2GError, Result};
use crate::gitlab::{EntityExtractor, EntityKind, EntityRecord, GitLabClient, References};
use crate::graph::writer::WriteStats;
use crate::graph::{mapper, GraphBatch, GraphStore, GraphWriter, MemoryStore, Neo4jStore};
use crate::output::RunProgress;
use crate::report::{RunReport, RunState};

/// Extra attempts for a batch that failed with a retryable write error.
pub const WRITE_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub write_retries: u32,
    /// Multiplied by the attempt number before each batch retry.
    pub write_backoff: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            write_retries: WRITE_RETRIES,
            write_backoff: Duration::from_secs(1),
        }
    }
}

/// Where runners write their graph.
#[derive(Clone)]
pub enum StoreTarget {
    /// A Neo4j session per runner, from each configuration's `neo4j` section.
    Neo4j,
    /// One shared in-memory graph.
    Memory(Arc<MemoryStore>),
}

#[derive(Clone)]
pub struct RunSettings {
    /// Maximum number of runners executing at once.
    pub jobs: usize,
    pub target: StoreTarget,
    pub options: RunOptions,
}

struct Tracker {
    report: RunReport,
    progress: RunProgress,
}

impl Tracker {
    fn transition(&mut self, state: RunState) {
        debug_assert!(
            !self.report.state.is_terminal(),
            "{} already finished",
            self.report.configuration
        );
        if self.report.state != state {
            debug!(
                "{}: {} -> {}",
                self.report.configuration, self.report.state, state
            );
            self.report.state = state;
            self.progress.set_state(state);
        }
    }

    fn record_page(&mut self, kind: EntityKind, records: usize, written: WriteStats) {
        *self.report.records.entry(kind).or_default() += records;
        self.report.pages += 1;
        self.report.nodes_written = written.nodes;
        self.report.edges_written = written.edges;
        self.progress.page(kind, self.report.record_count());
    }
}

/// Runs one project configuration to completion or failure.
pub struct PipelineRunner {
    extractor: EntityExtractor,
    writer: GraphWriter,
    tracker: Tracker,
    cancel: Arc<AtomicBool>,
    options: RunOptions,
}

impl PipelineRunner {
    pub fn new(
        extractor: EntityExtractor,
        writer: GraphWriter,
        report: RunReport,
        progress: RunProgress,
        cancel: Arc<AtomicBool>,
        options: RunOptions,
    ) -> Self {
        Self {
            extractor,
            writer,
            tracker: Tracker { report, progress },
            cancel,
            options,
        }
    }

    pub async fn run(mut self) -> RunReport {
        info!(
            "Starting {} for project {}",
            self.tracker.report.configuration,
            self.extractor.project()
        );
        self.tracker.transition(RunState::Extracting);

        match self.execute().await {
            Ok(()) => {
                match self.writer.counts().await {
                    Ok(counts) => {
                        info!(
                            "{}: graph now holds {} node(s) and {} relationship(s)",
                            self.tracker.report.configuration, counts.nodes, counts.relationships
                        );
                        self.tracker.report.graph = Some(counts);
                    }
                    Err(e) => warn!("{}: could not count graph: {e}", self.tracker.report.configuration),
                }
                self.tracker.report.complete();
            }
            Err(e) => {
                error!(
                    "{} (project {}) failed: {e}",
                    self.tracker.report.configuration,
                    self.extractor.project()
                );
                self.tracker.report.fail(&e);
            }
        }

        self.tracker.progress.finish(&self.tracker.report);
        self.tracker.report
    }

    async fn execute(&mut self) -> Result<()> {
        self.writer.prepare().await?;

        let mut references = References::default();
        for kind in EntityKind::EXTRACTION_ORDER {
            let mut extraction = self.extractor.extract(kind, &references);
            loop {
                if self.cancel.load(Ordering::SeqCst) {
                    return Err(G2GError::Cancelled);
                }

                self.tracker.transition(RunState::Extracting);
                let Some(records) = extraction.next_page().await? else {
                    break;
                };

                self.tracker.transition(RunState::MappingLoading);
                references.observe_page(&records);
                if let Some(EntityRecord::Project(project)) = records.first() {
                    self.tracker.report.project = Some(if project.path_with_namespace.is_empty() {
                        project.name.clone()
                    } else {
                        project.path_with_namespace.clone()
                    });
                }

                let batch = mapper::map_page(&records);
                write_with_retry(&mut self.writer, &batch, &self.options).await?;
                debug!(
                    "{}: wrote {kind} page of {} record(s)",
                    self.tracker.report.configuration,
                    records.len()
                );
                self.tracker.record_page(kind, records.len(), self.writer.stats());
            }

            info!(
                "{}: {kind} pass complete ({} record(s))",
                self.tracker.report.configuration,
                self.tracker.report.records.get(&kind).copied().unwrap_or(0)
            );
        }

        Ok(())
    }
}

/// Applies a batch, retrying retryable failures with a linear backoff.
pub async fn write_with_retry(
    writer: &mut GraphWriter,
    batch: &GraphBatch,
    options: &RunOptions,
) -> Result<()> {
    let mut retries = 0;
    loop {
        match writer.apply(batch).await {
            Ok(()) => return Ok(()),
            Err(e) if e.retryable && retries < options.write_retries => {
                retries += 1;
                let delay = options.write_backoff * retries;
                warn!(
                    "{e}, retrying batch in {}ms ({retries}/{})...",
                    delay.as_millis(),
                    options.write_retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn start_runner(
    name: &str,
    config: &ProjectConfig,
    target: &StoreTarget,
) -> Result<(EntityExtractor, GraphWriter)> {
    let client = GitLabClient::new(&config.gitlab.url, config.gitlab.token.clone())?
        .with_retry_policy(config.gitlab.retry_policy())
        .with_per_page(config.gitlab.page_size());
    let extractor = EntityExtractor::new(
        client,
        config.project.project_id.clone(),
        config.pass_through(),
    );

    let store: Arc<dyn GraphStore> = match target {
        StoreTarget::Neo4j => {
            debug!("{name}: connecting to {}", config.neo4j.uri());
            Arc::new(Neo4jStore::connect(&config.neo4j).await?)
        }
        StoreTarget::Memory(store) => store.clone(),
    };

    Ok((extractor, GraphWriter::new(store)))
}

/// Runs every configuration, at most `settings.jobs` at a time.
///
/// Reports come back in input order. A configuration that failed to load
/// yields a failed report without affecting the others.
pub async fn run_all(
    configs: Vec<(String, Result<ProjectConfig>)>,
    settings: &RunSettings,
    cancel: Arc<AtomicBool>,
    multi: &MultiProgress,
) -> Vec<RunReport> {
    let semaphore = Arc::new(Semaphore::new(settings.jobs.max(1)));
    let mut names = Vec::with_capacity(configs.len());
    let mut slots: Vec<Option<RunReport>> = Vec::with_capacity(configs.len());
    let mut tasks = JoinSet::new();

    for (index, (name, config)) in configs.into_iter().enumerate() {
        names.push(name.clone());
        slots.push(None);
        let progress = RunProgress::new(multi, &name);

        let config = match config {
            Ok(config) => config,
            Err(e) => {
                error!("{name} failed: {e}");
                let report = RunReport::failed(&name, &e);
                progress.finish(&report);
                slots[index] = Some(report);
                continue;
            }
        };

        let semaphore = Arc::clone(&semaphore);
        let cancel = Arc::clone(&cancel);
        let target = settings.target.clone();
        let options = settings.options;
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let mut report = RunReport::new(&name);
            report.project = Some(config.project.project_id.clone());

            let report = match start_runner(&name, &config, &target).await {
                Ok((extractor, writer)) => {
                    PipelineRunner::new(extractor, writer, report, progress, cancel, options)
                        .run()
                        .await
                }
                Err(e) => {
                    error!("{name} (project {}) failed: {e}", config.project.project_id);
                    report.fail(&e);
                    progress.finish(&report);
                    report
                }
            };
            (index, report)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, report)) => slots[index] = Some(report),
            Err(e) => error!("Runner task ended abnormally: {e}"),
        }
    }

    slots
        .into_iter()
        .zip(names)
        .map(|(slot, name)| slot.unwrap_or_else(|| RunReport::failed(name, "runner task aborted")))
        .collect()
}
