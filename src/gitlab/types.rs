use std::fmt;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The entity types pulled from GitLab, in extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Pipeline,
    Job,
    Commit,
    User,
    Runner,
}

impl EntityKind {
    /// Project first, then pipelines, then what pipelines reference.
    pub const EXTRACTION_ORDER: [EntityKind; 6] = [
        EntityKind::Project,
        EntityKind::Pipeline,
        EntityKind::Job,
        EntityKind::Commit,
        EntityKind::User,
        EntityKind::Runner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Pipeline => "pipeline",
            EntityKind::Job => "job",
            EntityKind::Commit => "commit",
            EntityKind::User => "user",
            EntityKind::Runner => "runner",
        }
    }

    /// Configuration section whose scalars are forwarded as query parameters.
    pub fn listing_section(self) -> Option<&'static str> {
        match self {
            EntityKind::Pipeline => Some("pipelines"),
            EntityKind::Job => Some("jobs"),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    pub namespace: String,
    pub path_with_namespace: String,
    pub description: String,
    pub default_branch: String,
    pub web_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRecord {
    pub id: i64,
    pub project_id: i64,
    pub status: String,
    pub ref_: String,
    pub sha: String,
    pub source: String,
    pub web_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: i64,
    pub pipeline_id: i64,
    pub name: String,
    pub stage: String,
    pub status: String,
    /// Seconds
    pub duration: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub web_url: String,
    /// Embedded runner summary, when the job was picked up.
    pub runner: Option<RunnerRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub sha: String,
    pub short_id: String,
    pub title: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_at: Option<DateTime<Utc>>,
    pub committed_at: Option<DateTime<Utc>>,
    pub web_url: String,
    pub parent_shas: Vec<String>,
    /// Filled in by author resolution; GitLab does not send it.
    pub author_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub state: String,
    pub web_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerRecord {
    pub id: i64,
    pub description: String,
    pub name: String,
    pub runner_type: String,
    pub is_shared: Option<bool>,
    pub status: String,
}

/// A normalized upstream entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRecord {
    Project(ProjectRecord),
    Pipeline(PipelineRecord),
    Job(JobRecord),
    Commit(CommitRecord),
    User(UserRecord),
    Runner(RunnerRecord),
}

// Upstream payloads. Everything is optional so that sparse or newer payloads
// still deserialize; identity checks happen during normalization.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNamespace {
    name: Option<String>,
    full_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProject {
    id: Option<i64>,
    name: Option<String>,
    namespace: Option<RawNamespace>,
    path_with_namespace: Option<String>,
    description: Option<String>,
    default_branch: Option<String>,
    web_url: Option<String>,
    created_at: Option<String>,
    last_activity_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPipeline {
    id: Option<i64>,
    project_id: Option<i64>,
    status: Option<String>,
    #[serde(rename = "ref")]
    ref_: Option<String>,
    sha: Option<String>,
    source: Option<String>,
    web_url: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPipelineRef {
    id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawJob {
    id: Option<i64>,
    name: Option<String>,
    stage: Option<String>,
    status: Option<String>,
    duration: Option<f64>,
    started_at: Option<String>,
    finished_at: Option<String>,
    web_url: Option<String>,
    runner: Option<Value>,
    pipeline: Option<RawPipelineRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCommit {
    id: Option<String>,
    short_id: Option<String>,
    title: Option<String>,
    message: Option<String>,
    author_name: Option<String>,
    author_email: Option<String>,
    authored_date: Option<String>,
    committed_date: Option<String>,
    web_url: Option<String>,
    parent_ids: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUser {
    id: Option<i64>,
    username: Option<String>,
    name: Option<String>,
    state: Option<String>,
    web_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRunner {
    id: Option<i64>,
    description: Option<String>,
    name: Option<String>,
    runner_type: Option<String>,
    is_shared: Option<bool>,
    status: Option<String>,
}

fn parse<T: serde::de::DeserializeOwned>(kind: EntityKind, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!("Skipping malformed {kind} record: {e}");
            None
        }
    }
}

fn missing_identity(kind: EntityKind) {
    warn!("Skipping {kind} record without identity");
}

/// Parses an upstream timestamp into UTC.
///
/// Unparseable values are treated as absent.
pub fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    let raw = value?;
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(timestamp) => Some(timestamp.with_timezone(&Utc)),
        Err(e) => {
            debug!("Ignoring unparseable timestamp '{raw}': {e}");
            None
        }
    }
}

impl ProjectRecord {
    pub fn from_value(value: Value) -> Option<Self> {
        let raw: RawProject = parse(EntityKind::Project, value)?;
        let Some(id) = raw.id else {
            missing_identity(EntityKind::Project);
            return None;
        };
        let namespace = raw
            .namespace
            .and_then(|ns| ns.name.or(ns.full_path))
            .unwrap_or_default();

        Some(Self {
            id,
            name: raw.name.unwrap_or_default(),
            namespace,
            path_with_namespace: raw.path_with_namespace.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            default_branch: raw.default_branch.unwrap_or_default(),
            web_url: raw.web_url.unwrap_or_default(),
            created_at: parse_timestamp(raw.created_at),
            last_activity_at: parse_timestamp(raw.last_activity_at),
        })
    }
}

impl PipelineRecord {
    /// `project_id` is the id of the project being extracted and wins over
    /// whatever the payload carries.
    pub fn from_value(value: Value, project_id: Option<i64>) -> Option<Self> {
        let raw: RawPipeline = parse(EntityKind::Pipeline, value)?;
        let (Some(id), Some(project_id)) = (raw.id, project_id.or(raw.project_id)) else {
            missing_identity(EntityKind::Pipeline);
            return None;
        };

        Some(Self {
            id,
            project_id,
            status: raw.status.unwrap_or_default(),
            ref_: raw.ref_.unwrap_or_default(),
            sha: raw.sha.unwrap_or_default(),
            source: raw.source.unwrap_or_default(),
            web_url: raw.web_url.unwrap_or_default(),
            created_at: parse_timestamp(raw.created_at),
            updated_at: parse_timestamp(raw.updated_at),
        })
    }
}

impl JobRecord {
    /// `pipeline_id` is the pipeline whose job listing produced the record,
    /// used when the payload does not name its pipeline.
    pub fn from_value(value: Value, pipeline_id: i64) -> Option<Self> {
        let raw: RawJob = parse(EntityKind::Job, value)?;
        let Some(id) = raw.id else {
            missing_identity(EntityKind::Job);
            return None;
        };

        Some(Self {
            id,
            pipeline_id: raw.pipeline.and_then(|p| p.id).unwrap_or(pipeline_id),
            name: raw.name.unwrap_or_default(),
            stage: raw.stage.unwrap_or_default(),
            status: raw.status.unwrap_or_default(),
            duration: raw.duration,
            started_at: parse_timestamp(raw.started_at),
            finished_at: parse_timestamp(raw.finished_at),
            web_url: raw.web_url.unwrap_or_default(),
            runner: raw.runner.and_then(RunnerRecord::from_value),
        })
    }
}

impl CommitRecord {
    pub fn from_value(value: Value) -> Option<Self> {
        let raw: RawCommit = parse(EntityKind::Commit, value)?;
        let Some(sha) = raw.id.filter(|sha| !sha.is_empty()) else {
            missing_identity(EntityKind::Commit);
            return None;
        };

        Some(Self {
            sha,
            short_id: raw.short_id.unwrap_or_default(),
            title: raw.title.unwrap_or_default(),
            message: raw.message.unwrap_or_default(),
            author_name: raw.author_name.unwrap_or_default(),
            author_email: raw.author_email.unwrap_or_default(),
            authored_at: parse_timestamp(raw.authored_date),
            committed_at: parse_timestamp(raw.committed_date),
            web_url: raw.web_url.unwrap_or_default(),
            parent_shas: raw.parent_ids.unwrap_or_default(),
            author_id: None,
        })
    }
}

impl UserRecord {
    pub fn from_value(value: Value) -> Option<Self> {
        let raw: RawUser = parse(EntityKind::User, value)?;
        let Some(id) = raw.id else {
            missing_identity(EntityKind::User);
            return None;
        };

        Some(Self {
            id,
            username: raw.username.unwrap_or_default(),
            name: raw.name.unwrap_or_default(),
            state: raw.state.unwrap_or_default(),
            web_url: raw.web_url.unwrap_or_default(),
        })
    }
}

impl RunnerRecord {
    pub fn from_value(value: Value) -> Option<Self> {
        let raw: RawRunner = parse(EntityKind::Runner, value)?;
        let Some(id) = raw.id else {
            missing_identity(EntityKind::Runner);
            return None;
        };

        Some(Self {
            id,
            description: raw.description.unwrap_or_default(),
            name: raw.name.unwrap_or_default(),
            runner_type: raw.runner_type.unwrap_or_default(),
            is_shared: raw.is_shared,
            status: raw.status.unwrap_or_default(),
        })
    }
}
