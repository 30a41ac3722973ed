//! Entity record to graph descriptor mapping.
//!
//! Pure and deterministic. Fields that identify a related entity (pipeline
//! sha, job runner, commit author and parents) become edges, not properties.

use super::descriptor::{EdgeDescriptor, GraphBatch, Label, NodeDescriptor, NodeRef, RelType};
use crate::gitlab::types::{
    CommitRecord, EntityRecord, JobRecord, PipelineRecord, ProjectRecord, RunnerRecord, UserRecord,
};

pub fn map(record: &EntityRecord) -> GraphBatch {
    match record {
        EntityRecord::Project(project) => map_project(project),
        EntityRecord::Pipeline(pipeline) => map_pipeline(pipeline),
        EntityRecord::Job(job) => map_job(job),
        EntityRecord::Commit(commit) => map_commit(commit),
        EntityRecord::User(user) => map_user(user),
        EntityRecord::Runner(runner) => map_runner(runner),
    }
}

/// Maps a whole page into one write unit, preserving record order.
pub fn map_page(records: &[EntityRecord]) -> GraphBatch {
    records.iter().fold(GraphBatch::default(), |mut batch, record| {
        batch.extend(map(record));
        batch
    })
}

fn map_project(project: &ProjectRecord) -> GraphBatch {
    let node = NodeDescriptor::new(NodeRef::new(Label::Project, project.id))
        .with("name", &project.name)
        .with("namespace", &project.namespace)
        .with("path_with_namespace", &project.path_with_namespace)
        .with("description", &project.description)
        .with("default_branch", &project.default_branch)
        .with("web_url", &project.web_url)
        .with("created_at", project.created_at)
        .with("last_activity_at", project.last_activity_at);

    GraphBatch {
        nodes: vec![node],
        edges: Vec::new(),
    }
}

fn map_pipeline(pipeline: &PipelineRecord) -> GraphBatch {
    let this = NodeRef::new(Label::Pipeline, pipeline.id);
    let node = NodeDescriptor::new(this.clone())
        .with("status", &pipeline.status)
        .with("ref", &pipeline.ref_)
        .with("source", &pipeline.source)
        .with("web_url", &pipeline.web_url)
        .with("created_at", pipeline.created_at)
        .with("updated_at", pipeline.updated_at);

    let mut edges = vec![EdgeDescriptor::incoming(
        RelType::HasPipeline,
        this.clone(),
        NodeRef::new(Label::Project, pipeline.project_id),
    )];
    if !pipeline.sha.is_empty() {
        edges.push(EdgeDescriptor::outgoing(
            RelType::TriggeredBy,
            this,
            NodeRef::new(Label::Commit, pipeline.sha.as_str()),
        ));
    }

    GraphBatch {
        nodes: vec![node],
        edges,
    }
}

fn map_job(job: &JobRecord) -> GraphBatch {
    let this = NodeRef::new(Label::Job, job.id);
    let node = NodeDescriptor::new(this.clone())
        .with("name", &job.name)
        .with("stage", &job.stage)
        .with("status", &job.status)
        .with("duration", job.duration)
        .with("started_at", job.started_at)
        .with("finished_at", job.finished_at)
        .with("web_url", &job.web_url);

    let mut edges = vec![EdgeDescriptor::incoming(
        RelType::HasJob,
        this.clone(),
        NodeRef::new(Label::Pipeline, job.pipeline_id),
    )];
    if let Some(runner) = &job.runner {
        edges.push(EdgeDescriptor::outgoing(
            RelType::RanOn,
            this,
            NodeRef::new(Label::Runner, runner.id),
        ));
    }

    GraphBatch {
        nodes: vec![node],
        edges,
    }
}

fn map_commit(commit: &CommitRecord) -> GraphBatch {
    let this = NodeRef::new(Label::Commit, commit.sha.as_str());
    let node = NodeDescriptor::new(this.clone())
        .with("short_id", &commit.short_id)
        .with("title", &commit.title)
        .with("message", &commit.message)
        .with("author_name", &commit.author_name)
        .with("author_email", &commit.author_email)
        .with("authored_at", commit.authored_at)
        .with("committed_at", commit.committed_at)
        .with("web_url", &commit.web_url);

    let mut edges = Vec::with_capacity(commit.parent_shas.len() + 1);
    if let Some(author_id) = commit.author_id {
        edges.push(EdgeDescriptor::outgoing(
            RelType::AuthoredBy,
            this.clone(),
            NodeRef::new(Label::User, author_id),
        ));
    }
    edges.extend(
        commit
            .parent_shas
            .iter()
            .filter(|parent| !parent.is_empty())
            .map(|parent| {
                EdgeDescriptor::outgoing(
                    RelType::HasParent,
                    this.clone(),
                    NodeRef::new(Label::Commit, parent.as_str()),
                )
            }),
    );

    GraphBatch {
        nodes: vec![node],
        edges,
    }
}

fn map_user(user: &UserRecord) -> GraphBatch {
    let node = NodeDescriptor::new(NodeRef::new(Label::User, user.id))
        .with("username", &user.username)
        .with("name", &user.name)
        .with("state", &user.state)
        .with("web_url", &user.web_url);

    GraphBatch {
        nodes: vec![node],
        edges: Vec::new(),
    }
}

fn map_runner(runner: &RunnerRecord) -> GraphBatch {
    let node = NodeDescriptor::new(NodeRef::new(Label::Runner, runner.id))
        .with("description", &runner.description)
        .with("name", &runner.name)
        .with("runner_type", &runner.runner_type)
        .with("is_shared", runner.is_shared)
        .with("status", &runner.status);

    GraphBatch {
        nodes: vec![node],
        edges: Vec::new(),
    }
}
