use std::collections::VecDeque;

use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info};
use serde_json::Value;
use tokio::sync::OnceCell;

use super::client::{GitLabClient, Resource};
use super::pagination::PageToken;
use super::references::References;
use super::types::{
    CommitRecord, EntityKind, EntityRecord, JobRecord, PipelineRecord, ProjectRecord,
    RunnerRecord, UserRecord,
};
use crate::config::PassThrough;
use crate::error::{G2GError, Result};

/// Single-object fetches grouped into one page.
pub const ITEMS_PER_PAGE: usize = 20;

/// Pulls normalized entity records for one project.
pub struct EntityExtractor {
    client: GitLabClient,
    project: String,
    pass_through: PassThrough,
    authors: OnceCell<AuthorDirectory>,
}

/// Project members used to attribute commits to users.
#[derive(Debug, Clone, Default)]
pub struct AuthorDirectory {
    members: Vec<UserRecord>,
}

impl AuthorDirectory {
    pub fn new(members: Vec<UserRecord>) -> Self {
        Self { members }
    }

    /// Exact display name, then case-insensitive display name, then the
    /// e-mail local part as username.
    pub fn resolve(&self, name: &str, email: &str) -> Option<i64> {
        let name = name.trim();
        if !name.is_empty() {
            if let Some(user) = self.members.iter().find(|u| u.name == name) {
                return Some(user.id);
            }
            if let Some(user) = self
                .members
                .iter()
                .find(|u| u.name.to_lowercase() == name.to_lowercase())
            {
                return Some(user.id);
            }
        }

        let local = email.split('@').next().unwrap_or_default().trim();
        if local.is_empty() {
            return None;
        }
        self.members
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(local))
            .map(|u| u.id)
    }
}

enum Source {
    Single(Resource),
    Listing {
        resource: Resource,
        pipeline_id: Option<i64>,
    },
    Items(Vec<Resource>),
    Embedded(Vec<EntityRecord>),
}

struct Cursor {
    resource: Resource,
    pipeline_id: Option<i64>,
    next: PageToken,
}

/// Page-by-page extraction of one entity type.
pub struct Extraction<'a> {
    extractor: &'a EntityExtractor,
    kind: EntityKind,
    project_id: Option<i64>,
    sources: VecDeque<Source>,
    cursor: Option<Cursor>,
}

impl EntityExtractor {
    /// `project` is the configured project id or `group/project` path.
    pub fn new(client: GitLabClient, project: impl Into<String>, pass_through: PassThrough) -> Self {
        Self {
            client,
            project: project.into(),
            pass_through,
            authors: OnceCell::new(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn project_resource(&self) -> Resource {
        Resource::project(&self.project)
    }

    fn listing(&self, kind: EntityKind, resource: Resource) -> Resource {
        match kind.listing_section() {
            Some(section) => resource.with_query(self.pass_through.query_params(section)),
            None => resource,
        }
    }

    /// Starts the extraction of `kind`, scoped to the identities in `references`.
    pub fn extract<'a>(&'a self, kind: EntityKind, references: &References) -> Extraction<'a> {
        let mut sources = VecDeque::new();
        match kind {
            EntityKind::Project => sources.push_back(Source::Single(self.project_resource())),
            EntityKind::Pipeline => sources.push_back(Source::Listing {
                resource: self.listing(kind, self.project_resource().join("pipelines")),
                pipeline_id: None,
            }),
            EntityKind::Job => {
                sources.extend(references.pipelines.iter().map(|&pipeline_id| {
                    let resource = self
                        .project_resource()
                        .join("pipelines")
                        .join(pipeline_id.to_string())
                        .join("jobs");
                    Source::Listing {
                        resource: self.listing(kind, resource),
                        pipeline_id: Some(pipeline_id),
                    }
                }));
            }
            EntityKind::Commit => {
                let resources = references.commits.iter().map(|sha| {
                    self.project_resource()
                        .join("repository")
                        .join("commits")
                        .join(sha.clone())
                });
                sources.extend(chunked(resources));
            }
            EntityKind::User => {
                sources.extend(chunked(references.users.iter().map(|&id| Resource::user(id))));
            }
            EntityKind::Runner => {
                let runners: Vec<EntityRecord> = references
                    .runners
                    .values()
                    .cloned()
                    .map(EntityRecord::Runner)
                    .collect();
                sources.extend(
                    runners
                        .chunks(ITEMS_PER_PAGE)
                        .map(|chunk| Source::Embedded(chunk.to_vec())),
                );
            }
        }

        debug!(
            "Prepared {} source(s) for {kind} extraction of project {}",
            sources.len(),
            self.project
        );

        Extraction {
            extractor: self,
            kind,
            project_id: references.project_id,
            sources,
            cursor: None,
        }
    }

    async fn authors(&self) -> Result<&AuthorDirectory> {
        self.authors
            .get_or_try_init(|| async {
                let resource = self.project_resource().join("users");
                let values: Vec<Value> = self.client.fetch_all(&resource).try_collect().await?;
                let members: Vec<UserRecord> =
                    values.into_iter().filter_map(UserRecord::from_value).collect();
                info!(
                    "Loaded {} member(s) of project {} for author resolution",
                    members.len(),
                    self.project
                );
                Ok::<_, G2GError>(AuthorDirectory::new(members))
            })
            .await
    }
}

fn chunked(resources: impl Iterator<Item = Resource>) -> Vec<Source> {
    let all: Vec<Resource> = resources.collect();
    all.chunks(ITEMS_PER_PAGE)
        .map(|chunk| Source::Items(chunk.to_vec()))
        .collect()
}

impl Extraction<'_> {
    /// Fetches and normalizes the next page, or `None` once exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<EntityRecord>>> {
        let extractor = self.extractor;
        let client = &extractor.client;

        let (values, pipeline_id) = if let Some(cursor) = self.cursor.take() {
            let page = client.fetch_page(&cursor.resource, Some(&cursor.next)).await?;
            let pipeline_id = cursor.pipeline_id;
            if let Some(next) = page.next {
                self.cursor = Some(Cursor { next, ..cursor });
            }
            (page.records, pipeline_id)
        } else {
            match self.sources.pop_front() {
                None => return Ok(None),
                Some(Source::Single(resource)) => (vec![client.fetch_one(&resource).await?], None),
                Some(Source::Listing {
                    resource,
                    pipeline_id,
                }) => {
                    let page = client.fetch_page(&resource, None).await?;
                    if let Some(next) = page.next {
                        self.cursor = Some(Cursor {
                            resource,
                            pipeline_id,
                            next,
                        });
                    }
                    (page.records, pipeline_id)
                }
                Some(Source::Items(resources)) => {
                    let values: Vec<Value> = stream::iter(&resources)
                        .then(|resource| client.fetch_one(resource))
                        .try_collect()
                        .await?;
                    (values, None)
                }
                Some(Source::Embedded(records)) => return Ok(Some(records)),
            }
        };

        self.normalize(values, pipeline_id).await.map(Some)
    }

    async fn normalize(
        &self,
        values: Vec<Value>,
        pipeline_id: Option<i64>,
    ) -> Result<Vec<EntityRecord>> {
        let records: Vec<EntityRecord> = match self.kind {
            EntityKind::Project => values
                .into_iter()
                .filter_map(ProjectRecord::from_value)
                .map(EntityRecord::Project)
                .collect(),
            EntityKind::Pipeline => values
                .into_iter()
                .filter_map(|v| PipelineRecord::from_value(v, self.project_id))
                .map(EntityRecord::Pipeline)
                .collect(),
            EntityKind::Job => {
                let Some(pipeline_id) = pipeline_id else {
                    return Ok(Vec::new());
                };
                values
                    .into_iter()
                    .filter_map(|v| JobRecord::from_value(v, pipeline_id))
                    .map(EntityRecord::Job)
                    .collect()
            }
            EntityKind::Commit => {
                let mut commits: Vec<CommitRecord> =
                    values.into_iter().filter_map(CommitRecord::from_value).collect();
                if !commits.is_empty() {
                    let authors = self.extractor.authors().await?;
                    for commit in &mut commits {
                        commit.author_id = authors.resolve(&commit.author_name, &commit.author_email);
                        if commit.author_id.is_none() {
                            debug!(
                                "No project member matches author '{}' of commit {}",
                                commit.author_name, commit.sha
                            );
                        }
                    }
                }
                commits.into_iter().map(EntityRecord::Commit).collect()
            }
            EntityKind::User => values
                .into_iter()
                .filter_map(UserRecord::from_value)
                .map(EntityRecord::User)
                .collect(),
            EntityKind::Runner => values
                .into_iter()
                .filter_map(RunnerRecord::from_value)
                .map(EntityRecord::Runner)
                .collect(),
        };
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Token;
    use crate::gitlab::RetryPolicy;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    fn member(id: i64, username: &str, name: &str) -> UserRecord {
        UserRecord::from_value(json!({"id": id, "username": username, "name": name})).unwrap()
    }

    fn extractor_for(server: &mockito::ServerGuard, pass_through: PassThrough) -> EntityExtractor {
        let client = GitLabClient::new(&server.url(), Token::from("t"))
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            });
        EntityExtractor::new(client, "1", pass_through)
    }

    async fn drain(mut extraction: Extraction<'_>) -> Vec<Vec<EntityRecord>> {
        let mut pages = Vec::new();
        while let Some(page) = extraction.next_page().await.unwrap() {
            pages.push(page);
        }
        pages
    }

    mod author_directory {
        use super::*;

        #[test]
        fn exact_name_wins_over_case_insensitive_match() {
            let directory = AuthorDirectory::new(vec![
                member(1, "ada", "ADA LOVELACE"),
                member(2, "lovelace", "Ada Lovelace"),
            ]);
            assert_eq!(directory.resolve("Ada Lovelace", ""), Some(2));
            assert_eq!(directory.resolve("ada lovelace", ""), Some(1));
        }

        #[test]
        fn email_local_part_matches_username() {
            let directory = AuthorDirectory::new(vec![member(5, "jdoe", "Jane Doe")]);
            assert_eq!(directory.resolve("J. Doe", "JDoe@example.com"), Some(5));
            assert_eq!(directory.resolve("Someone", "other@example.com"), None);
            assert_eq!(directory.resolve("", ""), None);
        }
    }

    mod extract {
        use super::*;

        #[tokio::test]
        async fn project_is_a_single_record_page() {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/api/v4/projects/1")
                .with_body(r#"{"id": 1, "name": "demo", "namespace": {"name": "group"}}"#)
                .create_async()
                .await;

            let extractor = extractor_for(&server, PassThrough::default());
            let pages = drain(extractor.extract(EntityKind::Project, &References::default())).await;

            assert_eq!(pages.len(), 1);
            match &pages[0][..] {
                [EntityRecord::Project(project)] => {
                    assert_eq!(project.id, 1);
                    assert_eq!(project.namespace, "group");
                }
                other => panic!("unexpected page: {other:?}"),
            }
        }

        #[tokio::test]
        async fn pipeline_listing_forwards_pass_through_parameters() {
            let mut server = mockito::Server::new_async().await;
            let listing = server
                .mock("GET", "/api/v4/projects/1/pipelines")
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("ref".to_string(), "main".to_string()),
                    Matcher::UrlEncoded("per_page".to_string(), "100".to_string()),
                ]))
                .with_body(r#"[{"id": 1, "sha": "abc123", "status": "success"}, {"status": "lost"}]"#)
                .create_async()
                .await;

            let config: crate::config::ProjectConfig = toml::from_str(
                r#"
[gitlab]
token = "t"
[neo4j]
hostname = "localhost"
protocol = "bolt"
port = 7687
db = "neo4j"
user = "neo4j"
password = "p"
[project]
project_id = 1
[pipelines]
ref = "main"
"#,
            )
            .unwrap();

            let extractor = extractor_for(&server, config.pass_through());
            let references = References {
                project_id: Some(1),
                ..References::default()
            };
            let pages = drain(extractor.extract(EntityKind::Pipeline, &references)).await;

            listing.assert_async().await;
            assert_eq!(pages.len(), 1);
            assert_eq!(pages[0].len(), 1);
        }

        #[tokio::test]
        async fn jobs_are_listed_per_referenced_pipeline() {
            let mut server = mockito::Server::new_async().await;
            for pipeline in [1, 2] {
                server
                    .mock("GET", format!("/api/v4/projects/1/pipelines/{pipeline}/jobs").as_str())
                    .match_query(Matcher::Any)
                    .with_body(json!([{"id": pipeline * 10, "stage": "build"}]).to_string())
                    .create_async()
                    .await;
            }

            let extractor = extractor_for(&server, PassThrough::default());
            let mut references = References::default();
            references.pipelines.extend([2, 1]);
            let pages = drain(extractor.extract(EntityKind::Job, &references)).await;

            let jobs: Vec<(i64, i64)> = pages
                .iter()
                .flatten()
                .map(|record| match record {
                    EntityRecord::Job(job) => (job.id, job.pipeline_id),
                    other => panic!("unexpected record: {other:?}"),
                })
                .collect();
            assert_eq!(jobs, vec![(20, 2), (10, 1)]);
        }

        #[tokio::test]
        async fn commits_are_attributed_to_project_members() {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/api/v4/projects/1/repository/commits/abc123")
                .with_body(
                    r#"{"id": "abc123", "author_name": "Jane Doe", "author_email": "jane@example.com", "parent_ids": []}"#,
                )
                .create_async()
                .await;
            let members = server
                .mock("GET", "/api/v4/projects/1/users")
                .match_query(Matcher::Any)
                .with_body(r#"[{"id": 5, "username": "jane", "name": "Jane Doe"}]"#)
                .expect(1)
                .create_async()
                .await;

            let extractor = extractor_for(&server, PassThrough::default());
            let mut references = References::default();
            references.commits.insert("abc123".to_string());
            let pages = drain(extractor.extract(EntityKind::Commit, &references)).await;

            match &pages[0][..] {
                [EntityRecord::Commit(commit)] => assert_eq!(commit.author_id, Some(5)),
                other => panic!("unexpected page: {other:?}"),
            }

            // The directory is loaded once per extractor.
            drain(extractor.extract(EntityKind::Commit, &references)).await;
            members.assert_async().await;
        }

        #[tokio::test]
        async fn referenced_items_are_grouped_into_pages() {
            let mut server = mockito::Server::new_async().await;
            let users = server
                .mock("GET", Matcher::Regex(r"^/api/v4/users/\d+$".to_string()))
                .with_body(r#"{"id": 1, "username": "jdoe"}"#)
                .expect(ITEMS_PER_PAGE + 1)
                .create_async()
                .await;

            let extractor = extractor_for(&server, PassThrough::default());
            let mut references = References::default();
            references.users.extend(1..=(ITEMS_PER_PAGE as i64 + 1));
            let pages = drain(extractor.extract(EntityKind::User, &references)).await;

            let sizes: Vec<usize> = pages.iter().map(Vec::len).collect();
            assert_eq!(sizes, vec![ITEMS_PER_PAGE, 1]);
            users.assert_async().await;
        }

        #[tokio::test]
        async fn runners_come_from_job_payloads_without_requests() {
            let server = mockito::Server::new_async().await;
            let extractor = extractor_for(&server, PassThrough::default());
            let mut references = References::default();
            for id in 1..=(ITEMS_PER_PAGE as i64 + 1) {
                references.observe(&EntityRecord::Job(
                    JobRecord::from_value(
                        json!({"id": id * 100, "runner": {"id": id, "description": "shared"}}),
                        1,
                    )
                    .unwrap(),
                ));
            }

            let pages = drain(extractor.extract(EntityKind::Runner, &references)).await;

            let sizes: Vec<usize> = pages.iter().map(Vec::len).collect();
            assert_eq!(sizes, vec![ITEMS_PER_PAGE, 1]);
            match &pages[1][0] {
                EntityRecord::Runner(runner) => {
                    assert_eq!(runner.id, ITEMS_PER_PAGE as i64 + 1);
                    assert_eq!(runner.description, "shared");
                }
                other => panic!("unexpected record: {other:?}"),
            }
        }

        #[tokio::test]
        async fn nothing_referenced_means_no_pages() {
            let server = mockito::Server::new_async().await;
            let extractor = extractor_for(&server, PassThrough::default());
            let pages = drain(extractor.extract(EntityKind::User, &References::default())).await;
            assert!(pages.is_empty());
        }
    }
}
