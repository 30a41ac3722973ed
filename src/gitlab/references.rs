use indexmap::{IndexMap, IndexSet};

use super::types::{EntityRecord, RunnerRecord};

/// Identities collected by earlier passes that later passes fetch.
///
/// Insertion-ordered and de-duplicated, so passes are deterministic and each
/// referenced entity is fetched once per run. Runners are not fetched: the
/// latest summary embedded in a job payload is kept instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    pub project_id: Option<i64>,
    pub pipelines: IndexSet<i64>,
    pub commits: IndexSet<String>,
    pub users: IndexSet<i64>,
    pub runners: IndexMap<i64, RunnerRecord>,
}

impl References {
    pub fn observe(&mut self, record: &EntityRecord) {
        match record {
            EntityRecord::Project(project) => {
                self.project_id = Some(project.id);
            }
            EntityRecord::Pipeline(pipeline) => {
                self.pipelines.insert(pipeline.id);
                if !pipeline.sha.is_empty() {
                    self.commits.insert(pipeline.sha.clone());
                }
            }
            EntityRecord::Job(job) => {
                if let Some(runner) = &job.runner {
                    self.runners.insert(runner.id, runner.clone());
                }
            }
            EntityRecord::Commit(commit) => {
                if let Some(author_id) = commit.author_id {
                    self.users.insert(author_id);
                }
            }
            EntityRecord::User(_) | EntityRecord::Runner(_) => {}
        }
    }

    pub fn observe_page(&mut self, records: &[EntityRecord]) {
        for record in records {
            self.observe(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitlab::types::{JobRecord, PipelineRecord};
    use serde_json::json;

    #[test]
    fn repeated_references_keep_first_position() {
        let pipelines: Vec<EntityRecord> = [(3, "abc"), (1, "def"), (3, "abc"), (2, "abc")]
            .into_iter()
            .map(|(id, sha)| {
                EntityRecord::Pipeline(
                    PipelineRecord::from_value(json!({"id": id, "sha": sha}), Some(1)).unwrap(),
                )
            })
            .collect();

        let mut references = References::default();
        references.observe_page(&pipelines);

        assert_eq!(references.pipelines.iter().copied().collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(
            references.commits.iter().cloned().collect::<Vec<_>>(),
            vec!["abc".to_string(), "def".to_string()]
        );
    }

    #[test]
    fn jobs_without_runner_add_nothing() {
        let mut references = References::default();
        references.observe(&EntityRecord::Job(
            JobRecord::from_value(json!({"id": 10}), 1).unwrap(),
        ));
        assert!(references.runners.is_empty());

        references.observe(&EntityRecord::Job(
            JobRecord::from_value(json!({"id": 11, "runner": {"id": 4}}), 1).unwrap(),
        ));
        assert!(references.runners.contains_key(&4));
    }

    #[test]
    fn later_job_refreshes_runner_summary_in_place() {
        let mut references = References::default();
        for (job, status) in [(10, "online"), (11, "offline")] {
            references.observe(&EntityRecord::Job(
                JobRecord::from_value(
                    json!({"id": job, "runner": {"id": 4, "status": status}}),
                    1,
                )
                .unwrap(),
            ));
        }
        references.observe(&EntityRecord::Job(
            JobRecord::from_value(json!({"id": 12, "runner": {"id": 2}}), 1).unwrap(),
        ));

        assert_eq!(references.runners.keys().copied().collect::<Vec<_>>(), vec![4, 2]);
        assert_eq!(references.runners[&4].status, "offline");
    }
}
