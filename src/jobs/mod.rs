//! Job records and the store that the CI scheduler reads them from.
//!
//! The trigger only creates records and marks them aborted; running them is
//! somebody else's business. [`JobStore`] is the seam to wherever records
//! live, with optimistic concurrency on updates.

mod memory;

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::{Postsubmit, Presubmit};
use crate::types::{EventGuid, PullRequest, RepoId, Sha};

pub use memory::InMemoryJobStore;

/// Value of [`CREATED_BY_LABEL`] on records this service creates.
pub const CREATED_BY: &str = "presubmit-trigger";

pub const CREATED_BY_LABEL: &str = "created-by";
pub const JOB_LABEL: &str = "job";
pub const TYPE_LABEL: &str = "type";
pub const ORG_LABEL: &str = "org";
pub const REPO_LABEL: &str = "repo";
pub const PULL_LABEL: &str = "pull";
pub const BASE_REF_LABEL: &str = "base-ref";
pub const EVENT_GUID_LABEL: &str = "event-guid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Presubmit,
    Postsubmit,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Presubmit => "presubmit",
            JobKind::Postsubmit => "postsubmit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Triggered,
    Pending,
    Success,
    Failure,
    Aborted,
    Error,
}

/// A pull request a job tests, as of trigger time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRef {
    pub number: u64,
    pub author: String,
    pub sha: Sha,
}

/// The code a job runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refs {
    pub org: String,
    pub repo: String,
    pub base_ref: String,
    pub base_sha: Sha,
    pub pulls: Vec<PullRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub kind: JobKind,
    pub job: String,
    /// Status context the job reports to. Empty for postsubmits.
    pub context: String,
    pub refs: Refs,
    pub rerun_command: String,
    pub report: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub completion_time: Option<DateTime<Utc>>,
}

/// A request to run one CI job, as kept by the job store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub spec: JobSpec,
    pub status: JobStatus,
    /// Bumped by the store on every write; updates must carry the version
    /// they read.
    pub resource_version: u64,
}

impl JobRecord {
    pub fn is_complete(&self) -> bool {
        self.status.completion_time.is_some()
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Names are derived from the delivery, the job and the commit under
    /// test, so a redelivered event maps onto the records it already created.
    fn new(spec: JobSpec, labels: BTreeMap<String, String>, event_guid: &EventGuid) -> Self {
        let tested = match spec.refs.pulls.first() {
            Some(pull) => format!("{}@{}", pull.number, pull.sha),
            None => spec.refs.base_sha.to_string(),
        };
        let key = format!(
            "{}/{}/{}/{}/{}/{}",
            event_guid,
            spec.kind.as_str(),
            spec.refs.org,
            spec.refs.repo,
            spec.job,
            tested
        );
        JobRecord {
            name: Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string(),
            labels,
            spec,
            status: JobStatus {
                state: JobState::Triggered,
                description: String::new(),
                start_time: Utc::now(),
                completion_time: None,
            },
            resource_version: 0,
        }
    }
}

fn base_labels(
    kind: JobKind,
    job: &str,
    repo: &RepoId,
    base_ref: &str,
    event_guid: &EventGuid,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CREATED_BY_LABEL.to_string(), CREATED_BY.to_string()),
        (JOB_LABEL.to_string(), job.to_string()),
        (TYPE_LABEL.to_string(), kind.as_str().to_string()),
        (ORG_LABEL.to_string(), repo.owner.clone()),
        (REPO_LABEL.to_string(), repo.repo.clone()),
        (BASE_REF_LABEL.to_string(), base_ref.to_string()),
        (EVENT_GUID_LABEL.to_string(), event_guid.as_str().to_string()),
    ])
}

/// A record asking for `job` to test `pr` merged into `base_sha`.
pub fn new_presubmit_job(
    job: &Presubmit,
    pr: &PullRequest,
    base_sha: &Sha,
    event_guid: &EventGuid,
) -> JobRecord {
    let mut labels = base_labels(
        JobKind::Presubmit,
        &job.name,
        &pr.repo,
        &pr.base_ref,
        event_guid,
    );
    labels.insert(PULL_LABEL.to_string(), pr.number.0.to_string());

    JobRecord::new(
        JobSpec {
            kind: JobKind::Presubmit,
            job: job.name.clone(),
            context: job.context.clone(),
            refs: Refs {
                org: pr.repo.owner.clone(),
                repo: pr.repo.repo.clone(),
                base_ref: pr.base_ref.clone(),
                base_sha: base_sha.clone(),
                pulls: vec![PullRef {
                    number: pr.number.0,
                    author: pr.author.clone(),
                    sha: pr.head_sha.clone(),
                }],
            },
            rerun_command: job.rerun_command.clone(),
            report: !job.skip_report,
        },
        labels,
        event_guid,
    )
}

/// A record asking for `job` to run against a pushed commit.
pub fn new_postsubmit_job(
    job: &Postsubmit,
    repo: &RepoId,
    branch: &str,
    sha: &Sha,
    event_guid: &EventGuid,
) -> JobRecord {
    JobRecord::new(
        JobSpec {
            kind: JobKind::Postsubmit,
            job: job.name.clone(),
            context: String::new(),
            refs: Refs {
                org: repo.owner.clone(),
                repo: repo.repo.clone(),
                base_ref: branch.to_string(),
                base_sha: sha.clone(),
                pulls: Vec::new(),
            },
            rerun_command: String::new(),
            report: true,
        },
        base_labels(JobKind::Postsubmit, &job.name, repo, branch, event_guid),
        event_guid,
    )
}

/// Exact-match label query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector(BTreeMap<String, String>);

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Presubmit records for one pull request.
    pub fn for_pull_request(repo: &RepoId, number: u64) -> Self {
        LabelSelector::new()
            .with(ORG_LABEL, repo.owner.clone())
            .with(REPO_LABEL, repo.repo.clone())
            .with(PULL_LABEL, number.to_string())
            .with(TYPE_LABEL, JobKind::Presubmit.as_str())
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("job {0} already exists")]
    AlreadyExists(String),

    /// The record changed since it was read.
    #[error("conflict updating job {name}: have version {expected}, store has {actual}")]
    Conflict {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("job {0} not found")]
    NotFound(String),

    #[error("job store error: {0}")]
    Other(String),
}

impl JobStoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, JobStoreError::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, JobStoreError::Conflict { .. })
    }
}

/// Where job records live.
pub trait JobStore: Send + Sync {
    fn create(&self, job: &JobRecord)
    -> impl Future<Output = Result<JobRecord, JobStoreError>> + Send;

    fn list(
        &self,
        selector: &LabelSelector,
    ) -> impl Future<Output = Result<Vec<JobRecord>, JobStoreError>> + Send;

    /// Replaces a record. Fails with [`JobStoreError::Conflict`] unless
    /// `job.resource_version` matches the stored version.
    fn update(&self, job: &JobRecord)
    -> impl Future<Output = Result<JobRecord, JobStoreError>> + Send;
}
