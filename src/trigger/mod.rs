//! Acting on a filtered job set: creating job records for the jobs to run and
//! posting "Skipped." statuses for the rest.
//!
//! Every job is attempted even when earlier ones fail; failures come back
//! together as an [`AggregateError`]. The one exception is a context that is
//! both run and skipped, which is refused before anything happens.

pub mod abort;

use std::collections::BTreeSet;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::catalog::Presubmit;
use crate::errors::AggregateError;
use crate::github::{GitHubApiError, PullRequestClient, StatusClient};
use crate::jobs::{JobRecord, JobStore, JobStoreError, new_presubmit_job};
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::types::{CommitStatus, EventGuid, PullRequest, RepoId, Sha};

pub use abort::abort_all_jobs;

#[derive(Debug, Error)]
pub enum TriggerError {
    /// Refused before any side effect.
    #[error("the following contexts are both triggered and skipped: {}", .0.join(", "))]
    OverlappingContexts(Vec<String>),

    #[error("failed to get base SHA for {repo}@{base_ref}: {source}")]
    BaseSha {
        repo: RepoId,
        base_ref: String,
        #[source]
        source: GitHubApiError,
    },

    #[error("failed to create job {job}: {source}")]
    CreateJob {
        job: String,
        #[source]
        source: JobStoreError,
    },

    #[error("failed to create status for context {context}: {source}")]
    SkipStatus {
        context: String,
        #[source]
        source: GitHubApiError,
    },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Refuses job sets that would both run and skip one context.
pub fn validate_context_overlap(
    to_run: &[Presubmit],
    to_skip: &[Presubmit],
) -> Result<(), TriggerError> {
    let running: BTreeSet<&str> = to_run.iter().map(|job| job.context.as_str()).collect();
    let overlapping: BTreeSet<&str> = to_skip
        .iter()
        .map(|job| job.context.as_str())
        .filter(|context| running.contains(context))
        .collect();
    if overlapping.is_empty() {
        Ok(())
    } else {
        Err(TriggerError::OverlappingContexts(
            overlapping.into_iter().map(str::to_string).collect(),
        ))
    }
}

/// The current tip of a PR's base branch, looked up on first use and shared
/// by every job created for one event.
pub struct LazyBaseSha<'a, G> {
    client: &'a G,
    repo: &'a RepoId,
    base_ref: &'a str,
    cell: OnceCell<Sha>,
}

impl<'a, G: PullRequestClient> LazyBaseSha<'a, G> {
    pub fn new(client: &'a G, repo: &'a RepoId, base_ref: &'a str) -> Self {
        Self {
            client,
            repo,
            base_ref,
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<&Sha, TriggerError> {
        let git_ref = format!("heads/{}", self.base_ref);
        self.cell
            .get_or_try_init(|| self.client.get_ref(self.repo, &git_ref))
            .await
            .map_err(|source| TriggerError::BaseSha {
                repo: self.repo.clone(),
                base_ref: self.base_ref.to_string(),
                source,
            })
    }
}

/// Creates a job record, retrying every failure except "already exists",
/// which counts as success.
pub async fn create_with_retry<J: JobStore>(
    store: &J,
    record: &JobRecord,
    retry: RetryConfig,
) -> Result<(), JobStoreError> {
    let result = retry_with_backoff(
        retry,
        |e: &JobStoreError| !e.is_already_exists(),
        || async move { store.create(record).await },
    )
    .await
    .into_result();

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e),
    }
}

/// What the executor needs besides the jobs themselves.
pub struct TriggerContext<'a, G, J> {
    pub github: &'a G,
    pub jobs: &'a J,
    pub retry: RetryConfig,
    pub event_guid: &'a EventGuid,
}

/// Creates a job record for each of `to_run`.
pub async fn run_requested<G, J>(
    ctx: &TriggerContext<'_, G, J>,
    pr: &PullRequest,
    base_sha: &LazyBaseSha<'_, G>,
    to_run: &[Presubmit],
) -> Vec<TriggerError>
where
    G: PullRequestClient,
    J: JobStore,
{
    if to_run.is_empty() {
        return Vec::new();
    }
    let base_sha = match base_sha.get().await {
        Ok(sha) => sha,
        Err(e) => return vec![e],
    };

    let mut errors = Vec::new();
    for job in to_run {
        info!(repo = %pr.repo, pr = %pr.number, job = %job.name, "Starting job");
        let record = new_presubmit_job(job, pr, base_sha, ctx.event_guid);
        if let Err(source) = create_with_retry(ctx.jobs, &record, ctx.retry).await {
            warn!(job = %job.name, error = %source, "Failed to create job");
            errors.push(TriggerError::CreateJob {
                job: job.name.clone(),
                source,
            });
        }
    }
    errors
}

/// Posts a "Skipped." status on the PR head for each reporting job.
pub async fn skip_requested<G: StatusClient>(
    github: &G,
    pr: &PullRequest,
    to_skip: &[Presubmit],
) -> Vec<TriggerError> {
    let mut errors = Vec::new();
    for job in to_skip.iter().filter(|job| !job.skip_report) {
        let status = CommitStatus::skipped(job.context.clone());
        if let Err(source) = github.create_status(&pr.repo, &pr.head_sha, &status).await {
            warn!(context = %job.context, error = %source, "Failed to post skipped status");
            errors.push(TriggerError::SkipStatus {
                context: job.context.clone(),
                source,
            });
        }
    }
    errors
}

/// Runs `to_run` and reports `to_skip` as skipped.
///
/// With `elide_skipped_contexts` no skip statuses are posted at all.
pub async fn run_and_skip_jobs<G, J>(
    ctx: &TriggerContext<'_, G, J>,
    pr: &PullRequest,
    base_sha: &LazyBaseSha<'_, G>,
    to_run: &[Presubmit],
    to_skip: &[Presubmit],
    elide_skipped_contexts: bool,
) -> Result<(), TriggerError>
where
    G: PullRequestClient + StatusClient,
    J: JobStore,
{
    if let Err(e) = validate_context_overlap(to_run, to_skip) {
        warn!(repo = %pr.repo, pr = %pr.number, error = %e, "Could not run or skip requested jobs");
        return Err(e);
    }

    let mut errors = run_requested(ctx, pr, base_sha, to_run).await;
    if !elide_skipped_contexts {
        errors.extend(skip_requested(ctx.github, pr, to_skip).await);
    }
    AggregateError::check(errors)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PresubmitConfig;
    use crate::jobs::InMemoryJobStore;
    use crate::test_utils::{FakeGitHub, FlakyJobStore, sample_pr};
    use crate::types::StatusState;
    use std::time::Duration;

    fn job(name: &str, context: &str) -> Presubmit {
        Presubmit::compile(PresubmitConfig {
            name: name.to_string(),
            context: Some(context.to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn no_wait() -> RetryConfig {
        RetryConfig::job_creation(Duration::ZERO)
    }

    #[test]
    fn overlap_names_every_shared_context() {
        let err = validate_context_overlap(
            &[job("a", "ctx-a"), job("b", "ctx-b")],
            &[job("b2", "ctx-b"), job("a2", "ctx-a"), job("c", "ctx-c")],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "the following contexts are both triggered and skipped: ctx-a, ctx-b"
        );
    }

    #[tokio::test]
    async fn overlap_has_no_side_effects() {
        let gh = FakeGitHub::new();
        let store = InMemoryJobStore::new();
        let guid = EventGuid::new("guid");
        let ctx = TriggerContext {
            github: &gh,
            jobs: &store,
            retry: no_wait(),
            event_guid: &guid,
        };
        let pr = sample_pr();
        let base = LazyBaseSha::new(&gh, &pr.repo, &pr.base_ref);

        let result = run_and_skip_jobs(
            &ctx,
            &pr,
            &base,
            &[job("a", "shared")],
            &[job("b", "shared")],
            false,
        )
        .await;
        assert!(matches!(result, Err(TriggerError::OverlappingContexts(_))));
        assert!(store.is_empty());
        assert!(gh.statuses().is_empty());
        assert_eq!(gh.ref_reads(), 0);
    }

    #[tokio::test]
    async fn runs_and_skips_with_one_base_lookup() {
        let gh = FakeGitHub::new();
        let pr = sample_pr();
        gh.set_ref(&pr.repo, &format!("heads/{}", pr.base_ref), "tip");
        let store = InMemoryJobStore::new();
        let guid = EventGuid::new("guid");
        let ctx = TriggerContext {
            github: &gh,
            jobs: &store,
            retry: no_wait(),
            event_guid: &guid,
        };
        let base = LazyBaseSha::new(&gh, &pr.repo, &pr.base_ref);

        run_and_skip_jobs(
            &ctx,
            &pr,
            &base,
            &[job("a", "a"), job("b", "b")],
            &[job("c", "c")],
            false,
        )
        .await
        .unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.all().iter().all(|r| r.spec.refs.base_sha == Sha::new("tip")));
        assert_eq!(gh.ref_reads(), 1);

        let statuses = gh.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].1.context, "c");
        assert_eq!(statuses[0].1.state, StatusState::Success);
        assert_eq!(statuses[0].1.description, "Skipped.");
        assert_eq!(statuses[0].0, pr.head_sha);
    }

    #[tokio::test]
    async fn elided_and_unreported_skips_post_nothing() {
        let gh = FakeGitHub::new();
        let pr = sample_pr();
        let store = InMemoryJobStore::new();
        let guid = EventGuid::new("guid");
        let ctx = TriggerContext {
            github: &gh,
            jobs: &store,
            retry: no_wait(),
            event_guid: &guid,
        };
        let base = LazyBaseSha::new(&gh, &pr.repo, &pr.base_ref);
        let silent = Presubmit::compile(PresubmitConfig {
            name: "silent".to_string(),
            skip_report: true,
            ..Default::default()
        })
        .unwrap();

        run_and_skip_jobs(&ctx, &pr, &base, &[], &[job("c", "c")], true)
            .await
            .unwrap();
        run_and_skip_jobs(&ctx, &pr, &base, &[], &[silent], false)
            .await
            .unwrap();

        assert!(gh.statuses().is_empty());
        assert_eq!(gh.ref_reads(), 0);
    }

    #[tokio::test]
    async fn every_job_is_attempted_and_failures_aggregate() {
        let gh = FakeGitHub::new();
        let pr = sample_pr();
        gh.set_ref(&pr.repo, &format!("heads/{}", pr.base_ref), "tip");
        gh.fail_status_for("c");
        let store = FlakyJobStore::failing_jobs(&["a"]);
        let guid = EventGuid::new("guid");
        let ctx = TriggerContext {
            github: &gh,
            jobs: &store,
            retry: no_wait(),
            event_guid: &guid,
        };
        let base = LazyBaseSha::new(&gh, &pr.repo, &pr.base_ref);

        let err = run_and_skip_jobs(
            &ctx,
            &pr,
            &base,
            &[job("a", "a"), job("b", "b")],
            &[job("c", "c"), job("d", "d")],
            false,
        )
        .await
        .unwrap_err();

        let TriggerError::Aggregate(aggregate) = &err else {
            panic!("expected aggregate, got {err:?}");
        };
        assert_eq!(aggregate.len(), 2);
        let message = err.to_string();
        assert!(message.starts_with("[failed to create job a"));
        assert!(message.contains("failed to create status for context c"));
        assert_eq!(store.created_names(), vec!["b".to_string()]);
        assert_eq!(store.attempts_for("a"), 8);
        assert_eq!(gh.statuses().len(), 1);
    }

    #[tokio::test]
    async fn already_exists_counts_as_created() {
        let store = FlakyJobStore::already_existing();
        let pr = sample_pr();
        let record = new_presubmit_job(
            &job("a", "a"),
            &pr,
            &Sha::new("tip"),
            &EventGuid::new("guid"),
        );
        create_with_retry(&store, &record, no_wait()).await.unwrap();
        assert_eq!(store.attempts_for("a"), 1);
    }

    #[tokio::test]
    async fn transient_creation_failures_are_retried() {
        let store = FlakyJobStore::failing_first(2);
        let pr = sample_pr();
        let record = new_presubmit_job(
            &job("a", "a"),
            &pr,
            &Sha::new("tip"),
            &EventGuid::new("guid"),
        );
        create_with_retry(&store, &record, no_wait()).await.unwrap();
        assert_eq!(store.attempts_for("a"), 3);
        assert_eq!(store.created_names(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn base_sha_failure_is_reported_and_skips_still_post() {
        let gh = FakeGitHub::new();
        let pr = sample_pr();
        let store = InMemoryJobStore::new();
        let guid = EventGuid::new("guid");
        let ctx = TriggerContext {
            github: &gh,
            jobs: &store,
            retry: no_wait(),
            event_guid: &guid,
        };
        let base = LazyBaseSha::new(&gh, &pr.repo, &pr.base_ref);

        let err = run_and_skip_jobs(&ctx, &pr, &base, &[job("a", "a")], &[job("c", "c")], false)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to get base SHA"));
        assert!(store.is_empty());
        assert_eq!(gh.statuses().len(), 1);
    }
}
