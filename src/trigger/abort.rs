//! Aborting a pull request's presubmits when it closes or goes back to draft.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::errors::AggregateError;
use crate::jobs::{JobState, JobStore, JobStoreError, LabelSelector};
use crate::types::PullRequest;

const ABORTED_DESCRIPTION: &str = "Aborted as the pull request is no longer testable.";

#[derive(Debug, Error)]
pub enum AbortError {
    #[error("failed to list jobs for {pr}: {source}")]
    List {
        pr: String,
        #[source]
        source: JobStoreError,
    },

    #[error("failed to abort job {job}: {source}")]
    Update {
        job: String,
        #[source]
        source: JobStoreError,
    },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Marks every unfinished presubmit of `pr` as aborted.
///
/// A record that changed under us is left alone; whoever changed it owns it
/// now. Other update failures are collected and the remaining jobs are still
/// attempted.
pub async fn abort_all_jobs<J: JobStore>(store: &J, pr: &PullRequest) -> Result<(), AbortError> {
    let selector = LabelSelector::for_pull_request(&pr.repo, pr.number.0);
    let jobs = store
        .list(&selector)
        .await
        .map_err(|source| AbortError::List {
            pr: format!("{}{}", pr.repo, pr.number),
            source,
        })?;

    let mut errors = Vec::new();
    for mut job in jobs.into_iter().filter(|job| !job.is_complete()) {
        job.status.state = JobState::Aborted;
        job.status.completion_time = Some(Utc::now());
        job.status.description = ABORTED_DESCRIPTION.to_string();

        match store.update(&job).await {
            Ok(_) => info!(job = %job.name, pr = %pr.number, "Aborted job"),
            Err(e) if e.is_conflict() => {
                debug!(job = %job.name, "Job changed while aborting, leaving it")
            }
            Err(source) => errors.push(AbortError::Update {
                job: job.name.clone(),
                source,
            }),
        }
    }

    AggregateError::check(errors)?;
    Ok(())
}
