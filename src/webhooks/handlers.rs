//! Event handlers: what the trigger does for each webhook event.
//!
//! # Event Types
//!
//! | Event | Handler |
//! |-------|---------|
//! | `pull_request` | [`handle_pull_request`] - open, update, label, close |
//! | comments | [`handle_generic_comment`] - `/test`, `/retest`, `/ok-to-test` |
//! | `push` | [`handle_push`] - postsubmits |
//!
//! Handlers read fresh state from GitHub and the job catalog on every call and
//! keep nothing between events. Concurrent duplicate deliveries are tolerated
//! because job creation treats "already exists" as success.

mod generic_comment;
mod pull_request;
mod push;


use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::catalog::{CatalogError, CatalogQuery, JobCatalog, Presubmit};
use crate::commands::CommandPatterns;
use crate::config::Config;
use crate::errors::AggregateError;
use crate::filter::FilteredJobs;
use crate::github::{GitHubApiError, GitHubClient};
use crate::jobs::{JobStore, JobStoreError};
use crate::retry::RetryConfig;
use crate::trigger::{LazyBaseSha, TriggerContext, TriggerError, abort::AbortError, run_and_skip_jobs};
use crate::trust::TrustError;
use crate::types::{EventGuid, PullRequest};
use crate::webhooks::GitHubEvent;

pub use generic_comment::handle_generic_comment;
pub use pull_request::handle_pull_request;
pub use push::handle_push;

/// Errors that can occur during event handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    GitHub(#[from] GitHubApiError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error("failed to abort jobs for {pr}: {source}")]
    Abort {
        pr: String,
        #[source]
        source: AbortError,
    },

    #[error("failed to create postsubmit {job}: {source}")]
    Postsubmit {
        job: String,
        #[source]
        source: JobStoreError,
    },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Everything a handler needs, shared by every event.
pub struct Context<G, J, C> {
    pub github: Arc<G>,
    pub jobs: J,
    pub catalog: C,
    pub config: Config,
    pub patterns: CommandPatterns,
    /// Backoff for job creation.
    pub retry: RetryConfig,
}

impl<G, J, C> Context<G, J, C>
where
    G: GitHubClient + 'static,
    J: JobStore,
    C: JobCatalog,
{
    pub fn new(github: Arc<G>, jobs: J, catalog: C, config: Config) -> Result<Self, regex::Error> {
        Ok(Context {
            github,
            jobs,
            catalog,
            config,
            patterns: CommandPatterns::new()?,
            retry: RetryConfig::JOB_CREATION,
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn trigger_context<'a>(&'a self, event_guid: &'a EventGuid) -> TriggerContext<'a, G, J> {
        TriggerContext {
            github: &*self.github,
            jobs: &self.jobs,
            retry: self.retry,
            event_guid,
        }
    }

    /// Presubmits for a PR, as of its head commit.
    async fn presubmits_for(
        &self,
        pr: &PullRequest,
    ) -> Result<Vec<Presubmit>, CatalogError> {
        self.catalog
            .presubmits(CatalogQuery {
                repo: &pr.repo,
                base_ref: &pr.base_ref,
                head_sha: Some(&pr.head_sha),
            })
            .await
    }
}

/// Dispatches a webhook event to its handler.
pub async fn handle_event<G, J, C>(
    ctx: &Context<G, J, C>,
    event: &GitHubEvent,
) -> Result<(), HandlerError>
where
    G: GitHubClient + 'static,
    J: JobStore,
    C: JobCatalog,
{
    match event {
        GitHubEvent::PullRequest(e) => handle_pull_request(ctx, e).await,
        GitHubEvent::GenericComment(e) => handle_generic_comment(ctx, e).await,
        GitHubEvent::Push(e) => handle_push(ctx, e).await,
    }
}

/// Runs and skips the filtered jobs against `pr`, with the base SHA looked up
/// on demand.
async fn run_filtered<G, J, C>(
    ctx: &Context<G, J, C>,
    pr: &PullRequest,
    event_guid: &EventGuid,
    filtered: &FilteredJobs,
) -> Result<(), HandlerError>
where
    G: GitHubClient + 'static,
    J: JobStore,
    C: JobCatalog,
{
    let trigger = ctx.config.trigger_for(&pr.repo);
    info!(
        repo = %pr.repo,
        pr = %pr.number,
        to_run = ?filtered.run_names(),
        to_skip = ?filtered.skip_names(),
        "Running presubmits"
    );
    let base_sha = LazyBaseSha::new(&*ctx.github, &pr.repo, &pr.base_ref);
    run_and_skip_jobs(
        &ctx.trigger_context(event_guid),
        pr,
        &base_sha,
        &filtered.to_run,
        &filtered.to_skip,
        trigger.elide_skipped_contexts,
    )
    .await?;
    Ok(())
}
