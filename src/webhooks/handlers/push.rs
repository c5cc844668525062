//! Handler for `push` events: starts postsubmits for the pushed branch.

use tracing::{debug, info, instrument};

use crate::catalog::{CatalogQuery, DeferredChanges, JobCatalog};
use crate::github::GitHubClient;
use crate::jobs::{JobStore, new_postsubmit_job};
use crate::trigger::create_with_retry;
use crate::webhooks::events::PushEvent;

use super::{Context, HandlerError};

/// Handles a push event.
///
/// Deleted refs and all-zero SHAs carry nothing to test. The first job that
/// cannot be created ends the handling.
#[instrument(skip_all, fields(repo = %event.repo, git_ref = %event.git_ref, sha = %event.after.short()))]
pub async fn handle_push<G, J, C>(
    ctx: &Context<G, J, C>,
    event: &PushEvent,
) -> Result<(), HandlerError>
where
    G: GitHubClient + 'static,
    J: JobStore,
    C: JobCatalog,
{
    if event.deleted || event.after.is_zero() {
        debug!("Ref deleted, nothing to run");
        return Ok(());
    }

    let branch = event.branch();
    let postsubmits = ctx
        .catalog
        .postsubmits(CatalogQuery {
            repo: &event.repo,
            base_ref: branch,
            head_sha: None,
        })
        .await?;
    let changes = DeferredChanges::known(event.changed_files.clone());

    for job in &postsubmits {
        if !job.should_run(branch, &changes).await? {
            continue;
        }
        info!(job = %job.name, "Starting postsubmit");
        let record = new_postsubmit_job(job, &event.repo, branch, &event.after, &event.guid);
        create_with_retry(&ctx.jobs, &record, ctx.retry)
            .await
            .map_err(|source| HandlerError::Postsubmit {
                job: job.name.clone(),
                source,
            })?;
    }
    Ok(())
}
