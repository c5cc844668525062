//! Handler for `pull_request` webhook events.
//!
//! | Action | Effect |
//! |--------|--------|
//! | `opened` | trusted author: run all; untrusted: welcome and `needs-ok-to-test` |
//! | `reopened`, `synchronize`, `ready_for_review` | run all if the PR is trusted |
//! | `edited` | as above, only when the base changed |
//! | `labeled` | `lgtm` on an untrusted PR, or `ok-to-test` from a person: run all |
//! | `closed`, `converted_to_draft` | abort the PR's unfinished jobs |

use tracing::{debug, info, instrument};

use crate::catalog::{DeferredChanges, JobCatalog, Presubmit, PullRequestChanges};
use crate::config::TriggerConfig;
use crate::errors::AggregateError;
use crate::filter::{Filter, FilterSet, filter_presubmits};
use crate::github::{GitHubApiError, GitHubClient};
use crate::jobs::JobStore;
use crate::respond::{DRAFT_SKIPPED, WELCOME_MARKER, welcome_message};
use crate::trigger::abort_all_jobs;
use crate::trust::{trusted_pull_request, trusted_user};
use crate::types::{LGTM_LABEL, NEEDS_OK_TO_TEST_LABEL, OK_TO_TEST_LABEL, PullRequest, has_label};
use crate::webhooks::events::{PrAction, PullRequestEvent};

use super::{Context, HandlerError, run_filtered};

/// Handles a pull request event.
#[instrument(skip_all, fields(repo = %event.pull_request.repo, pr = %event.pull_request.number, action = ?event.action))]
pub async fn handle_pull_request<G, J, C>(
    ctx: &Context<G, J, C>,
    event: &PullRequestEvent,
) -> Result<(), HandlerError>
where
    G: GitHubClient + 'static,
    J: JobStore,
    C: JobCatalog,
{
    let pr = &event.pull_request;
    let trigger = ctx.config.trigger_for(&pr.repo);

    match event.action {
        PrAction::Closed | PrAction::ConvertedToDraft => {
            info!("Aborting unfinished jobs");
            abort_all_jobs(&ctx.jobs, pr)
                .await
                .map_err(|source| HandlerError::Abort {
                    pr: format!("{}{}", pr.repo, pr.number),
                    source,
                })
        }
        PrAction::Opened => handle_opened(ctx, event, &trigger).await,
        PrAction::Reopened | PrAction::Synchronize | PrAction::ReadyForReview => {
            build_all_if_trusted(ctx, event, &trigger).await
        }
        PrAction::Edited => {
            if event.base_changed {
                build_all_if_trusted(ctx, event, &trigger).await
            } else {
                debug!("Edit did not change the base, ignoring");
                Ok(())
            }
        }
        PrAction::Labeled => handle_labeled(ctx, event, &trigger).await,
    }
}

/// A new PR: test it straight away if the author is trusted, otherwise greet
/// them and wait for `/ok-to-test`.
async fn handle_opened<G, J, C>(
    ctx: &Context<G, J, C>,
    event: &PullRequestEvent,
    trigger: &TriggerConfig,
) -> Result<(), HandlerError>
where
    G: GitHubClient + 'static,
    J: JobStore,
    C: JobCatalog,
{
    let pr = &event.pull_request;
    let presubmits = ctx.presubmits_for(pr).await?;
    if presubmits.is_empty() {
        debug!("No presubmits configured");
        return Ok(());
    }

    let decision = trusted_user(&*ctx.github, &trigger.trust_policy(), &pr.author, &pr.repo).await?;
    if decision.trusted {
        if pr.is_draft && trigger.skip_draft_pr {
            if bot_commented(&*ctx.github, pr, DRAFT_SKIPPED).await? {
                debug!("Draft notice already posted");
            } else {
                info!("Skipping CI for draft PR");
                ctx.github
                    .create_comment(&pr.repo, pr.number, DRAFT_SKIPPED)
                    .await?;
            }
            return Ok(());
        }
        info!("Starting all jobs for new PR");
        return build_all(ctx, event, &presubmits).await;
    }

    info!(author = %pr.author, reason = %decision.reason, "Welcoming untrusted PR author");
    let welcome = welcome_message(
        &pr.repo,
        &pr.author,
        &trigger.welcome_options(ctx.config.commands_url.as_deref()),
        ctx.config.about(),
    );
    let mut errors: Vec<GitHubApiError> = Vec::new();
    if !trigger.ignore_ok_to_test
        && let Err(e) = ctx
            .github
            .add_label(&pr.repo, pr.number, NEEDS_OK_TO_TEST_LABEL)
            .await
    {
        errors.push(e);
    }
    match bot_commented(&*ctx.github, pr, WELCOME_MARKER).await {
        Ok(true) => debug!("Welcome already posted"),
        Ok(false) => {
            if let Err(e) = ctx.github.create_comment(&pr.repo, pr.number, &welcome).await {
                errors.push(e);
            }
        }
        Err(e) => errors.push(e),
    }
    AggregateError::check(errors)?;
    Ok(())
}

/// Whether the bot already left a comment containing `marker` on the PR, as
/// it does when GitHub redelivers an event.
async fn bot_commented<G: GitHubClient>(
    github: &G,
    pr: &PullRequest,
    marker: &str,
) -> Result<bool, GitHubApiError> {
    let comments = github.list_comments(&pr.repo, pr.number).await?;
    Ok(comments
        .iter()
        .any(|c| github.is_bot(&c.author) && c.body.contains(marker)))
}

/// An updated PR is tested only if the author is trusted or someone vouched
/// for it. Nobody is asked for `/ok-to-test` again.
async fn build_all_if_trusted<G, J, C>(
    ctx: &Context<G, J, C>,
    event: &PullRequestEvent,
    trigger: &TriggerConfig,
) -> Result<(), HandlerError>
where
    G: GitHubClient + 'static,
    J: JobStore,
    C: JobCatalog,
{
    let pr = &event.pull_request;
    if pr.is_draft && trigger.skip_draft_pr {
        debug!("Draft PR, not testing");
        return Ok(());
    }

    let presubmits = ctx.presubmits_for(pr).await?;
    if presubmits.is_empty() {
        return Ok(());
    }

    let (labels, trusted) = trusted_pull_request(
        &*ctx.github,
        &trigger.trust_policy(),
        &pr.author,
        &pr.repo,
        pr.number,
        None,
    )
    .await?;
    if !trusted {
        debug!(author = %pr.author, "PR is not trusted, not testing");
        return Ok(());
    }

    // Labels are only fetched for untrusted authors, so this misses a stale
    // label on an org member's PR.
    if has_label(&labels, NEEDS_OK_TO_TEST_LABEL) {
        ctx.github
            .remove_label(&pr.repo, pr.number, NEEDS_OK_TO_TEST_LABEL)
            .await?;
    }

    info!("Starting all jobs for updated PR");
    build_all(ctx, event, &presubmits).await
}

async fn handle_labeled<G, J, C>(
    ctx: &Context<G, J, C>,
    event: &PullRequestEvent,
    trigger: &TriggerConfig,
) -> Result<(), HandlerError>
where
    G: GitHubClient + 'static,
    J: JobStore,
    C: JobCatalog,
{
    let pr = &event.pull_request;
    match event.label.as_deref() {
        Some(LGTM_LABEL) => {
            let (_, trusted) = trusted_pull_request(
                &*ctx.github,
                &trigger.trust_policy(),
                &pr.author,
                &pr.repo,
                pr.number,
                None,
            )
            .await?;
            if trusted {
                return Ok(());
            }
            let presubmits = ctx.presubmits_for(pr).await?;
            info!("Starting all jobs for untrusted PR with LGTM");
            build_all(ctx, event, &presubmits).await
        }
        Some(OK_TO_TEST_LABEL) => {
            // The bot applies this label itself on `/ok-to-test`, and the
            // comment event already started the jobs.
            if ctx.github.is_bot(&event.sender) {
                debug!("Label added by the bot, skipping");
                return Ok(());
            }
            let presubmits = ctx.presubmits_for(pr).await?;
            info!(sender = %event.sender, "Starting all jobs after ok-to-test label");
            build_all(ctx, event, &presubmits).await
        }
        _ => Ok(()),
    }
}

/// Runs every presubmit that runs without being named, and reports the rest
/// of the matched jobs as skipped.
async fn build_all<G, J, C>(
    ctx: &Context<G, J, C>,
    event: &PullRequestEvent,
    presubmits: &[Presubmit],
) -> Result<(), HandlerError>
where
    G: GitHubClient + 'static,
    J: JobStore,
    C: JobCatalog,
{
    let pr: &PullRequest = &event.pull_request;
    let changes = DeferredChanges::new(PullRequestChanges::new(&*ctx.github, &pr.repo, pr.number));
    let filtered = filter_presubmits(
        &FilterSet::from(Filter::TestAll),
        &changes,
        &pr.base_ref,
        presubmits,
    )
    .await?;
    run_filtered(ctx, pr, &event.guid, &filtered).await
}
