//! Handler for comments: issue comments, review bodies and review comments.
//!
//! A comment only does anything when it is newly created on an open PR and
//! either carries a trigger command or matches some job's trigger. Untrusted
//! commenters on untrusted PRs get a single reply explaining that a member
//! must vouch for the PR first.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::catalog::{DeferredChanges, JobCatalog, PullRequestChanges};
use crate::commands::ParsedCommands;
use crate::filter::{available_presubmits, filter_presubmits, help_message, presubmit_filter};
use crate::github::GitHubClient;
use crate::jobs::JobStore;
use crate::respond::{UNTRUSTED_RESPONSE, format_response_raw};
use crate::trust::{trusted_pull_request, trusted_user};
use crate::types::{NEEDS_OK_TO_TEST_LABEL, OK_TO_TEST_LABEL, PrNumber, PullRequest, RepoId, has_label};
use crate::webhooks::events::{CommentAction, GenericCommentEvent};

use super::{Context, HandlerError, run_filtered};

/// Handles a comment event.
#[instrument(skip_all, fields(repo = %event.repo, pr = %event.number, author = %event.author))]
pub async fn handle_generic_comment<G, J, C>(
    ctx: &Context<G, J, C>,
    event: &GenericCommentEvent,
) -> Result<(), HandlerError>
where
    G: GitHubClient + 'static,
    J: JobStore,
    C: JobCatalog,
{
    if event.action != CommentAction::Created || !event.is_pr || !event.issue_state.is_open() {
        return Ok(());
    }

    let parsed = ctx.patterns.parse(&event.body);
    if !parsed.any()
        && !ctx
            .catalog
            .static_presubmits(&event.repo)
            .iter()
            .any(|job| job.trigger_matches(&event.body))
    {
        debug!("Comment doesn't match any trigger, skipping");
        return Ok(());
    }

    let github = &*ctx.github;
    if github.is_bot(&event.author) {
        debug!("Comment is made by the bot, skipping");
        return Ok(());
    }

    let trigger = ctx.config.trigger_for(&event.repo);
    let policy = trigger.trust_policy();
    let pr = github.get_pull_request(&event.repo, event.number).await?;
    let presubmits = ctx.presubmits_for(&pr).await?;

    let mut labels = github.get_issue_labels(&event.repo, event.number).await?;
    let decision = trusted_user(github, &policy, &event.author, &event.repo).await?;
    if !decision.trusted {
        let (pr_labels, trusted) = trusted_pull_request(
            github,
            &policy,
            &event.issue_author,
            &event.repo,
            event.number,
            Some(labels),
        )
        .await?;
        if !trusted {
            info!(reason = %decision.reason, "Refusing to trigger for untrusted user");
            let reply = format_response_raw(
                &event.body,
                &event.html_url,
                &event.author,
                UNTRUSTED_RESPONSE,
                ctx.config.about(),
            );
            github.create_comment(&event.repo, event.number, &reply).await?;
            return Ok(());
        }
        labels = pr_labels;
    }

    let is_ok_to_test = !trigger.ignore_ok_to_test && parsed.ok_to_test;
    update_trust_labels(github, &event.repo, event.number, &labels, is_ok_to_test).await?;
    if is_ok_to_test {
        prune_untrusted_replies(github, &event.repo, event.number).await;
    }

    let status = if parsed.requests_retest() {
        Some(github.combined_status(&pr.repo, &pr.head_sha).await?)
    } else {
        None
    };
    let filters = presubmit_filter(!trigger.ignore_ok_to_test, &parsed, &event.body, status.as_ref());
    let changes = DeferredChanges::new(PullRequestChanges::new(github, &pr.repo, pr.number));
    let filtered = filter_presubmits(&filters, &changes, &pr.base_ref, &presubmits).await?;

    if let Some(help) = parsed.help_response(filtered.to_run.len()) {
        info!(to_run = filtered.to_run.len(), "Responding with available jobs");
        let available = available_presubmits(&pr.base_ref, &presubmits);
        let message = help_message(&pr.repo, &pr.base_ref, help.note, &available);
        let reply = format_response_raw(
            &event.body,
            &event.html_url,
            &event.author,
            &message,
            ctx.config.about(),
        );
        github.create_comment(&event.repo, event.number, &reply).await?;
        return Ok(());
    }

    if trigger.trigger_github_workflows && reruns_workflows(&parsed) {
        spawn_workflow_reruns(Arc::clone(&ctx.github), &pr);
    }

    run_filtered(ctx, &pr, &event.guid, &filtered).await
}

/// Applies `ok-to-test` for a vouching comment and drops `needs-ok-to-test`
/// once the PR is vouched for.
async fn update_trust_labels<G: GitHubClient>(
    github: &G,
    repo: &RepoId,
    number: PrNumber,
    labels: &[String],
    is_ok_to_test: bool,
) -> Result<(), HandlerError> {
    let has_ok_to_test = has_label(labels, OK_TO_TEST_LABEL);
    if is_ok_to_test && !has_ok_to_test {
        github.add_label(repo, number, OK_TO_TEST_LABEL).await?;
    }
    if (is_ok_to_test || has_ok_to_test) && has_label(labels, NEEDS_OK_TO_TEST_LABEL) {
        github.remove_label(repo, number, NEEDS_OK_TO_TEST_LABEL).await?;
    }
    Ok(())
}

/// Deletes the bot's earlier "cannot trigger" replies, which no longer apply.
/// Failures are logged and otherwise ignored.
async fn prune_untrusted_replies<G: GitHubClient>(github: &G, repo: &RepoId, number: PrNumber) {
    let comments = match github.list_comments(repo, number).await {
        Ok(comments) => comments,
        Err(e) => {
            warn!(error = %e, "Failed to list comments for pruning");
            return;
        }
    };
    for comment in comments
        .iter()
        .filter(|c| github.is_bot(&c.author) && c.body.contains(UNTRUSTED_RESPONSE))
    {
        match github.delete_comment(repo, comment.id).await {
            Ok(()) => debug!(comment = %comment.id, "Pruned stale reply"),
            Err(e) => warn!(comment = %comment.id, error = %e, "Failed to prune stale reply"),
        }
    }
}

fn reruns_workflows(parsed: &ParsedCommands) -> bool {
    parsed.retest || parsed.test_all
}

/// Re-runs failed GitHub Actions runs for the PR head in the background.
fn spawn_workflow_reruns<G: GitHubClient + 'static>(github: Arc<G>, pr: &PullRequest) {
    let repo = pr.repo.clone();
    let head_ref = pr.head_ref.clone();
    let head_sha = pr.head_sha.clone();
    tokio::spawn(async move {
        let runs = match github.failed_workflow_runs(&repo, &head_ref, &head_sha).await {
            Ok(runs) => runs,
            Err(e) => {
                warn!(repo = %repo, sha = %head_sha.short(), error = %e, "Failed to list workflow runs");
                return;
            }
        };
        for run_id in runs {
            match github.rerun_failed_jobs(&repo, run_id).await {
                Ok(()) => info!(repo = %repo, run_id, "Re-running failed workflow jobs"),
                Err(e) => warn!(repo = %repo, run_id, error = %e, "Failed to re-run workflow"),
            }
        }
    });
}
