//! GitHub webhook payload parser.
//!
//! Parses raw webhook JSON into typed [`GitHubEvent`] values.
//!
//! # Parsing Strategy
//!
//! 1. The event type comes from the `X-GitHub-Event` header
//! 2. The payload is parsed according to the event type
//! 3. Unknown event types and irrelevant actions return `Ok(None)`
//! 4. Malformed payloads return `Err` with details

use std::collections::BTreeSet;

use serde::Deserialize;
use thiserror::Error;

use crate::types::{EventGuid, PrNumber, PrState, PullRequest, RepoId, Sha};

use super::events::{
    CommentAction, CommentKind, GenericCommentEvent, GitHubEvent, PrAction, PullRequestEvent,
    PushEvent,
};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Field has invalid value (e.g., malformed SHA, unknown state).
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses a webhook payload into a typed event.
///
/// * `Ok(Some(event))` - a known event type and action
/// * `Ok(None)` - an event or action the trigger ignores
/// * `Err(e)` - malformed payload or missing required fields
///
/// # Examples
///
/// ```
/// use presubmit_trigger::types::EventGuid;
/// use presubmit_trigger::webhooks::parse_webhook;
///
/// let payload = br#"{
///     "action": "created",
///     "comment": {
///         "body": "/retest",
///         "html_url": "https://github.com/org/repo/pull/42#issuecomment-1",
///         "user": { "login": "octocat" }
///     },
///     "issue": {
///         "number": 42,
///         "state": "open",
///         "user": { "login": "author" },
///         "pull_request": { "url": "..." }
///     },
///     "repository": {
///         "owner": { "login": "org" },
///         "name": "repo"
///     }
/// }"#;
///
/// let event = parse_webhook("issue_comment", &EventGuid::new("d-1"), payload).unwrap();
/// assert!(event.is_some());
/// ```
pub fn parse_webhook(
    event_type: &str,
    guid: &EventGuid,
    payload: &[u8],
) -> Result<Option<GitHubEvent>, ParseError> {
    match event_type {
        "pull_request" => {
            parse_pull_request(guid, payload).map(|opt| opt.map(GitHubEvent::PullRequest))
        }
        "issue_comment" => {
            parse_issue_comment(guid, payload).map(|opt| opt.map(GitHubEvent::GenericComment))
        }
        "pull_request_review" => {
            parse_review(guid, payload).map(|opt| opt.map(GitHubEvent::GenericComment))
        }
        "pull_request_review_comment" => {
            parse_review_comment(guid, payload).map(|opt| opt.map(GitHubEvent::GenericComment))
        }
        "push" => parse_push(guid, payload).map(|e| Some(GitHubEvent::Push(e))),
        // Unknown event types are ignored (not an error)
        _ => Ok(None),
    }
}

// ============================================================================
// Raw payload structures for deserialization
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawRepository {
    owner: RawOwner,
    name: String,
}

impl RawRepository {
    fn id(self) -> RepoId {
        RepoId::new(self.owner.login, self.name)
    }
}

#[derive(Debug, Deserialize)]
struct RawOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

fn parse_sha(field: &'static str, value: &str) -> Result<Sha, ParseError> {
    if value.len() == 40 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(Sha::new(value.to_ascii_lowercase()))
    } else {
        Err(ParseError::InvalidField {
            field,
            value: value.to_string(),
        })
    }
}

fn parse_state(field: &'static str, value: &str) -> Result<PrState, ParseError> {
    match value {
        "open" => Ok(PrState::Open),
        "closed" => Ok(PrState::Closed),
        other => Err(ParseError::InvalidField {
            field,
            value: other.to_string(),
        }),
    }
}

// ============================================================================
// pull_request event
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: String,
    pull_request: RawPullRequest,
    repository: RawRepository,
    sender: RawUser,
    label: Option<RawLabel>,
    changes: Option<RawChanges>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    state: String,
    head: RawRef,
    base: RawRef,
    draft: Option<bool>,
    user: RawUser,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct RawRef {
    sha: String,
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawChanges {
    base: Option<serde_json::Value>,
}

fn parse_pull_request(
    guid: &EventGuid,
    payload: &[u8],
) -> Result<Option<PullRequestEvent>, ParseError> {
    let raw: RawPullRequestPayload = serde_json::from_slice(payload)?;

    let action = match raw.action.as_str() {
        "opened" => PrAction::Opened,
        "reopened" => PrAction::Reopened,
        "synchronize" => PrAction::Synchronize,
        "ready_for_review" => PrAction::ReadyForReview,
        "edited" => PrAction::Edited,
        "labeled" => PrAction::Labeled,
        "closed" => PrAction::Closed,
        "converted_to_draft" => PrAction::ConvertedToDraft,
        // Other actions (assigned, unlabeled, etc.) are not relevant to us
        _ => return Ok(None),
    };

    let pr = raw.pull_request;
    let pull_request = PullRequest {
        repo: raw.repository.id(),
        number: PrNumber(pr.number),
        base_sha: parse_sha("pull_request.base.sha", &pr.base.sha)?,
        base_ref: pr.base.ref_name,
        head_sha: parse_sha("pull_request.head.sha", &pr.head.sha)?,
        head_ref: pr.head.ref_name,
        author: pr.user.login,
        is_draft: pr.draft.unwrap_or(false),
        state: parse_state("pull_request.state", &pr.state)?,
        html_url: pr.html_url,
    };

    Ok(Some(PullRequestEvent {
        guid: guid.clone(),
        action,
        pull_request,
        sender: raw.sender.login,
        label: raw.label.map(|l| l.name),
        base_changed: raw.changes.is_some_and(|c| c.base.is_some()),
    }))
}

// ============================================================================
// Comment events
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawIssueCommentPayload {
    action: String,
    comment: RawComment,
    issue: RawIssue,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    body: Option<String>,
    #[serde(default)]
    html_url: String,
    user: RawUser,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    state: String,
    user: RawUser,
    // Present only when the issue is a PR
    pull_request: Option<serde_json::Value>,
}

fn comment_action(action: &str) -> Option<CommentAction> {
    match action {
        "created" | "submitted" => Some(CommentAction::Created),
        "edited" => Some(CommentAction::Edited),
        "deleted" | "dismissed" => Some(CommentAction::Deleted),
        _ => None,
    }
}

fn parse_issue_comment(
    guid: &EventGuid,
    payload: &[u8],
) -> Result<Option<GenericCommentEvent>, ParseError> {
    let raw: RawIssueCommentPayload = serde_json::from_slice(payload)?;
    let Some(action) = comment_action(&raw.action) else {
        return Ok(None);
    };

    Ok(Some(GenericCommentEvent {
        guid: guid.clone(),
        repo: raw.repository.id(),
        action,
        kind: CommentKind::IssueComment,
        is_pr: raw.issue.pull_request.is_some(),
        number: PrNumber(raw.issue.number),
        body: raw.comment.body.unwrap_or_default(),
        html_url: raw.comment.html_url,
        author: raw.comment.user.login,
        issue_state: parse_state("issue.state", &raw.issue.state)?,
        issue_author: raw.issue.user.login,
    }))
}

#[derive(Debug, Deserialize)]
struct RawReviewPayload {
    action: String,
    review: RawComment,
    pull_request: RawCommentedPullRequest,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawReviewCommentPayload {
    action: String,
    comment: RawComment,
    pull_request: RawCommentedPullRequest,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawCommentedPullRequest {
    number: u64,
    state: String,
    user: RawUser,
}

fn pr_comment(
    guid: &EventGuid,
    kind: CommentKind,
    action: CommentAction,
    comment: RawComment,
    pr: RawCommentedPullRequest,
    repository: RawRepository,
) -> Result<GenericCommentEvent, ParseError> {
    Ok(GenericCommentEvent {
        guid: guid.clone(),
        repo: repository.id(),
        action,
        kind,
        is_pr: true,
        number: PrNumber(pr.number),
        body: comment.body.unwrap_or_default(),
        html_url: comment.html_url,
        author: comment.user.login,
        issue_state: parse_state("pull_request.state", &pr.state)?,
        issue_author: pr.user.login,
    })
}

fn parse_review(
    guid: &EventGuid,
    payload: &[u8],
) -> Result<Option<GenericCommentEvent>, ParseError> {
    let raw: RawReviewPayload = serde_json::from_slice(payload)?;
    let Some(action) = comment_action(&raw.action) else {
        return Ok(None);
    };
    pr_comment(
        guid,
        CommentKind::Review,
        action,
        raw.review,
        raw.pull_request,
        raw.repository,
    )
    .map(Some)
}

fn parse_review_comment(
    guid: &EventGuid,
    payload: &[u8],
) -> Result<Option<GenericCommentEvent>, ParseError> {
    let raw: RawReviewCommentPayload = serde_json::from_slice(payload)?;
    let Some(action) = comment_action(&raw.action) else {
        return Ok(None);
    };
    pr_comment(
        guid,
        CommentKind::ReviewComment,
        action,
        raw.comment,
        raw.pull_request,
        raw.repository,
    )
    .map(Some)
}

// ============================================================================
// push event
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    before: String,
    after: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    commits: Vec<RawCommit>,
    repository: RawRepository,
    sender: RawUser,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
    #[serde(default)]
    modified: Vec<String>,
}

fn parse_push(guid: &EventGuid, payload: &[u8]) -> Result<PushEvent, ParseError> {
    let raw: RawPushPayload = serde_json::from_slice(payload)?;

    let changed_files: BTreeSet<String> = raw
        .commits
        .into_iter()
        .flat_map(|c| c.added.into_iter().chain(c.removed).chain(c.modified))
        .collect();

    Ok(PushEvent {
        guid: guid.clone(),
        repo: raw.repository.id(),
        before: parse_sha("before", &raw.before)?,
        after: parse_sha("after", &raw.after)?,
        git_ref: raw.git_ref,
        deleted: raw.deleted,
        changed_files: changed_files.into_iter().collect(),
        pusher: raw.sender.login,
    })
}
