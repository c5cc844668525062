//! GitHub webhook event types.
//!
//! The trigger handles three kinds of event:
//!
//! - `pull_request` - PR lifecycle and label changes
//! - comments - `issue_comment`, `pull_request_review` and
//!   `pull_request_review_comment`, unified as [`GenericCommentEvent`]
//! - `push` - branch updates, for postsubmits

use serde::{Deserialize, Serialize};

use crate::types::{EventGuid, PrNumber, PrState, PullRequest, RepoId, Sha};

/// A parsed GitHub webhook event.
///
/// Only the events the trigger acts on are represented; the parser returns
/// `None` for everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitHubEvent {
    PullRequest(PullRequestEvent),

    /// A comment on a PR conversation, a review body, or a review comment.
    GenericComment(GenericCommentEvent),

    Push(PushEvent),
}

impl GitHubEvent {
    pub fn repo_id(&self) -> &RepoId {
        match self {
            GitHubEvent::PullRequest(e) => &e.pull_request.repo,
            GitHubEvent::GenericComment(e) => &e.repo,
            GitHubEvent::Push(e) => &e.repo,
        }
    }

    /// The delivery ID, recorded on every job the event creates.
    pub fn guid(&self) -> &EventGuid {
        match self {
            GitHubEvent::PullRequest(e) => &e.guid,
            GitHubEvent::GenericComment(e) => &e.guid,
            GitHubEvent::Push(e) => &e.guid,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GitHubEvent::PullRequest(_) => "pull_request",
            GitHubEvent::GenericComment(_) => "comment",
            GitHubEvent::Push(_) => "push",
        }
    }
}

/// Action performed on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrAction {
    Opened,
    Reopened,
    /// New commits were pushed to the head branch.
    Synchronize,
    ReadyForReview,
    /// Title, body or base branch changed.
    Edited,
    Labeled,
    Closed,
    ConvertedToDraft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub guid: EventGuid,
    pub action: PrAction,
    pub pull_request: PullRequest,

    /// Who caused the event. For `labeled`, whoever applied the label.
    pub sender: String,

    /// The label applied, for `labeled`.
    pub label: Option<String>,

    /// For `edited`: whether the base ref or base SHA changed.
    pub base_changed: bool,
}

/// What happened to a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentAction {
    /// Created, or for reviews, submitted.
    Created,
    Edited,
    /// Deleted, or for reviews, dismissed.
    Deleted,
}

/// Where a comment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    /// The conversation tab of an issue or PR.
    IssueComment,
    /// The body of a PR review.
    Review,
    /// An inline comment on a PR diff.
    ReviewComment,
}

/// A comment of any kind, reduced to what command handling needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericCommentEvent {
    pub guid: EventGuid,
    pub repo: RepoId,
    pub action: CommentAction,
    pub kind: CommentKind,

    /// False for comments on plain issues.
    pub is_pr: bool,

    /// Issue or PR number.
    pub number: PrNumber,

    pub body: String,
    pub html_url: String,

    /// Login of the comment author.
    pub author: String,

    /// State of the issue or PR commented on.
    pub issue_state: PrState,

    /// Login of the issue or PR author.
    pub issue_author: String,
}

/// A push to a branch or tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub guid: EventGuid,
    pub repo: RepoId,

    /// Full ref name, e.g. `refs/heads/main`.
    pub git_ref: String,

    pub before: Sha,
    pub after: Sha,

    /// The ref was deleted.
    pub deleted: bool,

    /// Files added, removed or modified by any pushed commit, deduplicated.
    pub changed_files: Vec<String>,

    pub pusher: String,
}

impl PushEvent {
    /// The ref without its `refs/heads/` prefix.
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(git_ref: &str) -> PushEvent {
        PushEvent {
            guid: EventGuid::new("guid"),
            repo: RepoId::new("org", "repo"),
            git_ref: git_ref.to_string(),
            before: Sha::new("a"),
            after: Sha::new("b"),
            deleted: false,
            changed_files: vec![],
            pusher: "alice".to_string(),
        }
    }

    #[test]
    fn push_branch_strips_heads_prefix() {
        assert_eq!(push("refs/heads/main").branch(), "main");
        assert_eq!(push("refs/heads/release/1.0").branch(), "release/1.0");
        assert_eq!(push("refs/tags/v1").branch(), "refs/tags/v1");
    }

    #[test]
    fn event_accessors_cover_every_variant() {
        let event = GitHubEvent::Push(push("refs/heads/main"));
        assert_eq!(event.repo_id(), &RepoId::new("org", "repo"));
        assert_eq!(event.guid().as_str(), "guid");
        assert_eq!(event.kind(), "push");
    }
}
