//! The slices of the GitHub API the trigger depends on.
//!
//! Each trait covers one concern so components can name exactly what they
//! use: trust evaluation needs [`MembershipClient`] and [`LabelClient`], the
//! executor needs [`StatusClient`] and [`PullRequestClient`], and so on.
//! [`super::OctocrabClient`] implements all of them; tests use an in-memory
//! fake.

use std::future::Future;

use crate::types::{CombinedStatus, CommentId, CommitStatus, PrNumber, PullRequest, RepoId, Sha};

use super::error::GitHubApiError;

/// Organization membership and repository collaborator lookups.
pub trait MembershipClient: Send + Sync {
    fn is_collaborator(
        &self,
        repo: &RepoId,
        login: &str,
    ) -> impl Future<Output = Result<bool, GitHubApiError>> + Send;

    fn is_org_member(
        &self,
        org: &str,
        login: &str,
    ) -> impl Future<Output = Result<bool, GitHubApiError>> + Send;
}

/// Issue label reads and writes. PRs share the issue label namespace.
pub trait LabelClient: Send + Sync {
    fn get_issue_labels(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> impl Future<Output = Result<Vec<String>, GitHubApiError>> + Send;

    fn add_label(
        &self,
        repo: &RepoId,
        number: PrNumber,
        label: &str,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;

    fn remove_label(
        &self,
        repo: &RepoId,
        number: PrNumber,
        label: &str,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;
}

/// A comment on an issue or pull request conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueComment {
    pub id: CommentId,
    pub author: String,
    pub body: String,
}

/// Conversation comments.
pub trait CommentClient: Send + Sync {
    fn create_comment(
        &self,
        repo: &RepoId,
        number: PrNumber,
        body: &str,
    ) -> impl Future<Output = Result<CommentId, GitHubApiError>> + Send;

    fn list_comments(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> impl Future<Output = Result<Vec<IssueComment>, GitHubApiError>> + Send;

    fn delete_comment(
        &self,
        repo: &RepoId,
        id: CommentId,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;
}

/// Commit statuses.
pub trait StatusClient: Send + Sync {
    fn combined_status(
        &self,
        repo: &RepoId,
        sha: &Sha,
    ) -> impl Future<Output = Result<CombinedStatus, GitHubApiError>> + Send;

    fn create_status(
        &self,
        repo: &RepoId,
        sha: &Sha,
        status: &CommitStatus,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;
}

/// Pull request and git ref reads.
pub trait PullRequestClient: Send + Sync {
    fn get_pull_request(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> impl Future<Output = Result<PullRequest, GitHubApiError>> + Send;

    /// Resolves a ref such as `heads/main` to the commit it points at.
    fn get_ref(
        &self,
        repo: &RepoId,
        git_ref: &str,
    ) -> impl Future<Output = Result<Sha, GitHubApiError>> + Send;

    /// Paths of every file the PR touches.
    fn changed_files(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> impl Future<Output = Result<Vec<String>, GitHubApiError>> + Send;
}

/// Knows which login the bot itself acts as.
pub trait BotIdentity: Send + Sync {
    fn bot_login(&self) -> &str;

    /// True for the bot's own login, including the `[bot]`-suffixed form
    /// GitHub Apps act under.
    fn is_bot(&self, login: &str) -> bool {
        let bot = self.bot_login();
        login.eq_ignore_ascii_case(bot)
            || login
                .strip_suffix("[bot]")
                .is_some_and(|name| name.eq_ignore_ascii_case(bot))
    }
}

/// GitHub Actions workflow runs.
pub trait WorkflowClient: Send + Sync {
    /// IDs of failed `pull_request` workflow runs for the given head.
    fn failed_workflow_runs(
        &self,
        repo: &RepoId,
        head_ref: &str,
        head_sha: &Sha,
    ) -> impl Future<Output = Result<Vec<u64>, GitHubApiError>> + Send;

    fn rerun_failed_jobs(
        &self,
        repo: &RepoId,
        run_id: u64,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;
}

/// Everything the event handlers use. Implemented for any type that has each
/// capability.
pub trait GitHubClient:
    MembershipClient
    + LabelClient
    + CommentClient
    + StatusClient
    + PullRequestClient
    + BotIdentity
    + WorkflowClient
{
}

impl<T> GitHubClient for T where
    T: MembershipClient
        + LabelClient
        + CommentClient
        + StatusClient
        + PullRequestClient
        + BotIdentity
        + WorkflowClient
{
}
