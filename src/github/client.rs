//! Octocrab-backed implementation of the GitHub capability traits.
//!
//! Every call goes through [`retry_with_backoff`] with the client's retry
//! configuration, so transient failures (5xx, rate limits, timeouts) are
//! retried and permanent ones surface immediately.

use std::future::Future;

use octocrab::Octocrab;
use serde::{Deserialize, Serialize};

use crate::retry::{RetryConfig, retry_with_backoff};
use crate::types::{
    CombinedStatus, CommentId, CommitStatus, PrNumber, PrState, PullRequest, RepoId, Sha,
    StatusState,
};

use super::capabilities::{
    BotIdentity, CommentClient, IssueComment, LabelClient, MembershipClient, PullRequestClient,
    StatusClient, WorkflowClient,
};
use super::error::GitHubApiError;

/// GitHub caps the files listing of a PR at 3000 entries.
const MAX_FILE_PAGES: u32 = 30;

const PAGE_SIZE: u8 = 100;

/// A GitHub API client acting as the bot user.
#[derive(Clone)]
pub struct OctocrabClient {
    client: Octocrab,
    bot_login: String,
    retry: RetryConfig,
}

impl OctocrabClient {
    pub fn new(client: Octocrab, bot_login: impl Into<String>) -> Self {
        Self {
            client,
            bot_login: bot_login.into(),
            retry: RetryConfig::DEFAULT,
        }
    }

    /// Creates a client from a personal access token.
    pub fn from_token(
        token: impl Into<String>,
        bot_login: impl Into<String>,
    ) -> Result<Self, octocrab::Error> {
        let client = Octocrab::builder().personal_token(token.into()).build()?;
        Ok(Self::new(client, bot_login))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn retrying<T, F, Fut>(&self, operation: F) -> Result<T, GitHubApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitHubApiError>>,
    {
        retry_with_backoff(
            self.retry,
            |e: &GitHubApiError| e.kind.is_retriable(),
            operation,
        )
        .await
        .into_result()
    }

    /// GETs a membership-style endpoint that answers 204 for yes and 404 for no.
    async fn check_membership(&self, url: &str) -> Result<bool, GitHubApiError> {
        let response = self
            .client
            ._get(url)
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        match response.status().as_u16() {
            204 => Ok(true),
            // 302 means the requester cannot see private membership.
            302 | 404 => Ok(false),
            code => Err(GitHubApiError::from_status(
                code,
                format!("unexpected response from {}", url),
            )),
        }
    }
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabClient")
            .field("bot_login", &self.bot_login)
            .finish_non_exhaustive()
    }
}

// ─── Raw response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawRef {
    object: RawRefObject,
}

#[derive(Debug, Deserialize)]
struct RawRefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct RawCombinedStatus {
    sha: String,
    #[serde(default)]
    statuses: Vec<RawStatus>,
    total_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    state: String,
    context: String,
    description: Option<String>,
    target_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateStatusRequest<'a> {
    state: &'static str,
    context: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RawWorkflowRuns {
    #[serde(default)]
    workflow_runs: Vec<RawWorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct RawWorkflowRun {
    id: u64,
    head_sha: String,
}

fn parse_status_state(state: &str) -> Option<StatusState> {
    match state {
        "pending" => Some(StatusState::Pending),
        "success" => Some(StatusState::Success),
        "failure" => Some(StatusState::Failure),
        "error" => Some(StatusState::Error),
        _ => None,
    }
}

fn commit_status_from_raw(s: RawStatus) -> Option<CommitStatus> {
    let Some(state) = parse_status_state(&s.state) else {
        tracing::warn!(context = %s.context, state = %s.state, "Ignoring status with unknown state");
        return None;
    };
    Some(CommitStatus {
        state,
        context: s.context,
        description: s.description.unwrap_or_default(),
        target_url: s.target_url,
    })
}

/// The combined status pages its `statuses`. A short page ends the listing,
/// as does reaching `total_count` when GitHub reports it.
fn is_last_status_page(page_len: usize, page: u32, total_count: Option<usize>) -> bool {
    let fetched = (page as usize - 1) * usize::from(PAGE_SIZE) + page_len;
    page_len < usize::from(PAGE_SIZE) || total_count.is_some_and(|total| fetched >= total)
}

// ─── Capability implementations ───────────────────────────────────────────────

impl BotIdentity for OctocrabClient {
    fn bot_login(&self) -> &str {
        &self.bot_login
    }
}

impl MembershipClient for OctocrabClient {
    async fn is_collaborator(&self, repo: &RepoId, login: &str) -> Result<bool, GitHubApiError> {
        let url = format!(
            "/repos/{}/{}/collaborators/{}",
            repo.owner,
            repo.repo,
            urlencoding::encode(login)
        );
        let url = url.as_str();
        self.retrying(|| self.check_membership(url)).await
    }

    async fn is_org_member(&self, org: &str, login: &str) -> Result<bool, GitHubApiError> {
        let url = format!(
            "/orgs/{}/members/{}",
            urlencoding::encode(org),
            urlencoding::encode(login)
        );
        let url = url.as_str();
        self.retrying(|| self.check_membership(url)).await
    }
}

impl LabelClient for OctocrabClient {
    async fn get_issue_labels(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> Result<Vec<String>, GitHubApiError> {
        self.retrying(|| async move {
            let mut page = 1u32;
            let mut labels = Vec::new();
            loop {
                let result = self
                    .client
                    .issues(&repo.owner, &repo.repo)
                    .list_labels_for_issue(number.0)
                    .per_page(PAGE_SIZE)
                    .page(page)
                    .send()
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;

                let is_last_page = result.items.len() < usize::from(PAGE_SIZE);
                labels.extend(result.items.into_iter().map(|l| l.name));
                if is_last_page {
                    return Ok(labels);
                }
                page += 1;
            }
        })
        .await
    }

    async fn add_label(
        &self,
        repo: &RepoId,
        number: PrNumber,
        label: &str,
    ) -> Result<(), GitHubApiError> {
        let labels = [label.to_string()];
        let labels = &labels;
        self.retrying(|| async move {
            self.client
                .issues(&repo.owner, &repo.repo)
                .add_labels(number.0, labels)
                .await
                .map(|_| ())
                .map_err(GitHubApiError::from_octocrab)
        })
        .await
    }

    async fn remove_label(
        &self,
        repo: &RepoId,
        number: PrNumber,
        label: &str,
    ) -> Result<(), GitHubApiError> {
        self.retrying(|| async move {
            match self
                .client
                .issues(&repo.owner, &repo.repo)
                .remove_label(number.0, label)
                .await
            {
                Ok(_) => Ok(()),
                Err(e) => {
                    let err = GitHubApiError::from_octocrab(e);
                    // Already gone.
                    if err.is_not_found() { Ok(()) } else { Err(err) }
                }
            }
        })
        .await
    }
}

impl CommentClient for OctocrabClient {
    async fn create_comment(
        &self,
        repo: &RepoId,
        number: PrNumber,
        body: &str,
    ) -> Result<CommentId, GitHubApiError> {
        self.retrying(|| async move {
            self.client
                .issues(&repo.owner, &repo.repo)
                .create_comment(number.0, body)
                .await
                .map(|comment| CommentId(comment.id.into_inner()))
                .map_err(GitHubApiError::from_octocrab)
        })
        .await
    }

    async fn list_comments(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> Result<Vec<IssueComment>, GitHubApiError> {
        self.retrying(|| async move {
            let mut page = 1u32;
            let mut comments = Vec::new();
            loop {
                let result = self
                    .client
                    .issues(&repo.owner, &repo.repo)
                    .list_comments(number.0)
                    .per_page(PAGE_SIZE)
                    .page(page)
                    .send()
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;

                let is_last_page = result.items.len() < usize::from(PAGE_SIZE);
                comments.extend(result.items.into_iter().map(|c| IssueComment {
                    id: CommentId(c.id.into_inner()),
                    author: c.user.login,
                    body: c.body.unwrap_or_default(),
                }));
                if is_last_page {
                    return Ok(comments);
                }
                page += 1;
            }
        })
        .await
    }

    async fn delete_comment(&self, repo: &RepoId, id: CommentId) -> Result<(), GitHubApiError> {
        self.retrying(|| async move {
            self.client
                .issues(&repo.owner, &repo.repo)
                .delete_comment(octocrab::models::CommentId(id.0))
                .await
                .map_err(GitHubApiError::from_octocrab)
        })
        .await
    }
}

impl StatusClient for OctocrabClient {
    async fn combined_status(
        &self,
        repo: &RepoId,
        sha: &Sha,
    ) -> Result<CombinedStatus, GitHubApiError> {
        self.retrying(|| async move {
            let mut page = 1u32;
            let mut statuses = Vec::new();
            loop {
                let url = format!(
                    "/repos/{}/{}/commits/{}/status?per_page={}&page={}",
                    repo.owner, repo.repo, sha, PAGE_SIZE, page
                );
                let raw: RawCombinedStatus = self
                    .client
                    .get(url, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;

                let page_len = raw.statuses.len();
                statuses.extend(raw.statuses.into_iter().filter_map(commit_status_from_raw));
                if is_last_status_page(page_len, page, raw.total_count) {
                    return Ok(CombinedStatus {
                        sha: Sha::new(raw.sha),
                        statuses,
                    });
                }
                page += 1;
            }
        })
        .await
    }

    async fn create_status(
        &self,
        repo: &RepoId,
        sha: &Sha,
        status: &CommitStatus,
    ) -> Result<(), GitHubApiError> {
        let url = format!("/repos/{}/{}/statuses/{}", repo.owner, repo.repo, sha);
        let url = url.as_str();
        let request = CreateStatusRequest {
            state: status.state.as_api_str(),
            context: &status.context,
            description: &status.description,
            target_url: status.target_url.as_deref(),
        };
        let request = &request;
        self.retrying(|| async move {
            self.client
                .post::<_, serde_json::Value>(url, Some(request))
                .await
                .map(|_| ())
                .map_err(GitHubApiError::from_octocrab)
        })
        .await
    }
}

impl PullRequestClient for OctocrabClient {
    async fn get_pull_request(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> Result<PullRequest, GitHubApiError> {
        let pull = self
            .retrying(|| async {
                self.client
                    .pulls(&repo.owner, &repo.repo)
                    .get(number.0)
                    .await
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await?;

        let author = pull.user.map(|u| u.login).ok_or_else(|| {
            GitHubApiError::permanent_without_source(format!("PR {} has no author", number))
        })?;
        let state = match pull.state {
            Some(octocrab::models::IssueState::Closed) => PrState::Closed,
            _ => PrState::Open,
        };

        Ok(PullRequest {
            repo: repo.clone(),
            number,
            base_ref: pull.base.ref_field,
            base_sha: Sha::new(pull.base.sha),
            head_ref: pull.head.ref_field,
            head_sha: Sha::new(pull.head.sha),
            author,
            is_draft: pull.draft.unwrap_or(false),
            state,
            html_url: pull.html_url.map(|u| u.to_string()).unwrap_or_default(),
        })
    }

    async fn get_ref(&self, repo: &RepoId, git_ref: &str) -> Result<Sha, GitHubApiError> {
        let url = format!("/repos/{}/{}/git/ref/{}", repo.owner, repo.repo, git_ref);
        let url = url.as_str();
        let raw: RawRef = self
            .retrying(|| async {
                self.client
                    .get(url, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await?;
        Ok(Sha::new(raw.object.sha))
    }

    async fn changed_files(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> Result<Vec<String>, GitHubApiError> {
        self.retrying(|| async move {
            let mut files = Vec::new();
            for page in 1..=MAX_FILE_PAGES {
                let url = format!(
                    "/repos/{}/{}/pulls/{}/files?per_page={}&page={}",
                    repo.owner, repo.repo, number.0, PAGE_SIZE, page
                );
                let batch: Vec<RawFile> = self
                    .client
                    .get(url, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;

                let is_last_page = batch.len() < usize::from(PAGE_SIZE);
                files.extend(batch.into_iter().map(|f| f.filename));
                if is_last_page {
                    break;
                }
            }
            Ok(files)
        })
        .await
    }
}

impl WorkflowClient for OctocrabClient {
    async fn failed_workflow_runs(
        &self,
        repo: &RepoId,
        head_ref: &str,
        head_sha: &Sha,
    ) -> Result<Vec<u64>, GitHubApiError> {
        let url = format!(
            "/repos/{}/{}/actions/runs?event=pull_request&status=failure&branch={}&head_sha={}",
            repo.owner,
            repo.repo,
            urlencoding::encode(head_ref),
            head_sha
        );
        let url = url.as_str();
        let raw: RawWorkflowRuns = self
            .retrying(|| async {
                self.client
                    .get(url, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await?;

        Ok(raw
            .workflow_runs
            .into_iter()
            .filter(|run| run.head_sha == head_sha.as_str())
            .map(|run| run.id)
            .collect())
    }

    async fn rerun_failed_jobs(&self, repo: &RepoId, run_id: u64) -> Result<(), GitHubApiError> {
        let url = format!(
            "/repos/{}/{}/actions/runs/{}/rerun-failed-jobs",
            repo.owner, repo.repo, run_id
        );
        let url = url.as_str();
        self.retrying(|| async move {
            let response = self
                .client
                ._post(url, None::<&()>)
                .await
                .map_err(GitHubApiError::from_octocrab)?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(GitHubApiError::from_status(
                    status.as_u16(),
                    format!("re-running workflow run {}", run_id),
                ))
            }
        })
        .await
    }
}
