//! Shared test fakes: an in-memory GitHub and a job store with injectable
//! failures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::github::{
    BotIdentity, CommentClient, GitHubApiError, IssueComment, LabelClient, MembershipClient,
    PullRequestClient, StatusClient, WorkflowClient,
};
use crate::jobs::{InMemoryJobStore, JobRecord, JobStore, JobStoreError, LabelSelector};
use crate::types::{
    CombinedStatus, CommentId, CommitStatus, PrNumber, PrState, PullRequest, RepoId, Sha,
    StatusState,
};

pub const BOT_LOGIN: &str = "ci-robot";

pub fn sample_pr() -> PullRequest {
    PullRequest {
        repo: RepoId::new("org", "repo"),
        number: PrNumber(1),
        base_ref: "main".to_string(),
        base_sha: Sha::new("base"),
        head_ref: "feature".to_string(),
        head_sha: Sha::new("head"),
        author: "alice".to_string(),
        is_draft: false,
        state: PrState::Open,
        html_url: "https://github.com/org/repo/pull/1".to_string(),
    }
}

#[derive(Default)]
struct State {
    collaborators: HashSet<(RepoId, String)>,
    org_members: HashSet<(String, String)>,
    membership_error: Option<String>,
    labels: HashMap<(RepoId, PrNumber), Vec<String>>,
    comments: HashMap<(RepoId, PrNumber), Vec<IssueComment>>,
    next_comment_id: u64,
    deleted_comments: Vec<CommentId>,
    statuses: Vec<(Sha, CommitStatus)>,
    failing_status_contexts: HashSet<String>,
    combined: HashMap<Sha, Vec<CommitStatus>>,
    pulls: HashMap<(RepoId, PrNumber), PullRequest>,
    refs: HashMap<(RepoId, String), Sha>,
    changed_files: HashMap<(RepoId, PrNumber), Vec<String>>,
    failed_runs: Vec<u64>,
    reruns: Vec<u64>,
    collaborator_checks: u32,
    org_member_checks: u32,
    label_reads: u32,
    ref_reads: u32,
    changed_file_reads: u32,
}

/// An in-memory GitHub. Cloning shares state, so a test can keep a handle
/// while the code under test owns another.
#[derive(Clone, Default)]
pub struct FakeGitHub {
    state: Arc<Mutex<State>>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_collaborator(&self, repo: &RepoId, login: &str) {
        self.state()
            .collaborators
            .insert((repo.clone(), login.to_string()));
    }

    pub fn add_org_member(&self, org: &str, login: &str) {
        self.state()
            .org_members
            .insert((org.to_string(), login.to_string()));
    }

    /// Makes every membership lookup fail.
    pub fn fail_membership(&self, message: &str) {
        self.state().membership_error = Some(message.to_string());
    }

    pub fn collaborator_checks(&self) -> u32 {
        self.state().collaborator_checks
    }

    pub fn org_member_checks(&self) -> u32 {
        self.state().org_member_checks
    }

    pub fn set_labels(&self, repo: &RepoId, number: PrNumber, labels: &[&str]) {
        self.state().labels.insert(
            (repo.clone(), number),
            labels.iter().map(|l| l.to_string()).collect(),
        );
    }

    pub fn labels(&self, repo: &RepoId, number: PrNumber) -> Vec<String> {
        self.state()
            .labels
            .get(&(repo.clone(), number))
            .cloned()
            .unwrap_or_default()
    }

    pub fn label_reads(&self) -> u32 {
        self.state().label_reads
    }

    pub fn add_comment(&self, repo: &RepoId, number: PrNumber, author: &str, body: &str) {
        let mut state = self.state();
        state.next_comment_id += 1;
        let id = CommentId(state.next_comment_id);
        state
            .comments
            .entry((repo.clone(), number))
            .or_default()
            .push(IssueComment {
                id,
                author: author.to_string(),
                body: body.to_string(),
            });
    }

    pub fn comments(&self, repo: &RepoId, number: PrNumber) -> Vec<IssueComment> {
        self.state()
            .comments
            .get(&(repo.clone(), number))
            .cloned()
            .unwrap_or_default()
    }

    pub fn deleted_comments(&self) -> Vec<CommentId> {
        self.state().deleted_comments.clone()
    }

    /// Statuses created through the API, in order.
    pub fn statuses(&self) -> Vec<(Sha, CommitStatus)> {
        self.state().statuses.clone()
    }

    pub fn fail_status_for(&self, context: &str) {
        self.state()
            .failing_status_contexts
            .insert(context.to_string());
    }

    /// Seeds what the combined status of `sha` reports.
    pub fn set_combined_status(&self, sha: &Sha, statuses: &[(&str, StatusState)]) {
        let statuses = statuses
            .iter()
            .map(|(context, state)| CommitStatus {
                state: *state,
                context: context.to_string(),
                description: String::new(),
                target_url: None,
            })
            .collect();
        self.state().combined.insert(sha.clone(), statuses);
    }

    pub fn add_pull_request(&self, pr: PullRequest) {
        self.state()
            .pulls
            .insert((pr.repo.clone(), pr.number), pr);
    }

    pub fn set_ref(&self, repo: &RepoId, git_ref: &str, sha: &str) {
        self.state()
            .refs
            .insert((repo.clone(), git_ref.to_string()), Sha::new(sha));
    }

    pub fn ref_reads(&self) -> u32 {
        self.state().ref_reads
    }

    pub fn set_changed_files(&self, repo: &RepoId, number: PrNumber, files: &[&str]) {
        self.state().changed_files.insert(
            (repo.clone(), number),
            files.iter().map(|f| f.to_string()).collect(),
        );
    }

    pub fn changed_file_reads(&self) -> u32 {
        self.state().changed_file_reads
    }

    pub fn set_failed_workflow_runs(&self, runs: &[u64]) {
        self.state().failed_runs = runs.to_vec();
    }

    pub fn reruns(&self) -> Vec<u64> {
        self.state().reruns.clone()
    }

    fn membership_error(&self) -> Result<(), GitHubApiError> {
        match &self.state().membership_error {
            Some(message) => Err(GitHubApiError::transient_without_source(message.clone())),
            None => Ok(()),
        }
    }
}

impl MembershipClient for FakeGitHub {
    async fn is_collaborator(&self, repo: &RepoId, login: &str) -> Result<bool, GitHubApiError> {
        self.state().collaborator_checks += 1;
        self.membership_error()?;
        Ok(self
            .state()
            .collaborators
            .contains(&(repo.clone(), login.to_string())))
    }

    async fn is_org_member(&self, org: &str, login: &str) -> Result<bool, GitHubApiError> {
        self.state().org_member_checks += 1;
        self.membership_error()?;
        Ok(self
            .state()
            .org_members
            .contains(&(org.to_string(), login.to_string())))
    }
}

impl LabelClient for FakeGitHub {
    async fn get_issue_labels(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> Result<Vec<String>, GitHubApiError> {
        self.state().label_reads += 1;
        Ok(self.labels(repo, number))
    }

    async fn add_label(
        &self,
        repo: &RepoId,
        number: PrNumber,
        label: &str,
    ) -> Result<(), GitHubApiError> {
        let mut state = self.state();
        let labels = state.labels.entry((repo.clone(), number)).or_default();
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
        Ok(())
    }

    async fn remove_label(
        &self,
        repo: &RepoId,
        number: PrNumber,
        label: &str,
    ) -> Result<(), GitHubApiError> {
        if let Some(labels) = self.state().labels.get_mut(&(repo.clone(), number)) {
            labels.retain(|l| l != label);
        }
        Ok(())
    }
}

impl CommentClient for FakeGitHub {
    async fn create_comment(
        &self,
        repo: &RepoId,
        number: PrNumber,
        body: &str,
    ) -> Result<CommentId, GitHubApiError> {
        self.add_comment(repo, number, BOT_LOGIN, body);
        Ok(CommentId(self.state().next_comment_id))
    }

    async fn list_comments(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> Result<Vec<IssueComment>, GitHubApiError> {
        Ok(self.comments(repo, number))
    }

    async fn delete_comment(&self, _repo: &RepoId, id: CommentId) -> Result<(), GitHubApiError> {
        let mut state = self.state();
        for comments in state.comments.values_mut() {
            comments.retain(|c| c.id != id);
        }
        state.deleted_comments.push(id);
        Ok(())
    }
}

impl StatusClient for FakeGitHub {
    async fn combined_status(
        &self,
        _repo: &RepoId,
        sha: &Sha,
    ) -> Result<CombinedStatus, GitHubApiError> {
        Ok(CombinedStatus {
            sha: sha.clone(),
            statuses: self.state().combined.get(sha).cloned().unwrap_or_default(),
        })
    }

    async fn create_status(
        &self,
        _repo: &RepoId,
        sha: &Sha,
        status: &CommitStatus,
    ) -> Result<(), GitHubApiError> {
        let mut state = self.state();
        if state.failing_status_contexts.contains(&status.context) {
            return Err(GitHubApiError::from_status(500, "status API unavailable"));
        }
        state.statuses.push((sha.clone(), status.clone()));
        Ok(())
    }
}

impl PullRequestClient for FakeGitHub {
    async fn get_pull_request(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> Result<PullRequest, GitHubApiError> {
        self.state()
            .pulls
            .get(&(repo.clone(), number))
            .cloned()
            .ok_or_else(|| GitHubApiError::from_status(404, "pull request not found"))
    }

    async fn get_ref(&self, repo: &RepoId, git_ref: &str) -> Result<Sha, GitHubApiError> {
        let mut state = self.state();
        state.ref_reads += 1;
        state
            .refs
            .get(&(repo.clone(), git_ref.to_string()))
            .cloned()
            .ok_or_else(|| GitHubApiError::from_status(404, format!("ref {git_ref} not found")))
    }

    async fn changed_files(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> Result<Vec<String>, GitHubApiError> {
        let mut state = self.state();
        state.changed_file_reads += 1;
        Ok(state
            .changed_files
            .get(&(repo.clone(), number))
            .cloned()
            .unwrap_or_default())
    }
}

impl BotIdentity for FakeGitHub {
    fn bot_login(&self) -> &str {
        BOT_LOGIN
    }
}

impl WorkflowClient for FakeGitHub {
    async fn failed_workflow_runs(
        &self,
        _repo: &RepoId,
        _head_ref: &str,
        _head_sha: &Sha,
    ) -> Result<Vec<u64>, GitHubApiError> {
        Ok(self.state().failed_runs.clone())
    }

    async fn rerun_failed_jobs(&self, _repo: &RepoId, run_id: u64) -> Result<(), GitHubApiError> {
        self.state().reruns.push(run_id);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateFailure {
    Conflict,
    Other,
}

/// A [`JobStore`] that fails on request, counting attempts per job name.
#[derive(Default)]
pub struct FlakyJobStore {
    inner: InMemoryJobStore,
    failing_jobs: HashSet<String>,
    already_existing: bool,
    fail_first: AtomicU32,
    update_failure: Option<UpdateFailure>,
    attempts: Mutex<HashMap<String, u32>>,
    update_attempts: AtomicU32,
}

impl FlakyJobStore {
    /// Creation of the named jobs always fails.
    pub fn failing_jobs(jobs: &[&str]) -> Self {
        FlakyJobStore {
            failing_jobs: jobs.iter().map(|j| j.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Every creation reports that the record already exists.
    pub fn already_existing() -> Self {
        FlakyJobStore {
            already_existing: true,
            ..Default::default()
        }
    }

    /// The first `n` creations fail, later ones succeed.
    pub fn failing_first(n: u32) -> Self {
        FlakyJobStore {
            fail_first: AtomicU32::new(n),
            ..Default::default()
        }
    }

    pub fn conflicting_updates() -> Self {
        FlakyJobStore {
            update_failure: Some(UpdateFailure::Conflict),
            ..Default::default()
        }
    }

    pub fn failing_updates() -> Self {
        FlakyJobStore {
            update_failure: Some(UpdateFailure::Other),
            ..Default::default()
        }
    }

    /// Creation attempts for records of the named job.
    pub fn attempts_for(&self, job: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(job)
            .copied()
            .unwrap_or_default()
    }

    /// Job names of the records actually stored, sorted.
    pub fn created_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .all()
            .into_iter()
            .map(|record| record.spec.job)
            .collect();
        names.sort();
        names
    }

    pub fn update_attempts(&self) -> u32 {
        self.update_attempts.load(Ordering::SeqCst)
    }
}

impl JobStore for FlakyJobStore {
    async fn create(&self, job: &JobRecord) -> Result<JobRecord, JobStoreError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(job.spec.job.clone())
            .or_default() += 1;

        if self.failing_jobs.contains(&job.spec.job) {
            return Err(JobStoreError::Other("injected failure".to_string()));
        }
        if self.already_existing {
            return Err(JobStoreError::AlreadyExists(job.name.clone()));
        }
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(JobStoreError::Other("transient failure".to_string()));
        }
        self.inner.create(job).await
    }

    async fn list(&self, selector: &LabelSelector) -> Result<Vec<JobRecord>, JobStoreError> {
        self.inner.list(selector).await
    }

    async fn update(&self, job: &JobRecord) -> Result<JobRecord, JobStoreError> {
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        match self.update_failure {
            Some(UpdateFailure::Conflict) => Err(JobStoreError::Conflict {
                name: job.name.clone(),
                expected: job.resource_version,
                actual: job.resource_version + 1,
            }),
            Some(UpdateFailure::Other) => Err(JobStoreError::Other("injected failure".to_string())),
            None => self.inner.update(job).await,
        }
    }
}
