//! Changed-file matching for `run_if_changed` and `skip_if_only_changed` jobs.
//!
//! The list of changed files costs an API call for pull requests, so it is
//! fetched through [`DeferredChanges`]: at most once per event, and only when
//! some job's change matcher asks for it.

use std::future::Future;

use regex::Regex;
use tokio::sync::OnceCell;

use crate::github::{GitHubApiError, PullRequestClient};
use crate::types::{PrNumber, RepoId};

/// Somewhere the changed files of an event can be read from.
pub trait ChangedFilesSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Vec<String>, GitHubApiError>> + Send;
}

/// A change list that is already known, such as the files listed in a push
/// payload.
#[derive(Debug, Clone, Default)]
pub struct KnownChanges(pub Vec<String>);

impl ChangedFilesSource for KnownChanges {
    async fn fetch(&self) -> Result<Vec<String>, GitHubApiError> {
        Ok(self.0.clone())
    }
}

/// The files touched by a pull request, read from GitHub.
pub struct PullRequestChanges<'a, G> {
    client: &'a G,
    repo: &'a RepoId,
    number: PrNumber,
}

impl<'a, G: PullRequestClient> PullRequestChanges<'a, G> {
    pub fn new(client: &'a G, repo: &'a RepoId, number: PrNumber) -> Self {
        Self {
            client,
            repo,
            number,
        }
    }
}

impl<G: PullRequestClient> ChangedFilesSource for PullRequestChanges<'_, G> {
    async fn fetch(&self) -> Result<Vec<String>, GitHubApiError> {
        self.client.changed_files(self.repo, self.number).await
    }
}

/// Memoizes a [`ChangedFilesSource`].
///
/// A successful fetch is cached for the lifetime of this value. A failed fetch
/// is not cached, and the error is returned to the caller.
pub struct DeferredChanges<S> {
    source: S,
    cache: OnceCell<Vec<String>>,
}

impl<S: ChangedFilesSource> DeferredChanges<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<&[String], GitHubApiError> {
        self.cache
            .get_or_try_init(|| self.source.fetch())
            .await
            .map(Vec::as_slice)
    }
}

impl DeferredChanges<KnownChanges> {
    pub fn known(files: Vec<String>) -> Self {
        Self::new(KnownChanges(files))
    }
}

/// Path-based run conditions of a job.
#[derive(Debug, Clone, Default)]
pub struct RegexpChangeMatcher {
    run_if_changed: Option<Regex>,
    skip_if_only_changed: Option<Regex>,
}

impl RegexpChangeMatcher {
    pub fn new(run_if_changed: Option<Regex>, skip_if_only_changed: Option<Regex>) -> Self {
        Self {
            run_if_changed,
            skip_if_only_changed,
        }
    }

    /// True when the matcher has an opinion, i.e. the job is path-gated.
    pub fn could_run(&self) -> bool {
        self.run_if_changed.is_some() || self.skip_if_only_changed.is_some()
    }

    /// Whether the given changes warrant a run.
    ///
    /// `run_if_changed` wants any changed file to match; `skip_if_only_changed`
    /// wants any changed file not to match.
    pub fn runs_against_changes(&self, changes: &[String]) -> bool {
        changes.iter().any(|change| {
            self.run_if_changed
                .as_ref()
                .is_some_and(|re| re.is_match(change))
                || self
                    .skip_if_only_changed
                    .as_ref()
                    .is_some_and(|re| !re.is_match(change))
        })
    }

    /// `Ok(None)` when the matcher has no opinion; otherwise whether the job
    /// should run. Changed files are only fetched in the second case.
    pub async fn should_run<S: ChangedFilesSource>(
        &self,
        changes: &DeferredChanges<S>,
    ) -> Result<Option<bool>, GitHubApiError> {
        if !self.could_run() {
            return Ok(None);
        }
        let files = changes.get().await?;
        Ok(Some(self.runs_against_changes(files)))
    }
}
