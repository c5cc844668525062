//! The job catalog: which presubmits and postsubmits exist for a repository.
//!
//! [`JobCatalog`] is the seam to the configuration system. [`StaticCatalog`]
//! serves jobs loaded from the service configuration; [`FallbackCatalog`]
//! puts a dynamic source (for example in-repo job definitions) in front of a
//! static one and falls back when the dynamic source fails.

pub mod brancher;
pub mod changes;
pub mod job;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::{RepoId, Sha};

pub use brancher::Brancher;
pub use changes::{
    ChangedFilesSource, DeferredChanges, KnownChanges, PullRequestChanges, RegexpChangeMatcher,
};
pub use job::{Postsubmit, PostsubmitConfig, Presubmit, PresubmitConfig};

/// Errors raised while loading or querying the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid {field} regex in job {job}: {source}")]
    InvalidRegex {
        job: String,
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("invalid job {job}: {reason}")]
    InvalidJob { job: String, reason: String },

    #[error("invalid repository name {0:?}, expected org/repo")]
    InvalidRepo(String),

    /// Two presubmits report the same context and could both run on some
    /// branch, so results would clobber each other.
    #[error("jobs {first} and {second} in {repo} share context {context} on overlapping branches")]
    OverlappingContexts {
        repo: RepoId,
        context: String,
        first: String,
        second: String,
    },

    #[error("job configuration unavailable for {repo}: {reason}")]
    Unavailable { repo: RepoId, reason: String },
}

/// Jobs as written in configuration, keyed by `org/repo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub presubmits: BTreeMap<String, Vec<PresubmitConfig>>,
    pub postsubmits: BTreeMap<String, Vec<PostsubmitConfig>>,
}

/// What a catalog lookup is about.
#[derive(Debug, Clone, Copy)]
pub struct CatalogQuery<'a> {
    pub repo: &'a RepoId,
    pub base_ref: &'a str,
    /// The head commit, when the lookup is for a pull request. Dynamic
    /// sources read job definitions at this commit.
    pub head_sha: Option<&'a Sha>,
}

/// Source of job definitions.
pub trait JobCatalog: Send + Sync {
    fn presubmits(
        &self,
        query: CatalogQuery<'_>,
    ) -> impl Future<Output = Result<Vec<Presubmit>, CatalogError>> + Send;

    fn postsubmits(
        &self,
        query: CatalogQuery<'_>,
    ) -> impl Future<Output = Result<Vec<Postsubmit>, CatalogError>> + Send;

    /// Presubmits known without consulting any dynamic source. Used for
    /// cheap relevance checks on comments.
    fn static_presubmits(&self, repo: &RepoId) -> Vec<Presubmit>;
}

/// Jobs loaded once from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    presubmits: HashMap<RepoId, Vec<Presubmit>>,
    postsubmits: HashMap<RepoId, Vec<Postsubmit>>,
}

impl StaticCatalog {
    /// Compiles and validates configured jobs.
    pub fn from_config(config: CatalogConfig) -> Result<Self, CatalogError> {
        let mut presubmits = HashMap::new();
        for (name, jobs) in config.presubmits {
            let repo = RepoId::parse(&name).ok_or(CatalogError::InvalidRepo(name))?;
            let compiled = jobs
                .into_iter()
                .map(Presubmit::compile)
                .collect::<Result<Vec<_>, _>>()?;
            validate_contexts(&repo, &compiled)?;
            presubmits.insert(repo, compiled);
        }

        let mut postsubmits = HashMap::new();
        for (name, jobs) in config.postsubmits {
            let repo = RepoId::parse(&name).ok_or(CatalogError::InvalidRepo(name))?;
            let compiled = jobs
                .into_iter()
                .map(Postsubmit::compile)
                .collect::<Result<Vec<_>, _>>()?;
            postsubmits.insert(repo, compiled);
        }

        Ok(StaticCatalog {
            presubmits,
            postsubmits,
        })
    }

    pub fn presubmits_for(&self, repo: &RepoId) -> &[Presubmit] {
        self.presubmits.get(repo).map_or(&[], Vec::as_slice)
    }

    pub fn postsubmits_for(&self, repo: &RepoId) -> &[Postsubmit] {
        self.postsubmits.get(repo).map_or(&[], Vec::as_slice)
    }
}

impl JobCatalog for StaticCatalog {
    async fn presubmits(&self, query: CatalogQuery<'_>) -> Result<Vec<Presubmit>, CatalogError> {
        Ok(self.presubmits_for(query.repo).to_vec())
    }

    async fn postsubmits(&self, query: CatalogQuery<'_>) -> Result<Vec<Postsubmit>, CatalogError> {
        Ok(self.postsubmits_for(query.repo).to_vec())
    }

    fn static_presubmits(&self, repo: &RepoId) -> Vec<Presubmit> {
        self.presubmits_for(repo).to_vec()
    }
}

/// A dynamic catalog backed by a static one.
///
/// Failures of the dynamic source are logged and answered from the static
/// catalog, so a broken in-repo definition never blocks testing entirely.
#[derive(Debug, Clone)]
pub struct FallbackCatalog<D> {
    dynamic: D,
    fallback: StaticCatalog,
}

impl<D: JobCatalog> FallbackCatalog<D> {
    pub fn new(dynamic: D, fallback: StaticCatalog) -> Self {
        Self { dynamic, fallback }
    }
}

impl<D: JobCatalog> JobCatalog for FallbackCatalog<D> {
    async fn presubmits(&self, query: CatalogQuery<'_>) -> Result<Vec<Presubmit>, CatalogError> {
        match self.dynamic.presubmits(query).await {
            Ok(jobs) => Ok(jobs),
            Err(e) => {
                warn!(repo = %query.repo, error = %e, "Falling back to static presubmits");
                Ok(self.fallback.presubmits_for(query.repo).to_vec())
            }
        }
    }

    async fn postsubmits(&self, query: CatalogQuery<'_>) -> Result<Vec<Postsubmit>, CatalogError> {
        match self.dynamic.postsubmits(query).await {
            Ok(jobs) => Ok(jobs),
            Err(e) => {
                warn!(repo = %query.repo, error = %e, "Falling back to static postsubmits");
                Ok(self.fallback.postsubmits_for(query.repo).to_vec())
            }
        }
    }

    fn static_presubmits(&self, repo: &RepoId) -> Vec<Presubmit> {
        self.fallback.presubmits_for(repo).to_vec()
    }
}

/// Rejects presubmits that share a context and could run on the same branch.
fn validate_contexts(repo: &RepoId, jobs: &[Presubmit]) -> Result<(), CatalogError> {
    for (i, first) in jobs.iter().enumerate() {
        for second in &jobs[i + 1..] {
            if first.context == second.context && first.brancher.intersects(&second.brancher) {
                return Err(CatalogError::OverlappingContexts {
                    repo: repo.clone(),
                    context: first.context.clone(),
                    first: first.name.clone(),
                    second: second.name.clone(),
                });
            }
        }
    }
    Ok(())
}
