//! Service configuration.
//!
//! Everything except secrets comes from a YAML file, by default
//! `config.yaml`, overridden by `PRESUBMIT_TRIGGER_CONFIG`. Secrets come from
//! `GITHUB_TOKEN` and `WEBHOOK_SECRET`.
//!
//! ```yaml
//! listen: 0.0.0.0:8888
//! bot_login: ci-robot
//! triggers:
//!   - repos: [kubernetes]
//!     trusted_org: kubernetes-sigs
//!     join_org_url: https://git.k8s.io/community/community-membership.md
//! catalog:
//!   presubmits:
//!     kubernetes/test-infra:
//!       - name: unit
//!         always_run: true
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogConfig;
use crate::respond::{DEFAULT_ABOUT, WelcomeOptions};
use crate::trust::TrustPolicy;
use crate::types::RepoId;

pub const CONFIG_PATH_ENV: &str = "PRESUBMIT_TRIGGER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const WEBHOOK_SECRET_ENV: &str = "WEBHOOK_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("environment variable {0} must be set")]
    MissingEnv(&'static str),
}

/// Trigger behavior for a set of orgs or repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// `org` or `org/repo` entries this block applies to.
    pub repos: Vec<String>,

    /// Trust only org members, not repository collaborators.
    pub only_org_members: bool,

    /// A second org whose members are trusted.
    pub trusted_org: Option<String>,

    /// Logins trusted without lookup, such as automation apps.
    pub trusted_apps: Vec<String>,

    /// Where the welcome comment tells contributors to apply for membership.
    pub join_org_url: Option<String>,

    /// Untrusted PRs can never be made testable with `/ok-to-test`.
    pub ignore_ok_to_test: bool,

    /// Do not post "Skipped." statuses for jobs that do not run.
    pub elide_skipped_contexts: bool,

    /// Do not test draft PRs automatically.
    pub skip_draft_pr: bool,

    /// Re-run failed GitHub Actions runs on `/retest` and `/test all`.
    pub trigger_github_workflows: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig {
            repos: Vec::new(),
            only_org_members: false,
            trusted_org: None,
            trusted_apps: Vec::new(),
            join_org_url: None,
            ignore_ok_to_test: false,
            elide_skipped_contexts: false,
            skip_draft_pr: true,
            trigger_github_workflows: false,
        }
    }
}

impl TriggerConfig {
    pub fn applies_to(&self, repo: &RepoId) -> bool {
        let full_name = repo.to_string();
        self.repos
            .iter()
            .any(|entry| *entry == full_name || *entry == repo.owner)
    }

    pub fn trust_policy(&self) -> TrustPolicy {
        TrustPolicy {
            only_org_members: self.only_org_members,
            trusted_org: self.trusted_org.clone(),
            trusted_apps: self.trusted_apps.clone(),
        }
    }

    pub fn welcome_options<'a>(&'a self, commands_url: Option<&'a str>) -> WelcomeOptions<'a> {
        WelcomeOptions {
            ignore_ok_to_test: self.ignore_ok_to_test,
            trusted_org: self.trusted_org.as_deref(),
            join_org_url: self.join_org_url.as_deref(),
            commands_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: SocketAddr,

    /// The login the bot comments as. Its own comments and label changes are
    /// ignored.
    pub bot_login: String,

    /// Footer for every reply. Defaults to a generic blurb.
    pub about_text: Option<String>,

    /// Documentation link included in welcome comments.
    pub commands_url: Option<String>,

    pub triggers: Vec<TriggerConfig>,

    pub catalog: CatalogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: SocketAddr::from(([0, 0, 0, 0], 8888)),
            bot_login: String::new(),
            about_text: None,
            commands_url: None,
            triggers: Vec::new(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl Config {
    pub fn from_yaml(path: &Path, yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(path, &yaml)
    }

    /// Path from `PRESUBMIT_TRIGGER_CONFIG`, or `config.yaml`.
    pub fn path_from_env() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// The first trigger block naming `repo` or its org, or the defaults.
    pub fn trigger_for(&self, repo: &RepoId) -> TriggerConfig {
        self.triggers
            .iter()
            .find(|trigger| trigger.applies_to(repo))
            .cloned()
            .unwrap_or_default()
    }

    pub fn about(&self) -> &str {
        self.about_text.as_deref().unwrap_or(DEFAULT_ABOUT)
    }
}

/// Credentials read from the environment.
#[derive(Clone)]
pub struct Secrets {
    pub github_token: String,
    pub webhook_secret: Vec<u8>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        let github_token =
            std::env::var(GITHUB_TOKEN_ENV).map_err(|_| ConfigError::MissingEnv(GITHUB_TOKEN_ENV))?;
        let webhook_secret = std::env::var(WEBHOOK_SECRET_ENV)
            .map_err(|_| ConfigError::MissingEnv(WEBHOOK_SECRET_ENV))?;
        Ok(Secrets {
            github_token,
            webhook_secret: webhook_secret.into_bytes(),
        })
    }
}
