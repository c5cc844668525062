//! Job definitions as configured and as compiled for matching.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::github::GitHubApiError;

use super::CatalogError;
use super::brancher::Brancher;
use super::changes::{ChangedFilesSource, DeferredChanges, RegexpChangeMatcher};

/// The trigger a presubmit gets when none is configured: `/test <name>`
/// anywhere in a `/test` line's target list.
pub fn default_trigger_for(name: &str) -> String {
    format!(r"(?m)^/test( | .* ){},?($|\s.*)", regex::escape(name))
}

pub fn default_rerun_command_for(name: &str) -> String {
    format!("/test {}", name)
}

/// A presubmit as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresubmitConfig {
    pub name: String,
    /// Status context; defaults to the job name.
    pub context: Option<String>,
    pub always_run: bool,
    /// Optional jobs are listed separately in help and ignored by
    /// `/retest-required`.
    pub optional: bool,
    pub run_if_changed: Option<String>,
    pub skip_if_only_changed: Option<String>,
    pub trigger: Option<String>,
    pub rerun_command: Option<String>,
    pub branches: Vec<String>,
    pub skip_branches: Vec<String>,
    /// Jobs that do not report never get a "Skipped." status either.
    pub skip_report: bool,
}

/// A postsubmit as written in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostsubmitConfig {
    pub name: String,
    /// Unset means "run unless a change matcher says otherwise".
    pub always_run: Option<bool>,
    pub run_if_changed: Option<String>,
    pub skip_if_only_changed: Option<String>,
    pub branches: Vec<String>,
    pub skip_branches: Vec<String>,
}

/// A presubmit ready for matching.
#[derive(Debug, Clone)]
pub struct Presubmit {
    pub name: String,
    pub context: String,
    pub always_run: bool,
    pub optional: bool,
    pub skip_report: bool,
    pub rerun_command: String,
    trigger: Regex,
    pub brancher: Brancher,
    pub changes: RegexpChangeMatcher,
}

impl Presubmit {
    pub fn compile(config: PresubmitConfig) -> Result<Self, CatalogError> {
        let name = config.name;
        if name.is_empty() {
            return Err(CatalogError::InvalidJob {
                job: name,
                reason: "job name must not be empty".to_string(),
            });
        }
        let path_gated = config.run_if_changed.is_some() || config.skip_if_only_changed.is_some();
        if config.always_run && path_gated {
            return Err(CatalogError::InvalidJob {
                job: name,
                reason: "always_run cannot be combined with run_if_changed or skip_if_only_changed"
                    .to_string(),
            });
        }
        if config.run_if_changed.is_some() && config.skip_if_only_changed.is_some() {
            return Err(CatalogError::InvalidJob {
                job: name,
                reason: "run_if_changed and skip_if_only_changed are mutually exclusive".to_string(),
            });
        }
        if config.trigger.is_some() != config.rerun_command.is_some() {
            return Err(CatalogError::InvalidJob {
                job: name,
                reason: "trigger and rerun_command must be set together".to_string(),
            });
        }

        let trigger_src = config
            .trigger
            .unwrap_or_else(|| default_trigger_for(&name));
        let trigger = compile_field(&name, "trigger", &trigger_src)?;
        let brancher = Brancher::new(config.branches, config.skip_branches).map_err(|source| {
            CatalogError::InvalidRegex {
                job: name.clone(),
                field: "branches",
                source,
            }
        })?;
        let changes = RegexpChangeMatcher::new(
            compile_optional(&name, "run_if_changed", config.run_if_changed)?,
            compile_optional(&name, "skip_if_only_changed", config.skip_if_only_changed)?,
        );

        Ok(Presubmit {
            context: config.context.unwrap_or_else(|| name.clone()),
            rerun_command: config
                .rerun_command
                .unwrap_or_else(|| default_rerun_command_for(&name)),
            name,
            always_run: config.always_run,
            optional: config.optional,
            skip_report: config.skip_report,
            trigger,
            brancher,
            changes,
        })
    }

    /// Whether the comment body explicitly asks for this job.
    pub fn trigger_matches(&self, body: &str) -> bool {
        self.trigger.is_match(body)
    }

    /// Whether the job's branch restrictions admit `branch`.
    pub fn could_run(&self, branch: &str) -> bool {
        self.brancher.should_run(branch)
    }

    /// Jobs that are neither `always_run` nor path-gated only run when
    /// somebody asks for them by name.
    pub fn needs_explicit_trigger(&self) -> bool {
        !self.always_run && !self.changes.could_run()
    }

    /// Final run decision for a job that a filter selected.
    ///
    /// Order: branch restrictions, `always_run`, an explicit request, the
    /// change matcher, and finally the filter's default.
    pub async fn should_run<S: ChangedFilesSource>(
        &self,
        branch: &str,
        changes: &DeferredChanges<S>,
        forced: bool,
        default: bool,
    ) -> Result<bool, GitHubApiError> {
        if !self.could_run(branch) {
            return Ok(false);
        }
        if self.always_run || forced {
            return Ok(true);
        }
        match self.changes.should_run(changes).await? {
            Some(decision) => Ok(decision),
            None => Ok(default),
        }
    }
}

/// A postsubmit ready for matching.
#[derive(Debug, Clone)]
pub struct Postsubmit {
    pub name: String,
    pub always_run: Option<bool>,
    pub brancher: Brancher,
    pub changes: RegexpChangeMatcher,
}

impl Postsubmit {
    pub fn compile(config: PostsubmitConfig) -> Result<Self, CatalogError> {
        let name = config.name;
        if name.is_empty() {
            return Err(CatalogError::InvalidJob {
                job: name,
                reason: "job name must not be empty".to_string(),
            });
        }
        let brancher = Brancher::new(config.branches, config.skip_branches).map_err(|source| {
            CatalogError::InvalidRegex {
                job: name.clone(),
                field: "branches",
                source,
            }
        })?;
        let changes = RegexpChangeMatcher::new(
            compile_optional(&name, "run_if_changed", config.run_if_changed)?,
            compile_optional(&name, "skip_if_only_changed", config.skip_if_only_changed)?,
        );
        Ok(Postsubmit {
            name,
            always_run: config.always_run,
            brancher,
            changes,
        })
    }

    /// Whether a push to `branch` with the given changes should run this job.
    pub async fn should_run<S: ChangedFilesSource>(
        &self,
        branch: &str,
        changes: &DeferredChanges<S>,
    ) -> Result<bool, GitHubApiError> {
        if !self.brancher.should_run(branch) {
            return Ok(false);
        }
        if self.always_run == Some(true) {
            return Ok(true);
        }
        match self.changes.should_run(changes).await? {
            Some(decision) => Ok(decision),
            None => Ok(self.always_run.unwrap_or(true)),
        }
    }
}

fn compile_field(job: &str, field: &'static str, pattern: &str) -> Result<Regex, CatalogError> {
    Regex::new(pattern).map_err(|source| CatalogError::InvalidRegex {
        job: job.to_string(),
        field,
        source,
    })
}

fn compile_optional(
    job: &str,
    field: &'static str,
    pattern: Option<String>,
) -> Result<Option<Regex>, CatalogError> {
    pattern.map(|p| compile_field(job, field, &p)).transpose()
}
