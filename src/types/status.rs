//! Commit status types (the legacy Status API that presubmits report to).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ids::Sha;

/// State of a commit status context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    Pending,
    Success,
    Failure,
    Error,
}

impl StatusState {
    /// Failure and error both count as a failed run for `/retest`.
    pub fn is_failed(&self) -> bool {
        matches!(self, StatusState::Failure | StatusState::Error)
    }

    pub fn as_api_str(&self) -> &'static str {
        match self {
            StatusState::Pending => "pending",
            StatusState::Success => "success",
            StatusState::Failure => "failure",
            StatusState::Error => "error",
        }
    }
}

/// A single status posted against a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub state: StatusState,
    pub context: String,
    pub description: String,
    pub target_url: Option<String>,
}

impl CommitStatus {
    /// The status posted for a presubmit that was deliberately not run.
    pub fn skipped(context: impl Into<String>) -> Self {
        CommitStatus {
            state: StatusState::Success,
            context: context.into(),
            description: "Skipped.".to_string(),
            target_url: None,
        }
    }
}

/// The latest status of each context on a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedStatus {
    pub sha: Sha,
    pub statuses: Vec<CommitStatus>,
}

impl CombinedStatus {
    /// Contexts whose latest state is failure or error.
    pub fn failed_contexts(&self) -> BTreeSet<String> {
        self.statuses
            .iter()
            .filter(|s| s.state.is_failed())
            .map(|s| s.context.clone())
            .collect()
    }

    /// Every context that has reported anything.
    pub fn all_contexts(&self) -> BTreeSet<String> {
        self.statuses.iter().map(|s| s.context.clone()).collect()
    }
}
