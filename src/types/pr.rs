//! Pull request snapshots and the label vocabulary the trigger understands.

use serde::{Deserialize, Serialize};

use super::ids::{PrNumber, RepoId, Sha};

/// Label a trusted member applies to allow testing of an untrusted PR.
pub const OK_TO_TEST_LABEL: &str = "ok-to-test";

/// Label applied to untrusted PRs until someone vouches for them.
pub const NEEDS_OK_TO_TEST_LABEL: &str = "needs-ok-to-test";

/// Approval label. Applying it to an untrusted PR starts one full run.
pub const LGTM_LABEL: &str = "lgtm";

/// Whether a pull request is open or closed.
///
/// Merged PRs are closed as far as triggering is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Closed,
}

impl PrState {
    pub fn is_open(&self) -> bool {
        matches!(self, PrState::Open)
    }
}

/// A point-in-time view of a pull request, as carried by a webhook or
/// fetched from GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub repo: RepoId,
    pub number: PrNumber,

    /// The branch the PR targets.
    pub base_ref: String,

    /// The base SHA recorded on the PR. Jobs are run against the current tip
    /// of `base_ref` instead, which is resolved separately.
    pub base_sha: Sha,

    pub head_ref: String,
    pub head_sha: Sha,

    /// Login of the PR author.
    pub author: String,

    pub is_draft: bool,
    pub state: PrState,
    pub html_url: String,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

/// Returns true if `labels` contains `label`.
pub fn has_label(labels: &[String], label: &str) -> bool {
    labels.iter().any(|l| l == label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_label_matches_exact_names_only() {
        let labels = vec!["lgtm".to_string(), "needs-ok-to-test".to_string()];
        assert!(has_label(&labels, NEEDS_OK_TO_TEST_LABEL));
        assert!(has_label(&labels, LGTM_LABEL));
        assert!(!has_label(&labels, OK_TO_TEST_LABEL));
    }

    #[test]
    fn pr_state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&PrState::Open).unwrap(), "\"open\"");
        assert_eq!(serde_json::to_string(&PrState::Closed).unwrap(), "\"closed\"");
    }
}
