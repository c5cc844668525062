//! Who may start CI.
//!
//! A user is trusted if any of these hold, checked in order and stopping at
//! the first success:
//!
//! 1. they are a repository collaborator (skipped when `only_org_members`),
//! 2. they are a member of the repository's organization,
//! 3. they are a member of the configured secondary trusted organization.
//!
//! A pull request is trusted if its author is, or if a trusted member has
//! applied the `ok-to-test` label.
//!
//! Lookup failures are errors, never a default answer in either direction.

use std::fmt;

use thiserror::Error;

use crate::github::{GitHubApiError, LabelClient, MembershipClient};
use crate::types::{OK_TO_TEST_LABEL, PrNumber, RepoId, has_label};

/// The knobs that decide who counts as trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Only organization members are trusted; collaborators are not.
    pub only_org_members: bool,

    /// A second organization whose members are trusted everywhere.
    pub trusted_org: Option<String>,

    /// Logins (typically GitHub Apps) trusted without any lookup.
    pub trusted_apps: Vec<String>,
}

/// Why a user was not trusted. Several reasons can hold at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustReason {
    pub not_collaborator: bool,
    pub not_member: bool,
    pub not_secondary_member: bool,
}

impl fmt::Display for TrustReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.not_collaborator {
            parts.push("not a collaborator");
        }
        if self.not_member {
            parts.push("not an org member");
        }
        if self.not_secondary_member {
            parts.push("not a member of the trusted org");
        }
        if parts.is_empty() {
            write!(f, "trusted")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// The outcome of a user trust check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustDecision {
    pub trusted: bool,
    pub reason: TrustReason,
}

impl TrustDecision {
    fn trusted() -> Self {
        TrustDecision {
            trusted: true,
            reason: TrustReason::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("error checking {user} for trust: {source}")]
    Lookup {
        user: String,
        #[source]
        source: GitHubApiError,
    },

    #[error("error reading labels of {repo}{number}: {source}")]
    Labels {
        repo: RepoId,
        number: PrNumber,
        #[source]
        source: GitHubApiError,
    },
}

/// Decides whether `user` may start CI in `repo`.
pub async fn trusted_user<C: MembershipClient>(
    client: &C,
    policy: &TrustPolicy,
    user: &str,
    repo: &RepoId,
) -> Result<TrustDecision, TrustError> {
    if policy
        .trusted_apps
        .iter()
        .any(|app| app.eq_ignore_ascii_case(user))
    {
        return Ok(TrustDecision::trusted());
    }

    let lookup_error = |source| TrustError::Lookup {
        user: user.to_string(),
        source,
    };
    let mut reason = TrustReason::default();

    if !policy.only_org_members {
        if client
            .is_collaborator(repo, user)
            .await
            .map_err(lookup_error)?
        {
            return Ok(TrustDecision::trusted());
        }
        reason.not_collaborator = true;
    }

    if client
        .is_org_member(&repo.owner, user)
        .await
        .map_err(lookup_error)?
    {
        return Ok(TrustDecision::trusted());
    }
    reason.not_member = true;

    if let Some(org) = &policy.trusted_org
        && org != &repo.owner
    {
        if client.is_org_member(org, user).await.map_err(lookup_error)? {
            return Ok(TrustDecision::trusted());
        }
        reason.not_secondary_member = true;
    }

    Ok(TrustDecision {
        trusted: false,
        reason,
    })
}

/// Decides whether the PR may be tested.
///
/// `labels` are the PR's labels if the caller already has them; otherwise
/// they are fetched, but only when the author is not trusted. The labels used
/// (possibly empty if never needed) are returned for reuse.
pub async fn trusted_pull_request<C: MembershipClient + LabelClient>(
    client: &C,
    policy: &TrustPolicy,
    author: &str,
    repo: &RepoId,
    number: PrNumber,
    labels: Option<Vec<String>>,
) -> Result<(Vec<String>, bool), TrustError> {
    let decision = trusted_user(client, policy, author, repo).await?;
    if decision.trusted {
        return Ok((labels.unwrap_or_default(), true));
    }

    let labels = match labels {
        Some(labels) => labels,
        None => client
            .get_issue_labels(repo, number)
            .await
            .map_err(|source| TrustError::Labels {
                repo: repo.clone(),
                number,
                source,
            })?,
    };
    let trusted = has_label(&labels, OK_TO_TEST_LABEL);
    Ok((labels, trusted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeGitHub;

    fn repo() -> RepoId {
        RepoId::new("kubernetes", "test-infra")
    }

    #[tokio::test]
    async fn collaborator_is_trusted() {
        let gh = FakeGitHub::new();
        gh.add_collaborator(&repo(), "alice");

        let decision = trusted_user(&gh, &TrustPolicy::default(), "alice", &repo())
            .await
            .unwrap();
        assert!(decision.trusted);
    }

    #[tokio::test]
    async fn collaborator_ignored_when_only_org_members() {
        let gh = FakeGitHub::new();
        gh.add_collaborator(&repo(), "alice");
        let policy = TrustPolicy {
            only_org_members: true,
            ..Default::default()
        };

        let decision = trusted_user(&gh, &policy, "alice", &repo()).await.unwrap();
        assert!(!decision.trusted);
        assert!(decision.reason.not_member);
        assert!(!decision.reason.not_collaborator);
        assert_eq!(gh.collaborator_checks(), 0);
    }

    #[tokio::test]
    async fn org_member_is_trusted() {
        let gh = FakeGitHub::new();
        gh.add_org_member("kubernetes", "bob");

        let decision = trusted_user(&gh, &TrustPolicy::default(), "bob", &repo())
            .await
            .unwrap();
        assert!(decision.trusted);
    }

    #[tokio::test]
    async fn secondary_org_member_is_trusted() {
        let gh = FakeGitHub::new();
        gh.add_org_member("kubernetes-sigs", "carol");
        let policy = TrustPolicy {
            trusted_org: Some("kubernetes-sigs".to_string()),
            ..Default::default()
        };

        let decision = trusted_user(&gh, &policy, "carol", &repo()).await.unwrap();
        assert!(decision.trusted);
    }

    #[tokio::test]
    async fn untrusted_reason_lists_every_failed_check() {
        let gh = FakeGitHub::new();
        let policy = TrustPolicy {
            trusted_org: Some("kubernetes-sigs".to_string()),
            ..Default::default()
        };

        let decision = trusted_user(&gh, &policy, "mallory", &repo()).await.unwrap();
        assert!(!decision.trusted);
        assert_eq!(
            decision.reason,
            TrustReason {
                not_collaborator: true,
                not_member: true,
                not_secondary_member: true,
            }
        );
        assert_eq!(
            decision.reason.to_string(),
            "not a collaborator, not an org member, not a member of the trusted org"
        );
    }

    #[tokio::test]
    async fn secondary_org_equal_to_repo_org_is_not_rechecked() {
        let gh = FakeGitHub::new();
        let policy = TrustPolicy {
            trusted_org: Some("kubernetes".to_string()),
            ..Default::default()
        };

        let decision = trusted_user(&gh, &policy, "mallory", &repo()).await.unwrap();
        assert!(!decision.reason.not_secondary_member);
        assert_eq!(gh.org_member_checks(), 1);
    }

    #[tokio::test]
    async fn trusted_apps_skip_lookups() {
        let gh = FakeGitHub::new();
        let policy = TrustPolicy {
            trusted_apps: vec!["dependabot[bot]".to_string()],
            ..Default::default()
        };

        let decision = trusted_user(&gh, &policy, "dependabot[bot]", &repo())
            .await
            .unwrap();
        assert!(decision.trusted);
        assert_eq!(gh.collaborator_checks() + gh.org_member_checks(), 0);
    }

    #[tokio::test]
    async fn lookup_errors_propagate_with_context() {
        let gh = FakeGitHub::new();
        gh.fail_membership("API down");

        let err = trusted_user(&gh, &TrustPolicy::default(), "alice", &repo())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("error checking alice for trust"));
    }

    #[tokio::test]
    async fn ok_to_test_label_trusts_pr() {
        let gh = FakeGitHub::new();
        gh.set_labels(&repo(), PrNumber(7), &["ok-to-test"]);

        let (labels, trusted) = trusted_pull_request(
            &gh,
            &TrustPolicy::default(),
            "mallory",
            &repo(),
            PrNumber(7),
            None,
        )
        .await
        .unwrap();
        assert!(trusted);
        assert_eq!(labels, vec!["ok-to-test".to_string()]);
    }

    #[tokio::test]
    async fn trusted_author_skips_label_fetch() {
        let gh = FakeGitHub::new();
        gh.add_org_member("kubernetes", "bob");

        let (labels, trusted) = trusted_pull_request(
            &gh,
            &TrustPolicy::default(),
            "bob",
            &repo(),
            PrNumber(7),
            None,
        )
        .await
        .unwrap();
        assert!(trusted);
        assert!(labels.is_empty());
        assert_eq!(gh.label_reads(), 0);
    }

    #[tokio::test]
    async fn supplied_labels_are_not_refetched() {
        let gh = FakeGitHub::new();

        let (_, trusted) = trusted_pull_request(
            &gh,
            &TrustPolicy::default(),
            "mallory",
            &repo(),
            PrNumber(7),
            Some(vec!["needs-ok-to-test".to_string()]),
        )
        .await
        .unwrap();
        assert!(!trusted);
        assert_eq!(gh.label_reads(), 0);
    }
}
