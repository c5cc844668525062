//! GitHub access for the trigger.
//!
//! The trigger talks to GitHub only through the narrow capability traits in
//! [`capabilities`]. [`OctocrabClient`] implements them against the real API
//! with retry for transient failures.

pub mod capabilities;
mod client;
mod error;

pub use capabilities::{
    BotIdentity, CommentClient, GitHubClient, IssueComment, LabelClient, MembershipClient,
    PullRequestClient, StatusClient, WorkflowClient,
};
pub use client::OctocrabClient;
pub use error::{GitHubApiError, GitHubErrorKind};
