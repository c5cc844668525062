//! Core domain types shared by the trigger's components.

pub mod ids;
pub mod pr;
pub mod status;

pub use ids::{CommentId, EventGuid, PrNumber, RepoId, Sha};
pub use pr::{
    LGTM_LABEL, NEEDS_OK_TO_TEST_LABEL, OK_TO_TEST_LABEL, PrState, PullRequest, has_label,
};
pub use status::{CombinedStatus, CommitStatus, StatusState};
