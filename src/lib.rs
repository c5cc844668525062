//! Presubmit Trigger - decides which CI jobs a GitHub event should start.
//!
//! Webhook events for pull requests, comments and pushes are checked against
//! the trust policy and the job catalog. Jobs that should run are created in
//! the job store; jobs that cannot run are reported as skipped statuses.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod errors;
pub mod filter;
pub mod github;
pub mod jobs;
pub mod respond;
pub mod retry;
pub mod server;
pub mod trigger;
pub mod trust;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
