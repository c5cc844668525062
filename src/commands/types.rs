//! What a comment asked for.

use serde::{Deserialize, Serialize};

/// Reply note when `/retest` was given a target.
pub const RETEST_WITH_TARGET_NOTE: &str = "The `/retest` command does not accept any targets.\n";

/// Reply note when no job matched `/test <target>`.
pub const TARGET_NOT_FOUND_NOTE: &str = "The specified target(s) for `/test` were not found.\n";

/// Reply note when `/test all` selected nothing.
pub const NO_TEST_ALL_JOBS_NOTE: &str = "No jobs can be run with `/test all`.\n";

/// The trigger commands present in one comment body.
///
/// A body may carry several commands on separate lines; each flag is set
/// independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommands {
    /// `/test all`
    pub test_all: bool,
    /// `/retest`
    pub retest: bool,
    /// `/retest-required`
    pub retest_required: bool,
    /// `/ok-to-test`
    pub ok_to_test: bool,
    /// `/test` with nothing after it.
    pub test_without_target: bool,
    /// `/test ?`
    pub test_help: bool,
    /// `/test` followed by anything, including `all` and `?`.
    pub test_with_target: bool,
    /// `/retest` followed by a target, which it does not take.
    pub retest_with_target: bool,
}

/// A decision to answer a comment with the list of available jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelpRequest {
    /// Explanation prepended to the job list, if the command was malformed
    /// or selected nothing.
    pub note: Option<&'static str>,
}

impl ParsedCommands {
    /// True if any trigger command was recognised.
    pub fn any(&self) -> bool {
        self.test_all
            || self.retest
            || self.retest_required
            || self.ok_to_test
            || self.test_without_target
            || self.test_help
            || self.test_with_target
            || self.retest_with_target
    }

    /// True for `/retest` and `/retest-required`, which need the current
    /// commit statuses.
    pub fn requests_retest(&self) -> bool {
        self.retest || self.retest_required
    }

    /// Decides whether to answer with help, given how many jobs the comment
    /// would start.
    pub fn help_response(&self, to_run: usize) -> Option<HelpRequest> {
        if self.test_without_target || self.test_help {
            return Some(HelpRequest { note: None });
        }
        if self.retest_with_target {
            return Some(HelpRequest {
                note: Some(RETEST_WITH_TARGET_NOTE),
            });
        }
        if to_run == 0 && self.test_all {
            return Some(HelpRequest {
                note: Some(NO_TEST_ALL_JOBS_NOTE),
            });
        }
        if to_run == 0 && self.test_with_target {
            return Some(HelpRequest {
                note: Some(TARGET_NOT_FOUND_NOTE),
            });
        }
        None
    }
}
