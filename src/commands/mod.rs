//! Trigger commands in PR comments.
//!
//! # Supported Commands
//!
//! - `/test all` - run every job that does not need an explicit trigger
//! - `/test <job>` - run the named jobs (matched by each job's trigger regex)
//! - `/retest` - re-run failed jobs and jobs that never reported
//! - `/retest-required` - as `/retest`, but only non-optional jobs
//! - `/ok-to-test` - vouch for an untrusted PR
//! - `/test` or `/test ?` - list the available jobs
//!
//! # Example
//!
//! ```
//! use presubmit_trigger::commands::CommandPatterns;
//!
//! let patterns = CommandPatterns::new().unwrap();
//! let parsed = patterns.parse("/ok-to-test\n/test all");
//! assert!(parsed.ok_to_test && parsed.test_all);
//! ```

mod parser;
mod types;

pub use parser::CommandPatterns;
pub use types::{
    HelpRequest, NO_TEST_ALL_JOBS_NOTE, ParsedCommands, RETEST_WITH_TARGET_NOTE,
    TARGET_NOT_FOUND_NOTE,
};
