//! Recognition of trigger commands in comment text.
//!
//! Commands are matched per line: a command must start its line, and one
//! comment may contain several. Windows line endings are tolerated because
//! `\s` absorbs the trailing `\r`.

use regex::Regex;

use super::types::ParsedCommands;

const TEST_ALL: &str = r"(?m)^/test all,?($|\s.*)";
const RETEST: &str = r"(?m)^/retest\s*$";
const RETEST_REQUIRED: &str = r"(?m)^/retest-required\s*$";
const OK_TO_TEST: &str = r"(?m)^/ok-to-test\s*$";
const TEST_WITHOUT_TARGET: &str = r"(?m)^/test\s*$";
const TEST_HELP: &str = r"(?m)^/test\s+\?\s*$";
const TEST_WITH_ANY_TARGET: &str = r"(?m)^/test[ \t]+\S+";
const RETEST_WITH_TARGET: &str = r"(?m)^/retest[ \t]+\S+";

/// The compiled command regexes.
///
/// Built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct CommandPatterns {
    test_all: Regex,
    retest: Regex,
    retest_required: Regex,
    ok_to_test: Regex,
    test_without_target: Regex,
    test_help: Regex,
    test_with_any_target: Regex,
    retest_with_target: Regex,
}

impl CommandPatterns {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            test_all: Regex::new(TEST_ALL)?,
            retest: Regex::new(RETEST)?,
            retest_required: Regex::new(RETEST_REQUIRED)?,
            ok_to_test: Regex::new(OK_TO_TEST)?,
            test_without_target: Regex::new(TEST_WITHOUT_TARGET)?,
            test_help: Regex::new(TEST_HELP)?,
            test_with_any_target: Regex::new(TEST_WITH_ANY_TARGET)?,
            retest_with_target: Regex::new(RETEST_WITH_TARGET)?,
        })
    }

    /// Finds every trigger command in `body`.
    ///
    /// # Examples
    ///
    /// ```
    /// use presubmit_trigger::commands::CommandPatterns;
    ///
    /// let patterns = CommandPatterns::new().unwrap();
    /// let parsed = patterns.parse("/test all\r\n/retest");
    /// assert!(parsed.test_all);
    /// assert!(parsed.retest);
    /// assert!(!parsed.ok_to_test);
    /// ```
    pub fn parse(&self, body: &str) -> ParsedCommands {
        ParsedCommands {
            test_all: self.test_all.is_match(body),
            retest: self.retest.is_match(body),
            retest_required: self.retest_required.is_match(body),
            ok_to_test: self.ok_to_test.is_match(body),
            test_without_target: self.test_without_target.is_match(body),
            test_help: self.test_help.is_match(body),
            test_with_target: self.test_with_any_target.is_match(body),
            retest_with_target: self.retest_with_target.is_match(body),
        }
    }
}
