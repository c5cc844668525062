//! Branch restrictions on jobs.
//!
//! A job may list `branches` it runs against and `skip_branches` it never runs
//! against. Entries are regular expressions matched against the whole branch
//! name, so `release-.*` matches `release-1.0` but `main` does not match
//! `main-old`. Skip entries take precedence.

use regex::Regex;

/// Compiled branch restrictions for one job.
#[derive(Debug, Clone, Default)]
pub struct Brancher {
    branches: Vec<String>,
    skip_branches: Vec<String>,
    re: Option<Regex>,
    skip_re: Option<Regex>,
}

impl Brancher {
    pub fn new(branches: Vec<String>, skip_branches: Vec<String>) -> Result<Self, regex::Error> {
        let re = anchored_alternation(&branches)?;
        let skip_re = anchored_alternation(&skip_branches)?;
        Ok(Brancher {
            branches,
            skip_branches,
            re,
            skip_re,
        })
    }

    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    pub fn skip_branches(&self) -> &[String] {
        &self.skip_branches
    }

    /// True when the job has no branch restrictions at all.
    pub fn runs_against_all_branches(&self) -> bool {
        self.branches.is_empty() && self.skip_branches.is_empty()
    }

    /// Whether a job with these restrictions may run against `branch`.
    pub fn should_run(&self, branch: &str) -> bool {
        if let Some(skip) = &self.skip_re
            && skip.is_match(branch)
        {
            return false;
        }
        match &self.re {
            Some(re) => re.is_match(branch),
            None => true,
        }
    }

    /// Conservatively decides whether two branchers could both accept some
    /// branch.
    ///
    /// Literal `branches` lists are compared by name; when one side lists
    /// branches and the other only skips, each listed branch is probed against
    /// the other side. Two skip-only branchers are assumed to intersect.
    pub fn intersects(&self, other: &Brancher) -> bool {
        if self.runs_against_all_branches() || other.runs_against_all_branches() {
            return true;
        }
        if !self.branches.is_empty() {
            if !other.branches.is_empty() {
                return self.branches.iter().any(|b| other.branches.contains(b));
            }
            return self.branches.iter().any(|b| other.should_run(b));
        }
        if other.branches.is_empty() {
            return true;
        }
        other.intersects(self)
    }
}

fn anchored_alternation(patterns: &[String]) -> Result<Option<Regex>, regex::Error> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let alternation = patterns
        .iter()
        .map(|p| format!("^(?:{})$", p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).map(Some)
}
