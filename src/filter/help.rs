//! The job list sent in reply to `/test`, `/test ?` and malformed commands.

use std::collections::BTreeSet;

use crate::catalog::Presubmit;
use crate::types::RepoId;

/// Presubmits that can run on one branch, grouped for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailablePresubmits {
    /// Names of jobs `/test all` would start.
    pub test_all_names: BTreeSet<String>,
    /// Rerun commands of non-optional jobs.
    pub required_commands: BTreeSet<String>,
    /// Rerun commands of optional jobs.
    pub optional_commands: BTreeSet<String>,
}

impl AvailablePresubmits {
    pub fn is_empty(&self) -> bool {
        self.test_all_names.is_empty()
            && self.required_commands.is_empty()
            && self.optional_commands.is_empty()
    }
}

pub fn available_presubmits(branch: &str, presubmits: &[Presubmit]) -> AvailablePresubmits {
    let mut available = AvailablePresubmits::default();
    for job in presubmits.iter().filter(|job| job.could_run(branch)) {
        if !job.needs_explicit_trigger() {
            available.test_all_names.insert(job.name.clone());
        }
        if job.optional {
            available.optional_commands.insert(job.rerun_command.clone());
        } else {
            available.required_commands.insert(job.rerun_command.clone());
        }
    }
    available
}

fn bullet_list(items: &BTreeSet<String>) -> String {
    items.iter().map(|item| format!("\n* `{}`", item)).collect()
}

/// Renders the help reply. `note` is prepended when present.
pub fn help_message(
    repo: &RepoId,
    branch: &str,
    note: Option<&str>,
    available: &AvailablePresubmits,
) -> String {
    if available.is_empty() {
        return format!("No presubmit jobs available for {}@{}", repo, branch);
    }

    let mut message = String::from(note.unwrap_or_default());
    message.push_str(&format!(
        "The following commands are available to trigger required jobs:{}\n\n",
        bullet_list(&available.required_commands)
    ));
    if !available.optional_commands.is_empty() {
        message.push_str(&format!(
            "The following commands are available to trigger optional jobs:{}\n\n",
            bullet_list(&available.optional_commands)
        ));
    }

    let listed = available.required_commands.len() + available.optional_commands.len();
    if available.test_all_names.len() == listed {
        message.push_str("Use `/test all` to run all jobs.\n");
    } else if !available.test_all_names.is_empty() {
        message.push_str(&format!(
            "Use `/test all` to run the following jobs that were automatically triggered:{}\n\n",
            bullet_list(&available.test_all_names)
        ));
    }
    message
}
