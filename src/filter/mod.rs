//! Choosing which presubmits an event runs and which it reports as skipped.
//!
//! A [`Filter`] decides whether a job is relevant to an event at all, and if
//! so whether the request was explicit (`forced`) and what to do when nothing
//! else decides (`default`). [`filter_presubmits`] combines that with each
//! job's branch and change matchers.

pub mod help;

use std::collections::BTreeSet;

use tracing::debug;

use crate::catalog::{ChangedFilesSource, DeferredChanges, Presubmit};
use crate::commands::ParsedCommands;
use crate::github::GitHubApiError;
use crate::types::CombinedStatus;

pub use help::{AvailablePresubmits, available_presubmits, help_message};

/// What one filter says about one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// The job is relevant to this event.
    pub matched: bool,
    /// The job was asked for by name and runs regardless of changed files.
    pub forced: bool,
    /// Whether to run when neither `always_run` nor a change matcher decides.
    pub default: bool,
}

impl FilterOutcome {
    const NO_MATCH: FilterOutcome = FilterOutcome {
        matched: false,
        forced: false,
        default: false,
    };
}

/// A rule selecting jobs for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Every job that runs without being asked for by name.
    TestAll,

    /// Jobs whose trigger matches the comment body.
    Command { body: String },

    /// Jobs whose context failed, plus `TestAll` jobs that never reported.
    Retest {
        failed: BTreeSet<String>,
        all: BTreeSet<String>,
    },

    /// As `Retest`, but only jobs that are not optional.
    RetestRequired {
        failed: BTreeSet<String>,
        all: BTreeSet<String>,
    },
}

impl Filter {
    /// A retest filter built from the head commit's combined status.
    pub fn retest(status: &CombinedStatus) -> Self {
        Filter::Retest {
            failed: status.failed_contexts(),
            all: status.all_contexts(),
        }
    }

    pub fn retest_required(status: &CombinedStatus) -> Self {
        Filter::RetestRequired {
            failed: status.failed_contexts(),
            all: status.all_contexts(),
        }
    }

    pub fn evaluate(&self, job: &Presubmit) -> FilterOutcome {
        match self {
            Filter::TestAll => FilterOutcome {
                matched: !job.needs_explicit_trigger(),
                forced: false,
                default: true,
            },
            Filter::Command { body } => {
                let matched = job.trigger_matches(body);
                FilterOutcome {
                    matched,
                    forced: matched,
                    default: true,
                }
            }
            Filter::Retest { failed, all } => FilterOutcome {
                matched: retest_matches(job, failed, all),
                forced: false,
                default: true,
            },
            Filter::RetestRequired { failed, all } => FilterOutcome {
                matched: !job.optional && retest_matches(job, failed, all),
                forced: false,
                default: true,
            },
        }
    }
}

fn retest_matches(job: &Presubmit, failed: &BTreeSet<String>, all: &BTreeSet<String>) -> bool {
    failed.contains(&job.context) || (!job.needs_explicit_trigger() && !all.contains(&job.context))
}

/// Filters combined by union. The first filter that matches a job decides its
/// outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn evaluate(&self, job: &Presubmit) -> FilterOutcome {
        self.filters
            .iter()
            .map(|filter| filter.evaluate(job))
            .find(|outcome| outcome.matched)
            .unwrap_or(FilterOutcome::NO_MATCH)
    }
}

impl From<Filter> for FilterSet {
    fn from(filter: Filter) -> Self {
        FilterSet::new(vec![filter])
    }
}

/// Builds the filters for a comment.
///
/// `status` is the head commit's combined status; it is only consulted when
/// the comment asks for a retest, and callers may pass `None` otherwise.
pub fn presubmit_filter(
    honor_ok_to_test: bool,
    parsed: &ParsedCommands,
    body: &str,
    status: Option<&CombinedStatus>,
) -> FilterSet {
    let mut filters = Vec::new();
    if parsed.test_all || (honor_ok_to_test && parsed.ok_to_test) {
        filters.push(Filter::TestAll);
    }
    filters.push(Filter::Command {
        body: body.to_string(),
    });
    if let Some(status) = status {
        if parsed.retest {
            filters.push(Filter::retest(status));
        }
        if parsed.retest_required {
            filters.push(Filter::retest_required(status));
        }
    }
    FilterSet::new(filters)
}

/// The jobs an event starts and the jobs it reports as skipped.
///
/// No context appears in both lists.
#[derive(Debug, Clone, Default)]
pub struct FilteredJobs {
    pub to_run: Vec<Presubmit>,
    pub to_skip: Vec<Presubmit>,
}

impl FilteredJobs {
    pub fn run_names(&self) -> Vec<&str> {
        self.to_run.iter().map(|job| job.name.as_str()).collect()
    }

    pub fn skip_names(&self) -> Vec<&str> {
        self.to_skip.iter().map(|job| job.name.as_str()).collect()
    }
}

/// Splits `presubmits` into jobs to run and jobs to report as skipped.
///
/// Jobs that cannot run on `branch` and jobs no filter matches are left out
/// of both lists. Changed files are fetched at most once, and only if a
/// matched job's change matcher needs them; a fetch failure aborts the whole
/// computation.
pub async fn filter_presubmits<S: ChangedFilesSource>(
    filters: &FilterSet,
    changes: &DeferredChanges<S>,
    branch: &str,
    presubmits: &[Presubmit],
) -> Result<FilteredJobs, GitHubApiError> {
    let mut to_run = Vec::new();
    let mut candidates = Vec::new();

    for job in presubmits {
        if !job.could_run(branch) {
            continue;
        }
        let outcome = filters.evaluate(job);
        if !outcome.matched {
            continue;
        }
        if job
            .should_run(branch, changes, outcome.forced, outcome.default)
            .await?
        {
            to_run.push(job.clone());
        } else {
            candidates.push(job.clone());
        }
    }

    let running: BTreeSet<&str> = to_run.iter().map(|job| job.context.as_str()).collect();
    let to_skip: Vec<Presubmit> = candidates
        .into_iter()
        .filter(|job| !running.contains(job.context.as_str()))
        .collect();

    debug!(
        branch,
        to_run = to_run.len(),
        to_skip = to_skip.len(),
        "Filtered presubmits"
    );

    Ok(FilteredJobs { to_run, to_skip })
}

// ─── Unit Tests ───

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PresubmitConfig;
    use crate::types::{CommitStatus, Sha, StatusState};
    use proptest::prelude::*;

    fn job(config: PresubmitConfig) -> Presubmit {
        Presubmit::compile(config).unwrap()
    }

    fn named(name: &str) -> PresubmitConfig {
        PresubmitConfig {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn always(name: &str) -> Presubmit {
        job(PresubmitConfig {
            always_run: true,
            ..named(name)
        })
    }

    fn status(entries: &[(&str, StatusState)]) -> CombinedStatus {
        CombinedStatus {
            sha: Sha::new("abc"),
            statuses: entries
                .iter()
                .map(|(context, state)| CommitStatus {
                    state: *state,
                    context: context.to_string(),
                    description: String::new(),
                    target_url: None,
                })
                .collect(),
        }
    }

    fn no_changes() -> DeferredChanges<crate::catalog::KnownChanges> {
        DeferredChanges::known(vec![])
    }

    #[test]
    fn test_all_selects_jobs_that_run_unasked() {
        let path_gated = job(PresubmitConfig {
            run_if_changed: Some("^src/".to_string()),
            ..named("src")
        });
        assert!(Filter::TestAll.evaluate(&always("unit")).matched);
        assert!(Filter::TestAll.evaluate(&path_gated).matched);
        assert!(!Filter::TestAll.evaluate(&job(named("e2e"))).matched);
        assert!(!Filter::TestAll.evaluate(&always("unit")).forced);
    }

    #[test]
    fn command_forces_matched_jobs() {
        let filter = Filter::Command {
            body: "/test e2e".to_string(),
        };
        let outcome = filter.evaluate(&job(named("e2e")));
        assert!(outcome.matched && outcome.forced);
        assert!(!filter.evaluate(&always("unit")).matched);
    }

    #[test]
    fn retest_selects_failed_and_missing_contexts() {
        let filter = Filter::retest(&status(&[
            ("unit", StatusState::Failure),
            ("lint", StatusState::Success),
        ]));
        assert!(filter.evaluate(&always("unit")).matched);
        assert!(!filter.evaluate(&always("lint")).matched);
        // Never reported, runs without being asked.
        assert!(filter.evaluate(&always("vet")).matched);
        // Never reported, but needs an explicit request.
        assert!(!filter.evaluate(&job(named("e2e"))).matched);
    }

    #[test]
    fn retest_counts_errors_as_failures() {
        let filter = Filter::retest(&status(&[("e2e", StatusState::Error)]));
        assert!(filter.evaluate(&job(named("e2e"))).matched);
    }

    #[test]
    fn retest_required_ignores_optional_jobs() {
        let combined = status(&[("unit", StatusState::Failure), ("docs", StatusState::Failure)]);
        let filter = Filter::retest_required(&combined);
        let docs = job(PresubmitConfig {
            optional: true,
            always_run: true,
            ..named("docs")
        });
        assert!(filter.evaluate(&always("unit")).matched);
        assert!(!filter.evaluate(&docs).matched);
        assert!(Filter::retest(&combined).evaluate(&docs).matched);
    }

    #[test]
    fn first_matching_filter_wins() {
        let set = FilterSet::new(vec![
            Filter::TestAll,
            Filter::Command {
                body: "/test unit".to_string(),
            },
        ]);
        let outcome = set.evaluate(&always("unit"));
        assert!(outcome.matched);
        assert!(!outcome.forced);
        assert_eq!(set.evaluate(&job(named("e2e"))), FilterOutcome::default());
    }

    #[test]
    fn presubmit_filter_builds_from_commands() {
        let parsed = ParsedCommands {
            ok_to_test: true,
            ..Default::default()
        };
        let honoured = presubmit_filter(true, &parsed, "/ok-to-test", None);
        assert_eq!(honoured.filters()[0], Filter::TestAll);
        assert_eq!(honoured.filters().len(), 2);

        let ignored = presubmit_filter(false, &parsed, "/ok-to-test", None);
        assert_eq!(ignored.filters().len(), 1);
        assert!(matches!(ignored.filters()[0], Filter::Command { .. }));
    }

    #[test]
    fn presubmit_filter_adds_retest_only_with_status() {
        let parsed = ParsedCommands {
            retest: true,
            retest_required: true,
            ..Default::default()
        };
        let combined = status(&[]);
        assert_eq!(
            presubmit_filter(true, &parsed, "/retest", Some(&combined))
                .filters()
                .len(),
            3
        );
        assert_eq!(presubmit_filter(true, &parsed, "/retest", None).filters().len(), 1);
    }

    #[tokio::test]
    async fn unmatched_and_off_branch_jobs_are_absent() {
        let jobs = vec![
            always("unit"),
            job(named("e2e")),
            job(PresubmitConfig {
                always_run: true,
                branches: vec!["release".to_string()],
                ..named("release-only")
            }),
        ];
        let result = filter_presubmits(&Filter::TestAll.into(), &no_changes(), "main", &jobs)
            .await
            .unwrap();
        assert_eq!(result.run_names(), vec!["unit"]);
        assert!(result.to_skip.is_empty());
    }

    #[tokio::test]
    async fn path_gated_jobs_are_skipped_when_unchanged() {
        let jobs = vec![job(PresubmitConfig {
            run_if_changed: Some("^src/".to_string()),
            ..named("src")
        })];
        let changes = DeferredChanges::known(vec!["README.md".to_string()]);
        let result = filter_presubmits(&Filter::TestAll.into(), &changes, "main", &jobs)
            .await
            .unwrap();
        assert!(result.to_run.is_empty());
        assert_eq!(result.skip_names(), vec!["src"]);
    }

    #[tokio::test]
    async fn skip_is_dropped_when_a_shard_runs_the_same_context() {
        let jobs = vec![
            job(PresubmitConfig {
                context: Some("unit".to_string()),
                run_if_changed: Some("^never/".to_string()),
                ..named("unit-docs")
            }),
            job(PresubmitConfig {
                context: Some("unit".to_string()),
                always_run: true,
                ..named("unit-main")
            }),
        ];
        let changes = DeferredChanges::known(vec!["src/lib.rs".to_string()]);
        let result = filter_presubmits(&Filter::TestAll.into(), &changes, "main", &jobs)
            .await
            .unwrap();
        assert_eq!(result.run_names(), vec!["unit-main"]);
        assert!(result.to_skip.is_empty());
    }

    #[tokio::test]
    async fn explicit_request_overrides_change_matcher() {
        let jobs = vec![job(PresubmitConfig {
            run_if_changed: Some("^src/".to_string()),
            ..named("src")
        })];
        let filters: FilterSet = Filter::Command {
            body: "/test src".to_string(),
        }
        .into();
        let result = filter_presubmits(&filters, &no_changes(), "main", &jobs)
            .await
            .unwrap();
        assert_eq!(result.run_names(), vec!["src"]);
    }

    proptest! {
        #[test]
        fn run_and_skip_never_share_a_context(
            specs in prop::collection::vec((0usize..3, any::<bool>(), any::<bool>()), 0..8),
            touched_src in any::<bool>(),
        ) {
            let contexts = ["a", "b", "c"];
            let jobs: Vec<Presubmit> = specs
                .iter()
                .enumerate()
                .map(|(i, (ctx, always_run, gated))| {
                    job(PresubmitConfig {
                        context: Some(contexts[*ctx].to_string()),
                        always_run: *always_run && !*gated,
                        run_if_changed: gated.then(|| "^src/".to_string()),
                        ..named(&format!("job-{i}"))
                    })
                })
                .collect();
            let changes = DeferredChanges::known(if touched_src {
                vec!["src/lib.rs".to_string()]
            } else {
                vec!["README.md".to_string()]
            });

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let result = runtime
                .block_on(filter_presubmits(&Filter::TestAll.into(), &changes, "main", &jobs))
                .unwrap();

            let run: BTreeSet<&str> = result.to_run.iter().map(|j| j.context.as_str()).collect();
            for skipped in &result.to_skip {
                prop_assert!(!run.contains(skipped.context.as_str()));
            }
        }
    }
}
