//! Text of the comments the bot posts.

use crate::types::{OK_TO_TEST_LABEL, RepoId};

/// Reply to an untrusted user's trigger command. Also the marker used to find
/// earlier such replies once the PR becomes trusted.
pub const UNTRUSTED_RESPONSE: &str =
    "Cannot trigger testing until a trusted user reviews the PR and leaves an `/ok-to-test` message.";

pub const DRAFT_SKIPPED: &str = "Skipping CI for Draft Pull Request.\n\
    If you want CI signal for your change, please convert it to an actual PR.\n\
    You can still manually trigger a test run with `/test all`";

/// Opening of every welcome comment, used to recognise one already posted.
pub const WELCOME_MARKER: &str = "Thanks for your PR.";

/// Footer appended to every reply.
pub const DEFAULT_ABOUT: &str = "Instructions for interacting with me using PR comments are \
    available in the repository's contributor guide. If you have questions or suggestions \
    related to my behavior, please file an issue against this bot's repository.";

/// Addresses `login` with `message`, with `reason` folded away underneath.
pub fn format_response(login: &str, message: &str, reason: &str, about: &str) -> String {
    format!("@{login}: {message}\n\n<details>\n\n{reason}\n\n{about}\n</details>")
}

/// Addresses `login` with `message`, quoting the comment being answered.
///
/// # Examples
///
/// ```
/// use presubmit_trigger::respond::format_response_raw;
///
/// let reply = format_response_raw("/test\nplease", "https://x/1", "alice", "Hi", "About.");
/// assert!(reply.starts_with("@alice: Hi"));
/// assert!(reply.contains(">/test\n>please"));
/// ```
pub fn format_response_raw(
    body: &str,
    body_url: &str,
    login: &str,
    message: &str,
    about: &str,
) -> String {
    let quoted: Vec<String> = body.split('\n').map(|line| format!(">{line}")).collect();
    let reason = format!("In response to [this]({body_url}):\n\n{}\n", quoted.join("\n"));
    format_response(login, message, &reason, about)
}

/// Settings that shape the welcome comment on an untrusted PR.
#[derive(Debug, Clone, Copy, Default)]
pub struct WelcomeOptions<'a> {
    pub ignore_ok_to_test: bool,
    pub trusted_org: Option<&'a str>,
    pub join_org_url: Option<&'a str>,
    /// Where the bot's commands are documented. The repository is appended
    /// as a `repo` query parameter.
    pub commands_url: Option<&'a str>,
}

/// The comment greeting an untrusted author's new PR.
pub fn welcome_message(
    repo: &RepoId,
    author: &str,
    options: &WelcomeOptions<'_>,
    about: &str,
) -> String {
    let commands = options
        .commands_url
        .map(|url| {
            format!(
                "I understand the commands that are listed [here]({url}?repo={}).\n\n",
                urlencoding::encode(&repo.to_string())
            )
        })
        .unwrap_or_default();

    if options.ignore_ok_to_test {
        return format!(
            "Hi @{author}. {WELCOME_MARKER}\n\n\
             PRs from untrusted users cannot be marked as trusted with `/ok-to-test` in this \
             repo meaning untrusted PR authors can never trigger tests themselves. \
             Collaborators can still trigger tests on the PR using `/test all`.\n\n\
             {commands}<details>\n\n{about}\n</details>\n"
        );
    }

    let org = &repo.owner;
    let org_url = format!("https://github.com/orgs/{org}/people");
    let join_org_url = options.join_org_url.unwrap_or(&org_url);
    let more = match options.trusted_org {
        Some(trusted) if trusted != org => {
            format!("or [{trusted}](https://github.com/orgs/{trusted}/people) ")
        }
        _ => String::new(),
    };

    format!(
        "Hi @{author}. {WELCOME_MARKER}\n\n\
         I'm waiting for a [{org}]({org_url}) {more}member to verify that this patch is \
         reasonable to test. If it is, they should reply with `/ok-to-test` on its own line. \
         Until that is done, I will not automatically test new commits in this PR, but the \
         usual testing commands by org members will still work. Regular contributors should \
         [join the org]({join_org_url}) to skip this step.\n\n\
         Once the patch is verified, the new status will be reflected by the \
         `{OK_TO_TEST_LABEL}` label.\n\n\
         {commands}<details>\n\n{about}\n</details>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoId {
        RepoId::new("kubernetes", "test-infra")
    }

    #[test]
    fn raw_response_quotes_every_line() {
        let reply = format_response_raw(
            "/retest\nthanks",
            "https://github.com/kubernetes/test-infra/pull/1#issuecomment-2",
            "alice",
            UNTRUSTED_RESPONSE,
            "about",
        );
        assert_eq!(
            reply,
            "@alice: Cannot trigger testing until a trusted user reviews the PR and leaves an \
             `/ok-to-test` message.\n\n<details>\n\n\
             In response to [this](https://github.com/kubernetes/test-infra/pull/1#issuecomment-2):\
             \n\n>/retest\n>thanks\n\n\nabout\n</details>"
        );
    }

    #[test]
    fn welcome_mentions_join_url_and_label() {
        let message = welcome_message(
            &repo(),
            "newcomer",
            &WelcomeOptions {
                join_org_url: Some("https://example.com/join"),
                ..Default::default()
            },
            "about",
        );
        assert!(message.starts_with("Hi @newcomer. Thanks for your PR."));
        assert!(message.contains("[kubernetes](https://github.com/orgs/kubernetes/people) member"));
        assert!(message.contains("[join the org](https://example.com/join)"));
        assert!(message.contains("`ok-to-test` label"));
        assert!(!message.contains("I understand the commands"));
    }

    #[test]
    fn welcome_names_a_distinct_trusted_org() {
        let options = WelcomeOptions {
            trusted_org: Some("kubernetes-sigs"),
            ..Default::default()
        };
        let message = welcome_message(&repo(), "newcomer", &options, "about");
        assert!(message.contains(
            "or [kubernetes-sigs](https://github.com/orgs/kubernetes-sigs/people) member"
        ));

        let same = WelcomeOptions {
            trusted_org: Some("kubernetes"),
            ..Default::default()
        };
        assert!(!welcome_message(&repo(), "newcomer", &same, "about").contains(" or ["));
    }

    #[test]
    fn welcome_without_ok_to_test_explains_the_limit() {
        let options = WelcomeOptions {
            ignore_ok_to_test: true,
            commands_url: Some("https://example.com/commands"),
            ..Default::default()
        };
        let message = welcome_message(&repo(), "newcomer", &options, "about");
        assert!(message.contains("untrusted PR authors can never trigger tests themselves"));
        assert!(!message.contains("join the org"));
        assert!(message.contains("(https://example.com/commands?repo=kubernetes%2Ftest-infra)"));
    }
}
