//! Approver accumulation.
//!
//! The approver set is derived fresh from the full ordered comment stream on
//! every evaluation; nothing here survives past a single evaluation. The
//! only cross-invocation signal is the human-override flag, and that is
//! re-derived from the label-change history each time, never stored.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use tracing::warn;

use crate::command::{
    parse_commands, APPROVE_COMMAND, CANCEL_ARGUMENT, LGTM_COMMAND, NO_ISSUE_ARGUMENT,
};
use crate::comment::{Comment, ReviewState};
use crate::is_deprecated_bot;
use crate::owners::Coverage;
use crate::policy::RepoPolicy;
use crate::APPROVED_LABEL;

/// How an approval entered the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// An explicit `/approve` (or a counted `/lgtm`).
    Command,
    /// The PR author's own approval, explicit or implicit.
    AuthorSelf,
    /// An approved review submission.
    Review,
}

/// One recorded approval.
#[derive(Debug, Clone)]
pub struct Approval {
    /// Login with its original casing, for display.
    pub login: String,
    /// URL of the granting comment, or of the PR itself for an implicit
    /// self-approval.
    pub reference: String,
    /// Whether this approval waives the associated-issue requirement.
    pub no_issue: bool,
    pub how: Provenance,
}

/// Mutable accumulator for one evaluation.
#[derive(Debug, Default)]
pub struct Approvers {
    /// Keyed by lowercased login.
    approvers: BTreeMap<String, Approval>,
    /// `/lgtm` grants, tracked separately and folded into the effective
    /// approver set. Only populated when policy counts lgtm as approval.
    lgtmers: BTreeMap<String, Approval>,
    /// Suggested approvers (assignee hints), never approvers themselves.
    assignees: BTreeSet<String>,
    /// Issue referenced by the PR body, if any.
    pub associated_issue: Option<u64>,
    /// Whether policy demands an associated issue.
    pub require_issue: bool,
    /// Sticky human override: the approval label was applied by a real
    /// person, so the verdict is approved regardless of coverage.
    pub manually_approved: bool,
}

impl Approvers {
    pub fn new(require_issue: bool) -> Self {
        Self {
            require_issue,
            ..Self::default()
        }
    }

    pub fn add_approver(&mut self, login: &str, reference: &str, no_issue: bool) {
        self.insert(login, reference, no_issue, Provenance::Command);
    }

    /// Record the PR author approving their own PR. Implicit self-approval
    /// passes the PR's own URL as the reference.
    pub fn add_author_self_approver(&mut self, login: &str, reference: &str, no_issue: bool) {
        self.insert(login, reference, no_issue, Provenance::AuthorSelf);
    }

    pub fn add_review_approver(&mut self, login: &str, reference: &str) {
        self.insert(login, reference, false, Provenance::Review);
    }

    pub fn add_lgtmer(&mut self, login: &str, reference: &str, no_issue: bool) {
        self.lgtmers.insert(
            login.to_lowercase(),
            Approval {
                login: login.to_string(),
                reference: reference.to_string(),
                no_issue,
                how: Provenance::Command,
            },
        );
    }

    /// Retract `login` from the approver set, whichever command added them.
    pub fn remove_approver(&mut self, login: &str) {
        let key = login.to_lowercase();
        self.approvers.remove(&key);
        self.lgtmers.remove(&key);
    }

    pub fn add_assignee(&mut self, login: &str) {
        self.assignees.insert(login.to_lowercase());
    }

    fn insert(&mut self, login: &str, reference: &str, no_issue: bool, how: Provenance) {
        self.approvers.insert(
            login.to_lowercase(),
            Approval {
                login: login.to_string(),
                reference: reference.to_string(),
                no_issue,
                how,
            },
        );
    }

    /// Lowercased logins currently counting toward coverage.
    pub fn current_approver_set(&self) -> BTreeSet<String> {
        self.approvers
            .keys()
            .chain(self.lgtmers.keys())
            .cloned()
            .collect()
    }

    /// All current approvals sorted by login, for rendering.
    pub fn approvals(&self) -> Vec<&Approval> {
        let mut approvals: Vec<&Approval> = self
            .approvers
            .values()
            .chain(
                self.lgtmers
                    .iter()
                    .filter(|(key, _)| !self.approvers.contains_key(*key))
                    .map(|(_, a)| a),
            )
            .collect();
        approvals.sort_by(|a, b| a.login.to_lowercase().cmp(&b.login.to_lowercase()));
        approvals
    }

    /// Assignee hints that have not yet approved, for suggestions.
    pub fn suggested_assignees(&self) -> BTreeSet<String> {
        self.assignees
            .iter()
            .filter(|a| !self.approvers.contains_key(*a) && !self.lgtmers.contains_key(*a))
            .cloned()
            .collect()
    }

    /// Approvers that waived the issue requirement with `no-issue`.
    pub fn no_issue_approvers(&self) -> BTreeSet<String> {
        self.approvers
            .values()
            .chain(self.lgtmers.values())
            .filter(|a| a.no_issue)
            .map(|a| a.login.to_lowercase())
            .collect()
    }

    /// The issue condition: no issue required, or one was found, or an
    /// approver explicitly waived the requirement.
    pub fn issue_requirement_met(&self) -> bool {
        !self.require_issue
            || self.associated_issue.is_some()
            || !self.no_issue_approvers().is_empty()
    }

    /// The verdict for this evaluation. A manually applied approval label
    /// short-circuits coverage entirely.
    pub fn is_approved(&self, coverage: &Coverage) -> bool {
        if self.manually_approved {
            return true;
        }
        coverage.is_fully_covered() && self.issue_requirement_met()
    }
}

/// Whether a comment can change the approver set at all: it must not come
/// from the bot or a retired predecessor, and it must carry an approval
/// command or (when review state is considered) an approval-relevant review
/// state.
pub fn is_approval_relevant(comment: &Comment, bot_name: &str, policy: &RepoPolicy) -> bool {
    if comment.author.eq_ignore_ascii_case(bot_name) || is_deprecated_bot(&comment.author) {
        return false;
    }
    if policy.consider_review_state() && comment.review_state.is_some() {
        return true;
    }
    parse_commands(&comment.body).iter().any(|command| {
        command.name == APPROVE_COMMAND
            || (policy.lgtm_acts_as_approve && command.name == LGTM_COMMAND)
    })
}

/// Fold the chronologically ordered comment stream into the approver state.
///
/// Processing is strictly in stream order, so the last relevant action per
/// author wins: an `/approve` followed by `/approve cancel` leaves the
/// author out of the set, and a later `/approve` re-adds them.
pub fn collect_approvers(
    approvers: &mut Approvers,
    comments: &[Comment],
    pr_author: &str,
    bot_name: &str,
    policy: &RepoPolicy,
) {
    for comment in comments {
        if comment.author.is_empty() {
            continue;
        }
        if !is_approval_relevant(comment, bot_name, policy) {
            continue;
        }

        if policy.consider_review_state() {
            match comment.review_state {
                Some(ReviewState::Approved) => {
                    approvers.add_review_approver(&comment.author, &comment.html_url);
                }
                // A dismissed review retracts whatever it previously said,
                // symmetric with an explicit cancel.
                Some(ReviewState::ChangesRequested) | Some(ReviewState::Dismissed) => {
                    approvers.remove_approver(&comment.author);
                }
                None => {}
            }
        }

        for command in parse_commands(&comment.body) {
            let counts_as_lgtm =
                command.name == LGTM_COMMAND && policy.lgtm_acts_as_approve;
            if command.name != APPROVE_COMMAND && !counts_as_lgtm {
                continue;
            }
            if command.has_argument(CANCEL_ARGUMENT) {
                approvers.remove_approver(&comment.author);
                continue;
            }

            let no_issue = command.has_argument(NO_ISSUE_ARGUMENT);
            if comment.author.eq_ignore_ascii_case(pr_author) {
                // Distinct bookkeeping for the author: the self-approval
                // provenance must survive, not be overwritten by the
                // generic command path below.
                approvers.add_author_self_approver(&comment.author, &comment.html_url, no_issue);
            } else if command.name == APPROVE_COMMAND {
                approvers.add_approver(&comment.author, &comment.html_url, no_issue);
            } else {
                approvers.add_lgtmer(&comment.author, &comment.html_url, no_issue);
            }
        }
    }
}

/// Extract the associated issue from a PR body.
///
/// Recognizes a bare `#123` or an issue URL within the same organization
/// (`<org>/<repo>/issues/123`). The first occurrence anywhere in the body
/// wins; multiple references never trigger a "most relevant" heuristic.
/// Absence or a malformed number is not an error.
pub fn find_associated_issue(body: &str, org: &str) -> Option<u64> {
    let pattern = format!(r"(?:{}/[^/\s]+/issues/|#)(\d+)", regex::escape(org));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!("Failed to build associated-issue pattern for org {org}: {e}");
            return None;
        }
    };
    let capture = re.captures(body)?.get(1)?;
    match capture.as_str().parse() {
        Ok(number) => Some(number),
        Err(e) => {
            warn!("Malformed associated-issue reference {:?}: {e}", capture.as_str());
            None
        }
    }
}

/// One entry from the label-change history of a pull request.
#[derive(Debug, Clone)]
pub struct LabelEvent {
    pub action: LabelEventAction,
    pub label: String,
    /// Login of whoever performed the change; may be empty if the hosting
    /// API omits it.
    pub actor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelEventAction {
    Labeled,
    Unlabeled,
    Other,
}

/// Whether the approval label currently on the PR was applied by a human.
///
/// Looks at the most recent "labeled" event for the approval label; the
/// override holds iff that event's actor is a real user, not this bot and
/// not a retired predecessor. Callers invoke this at most once per
/// evaluation, only when the label is present.
pub fn human_added_approval(events: &[LabelEvent], bot_name: &str) -> bool {
    let last_added = events
        .iter()
        .filter(|e| e.action == LabelEventAction::Labeled && e.label == APPROVED_LABEL)
        .next_back();
    match last_added {
        Some(event) => {
            !event.actor.is_empty()
                && !event.actor.eq_ignore_ascii_case(bot_name)
                && !is_deprecated_bot(&event.actor)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owners::OwnersTree;
    use chrono::{DateTime, TimeZone, Utc};

    const BOT: &str = "mergegate[bot]";

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn comment(author: &str, body: &str, secs: i64) -> Comment {
        Comment {
            id: secs as u64,
            body: body.to_string(),
            author: author.to_string(),
            created_at: at(secs),
            html_url: format!("https://example.invalid/c/{secs}"),
            review_state: None,
        }
    }

    fn review_event(author: &str, state: ReviewState, secs: i64) -> Comment {
        Comment {
            review_state: Some(state),
            ..comment(author, "", secs)
        }
    }

    fn collect(comments: &[Comment], policy: &RepoPolicy) -> Approvers {
        let mut approvers = Approvers::new(false);
        collect_approvers(&mut approvers, comments, "alice", BOT, policy);
        approvers
    }

    fn set(logins: &[&str]) -> BTreeSet<String> {
        logins.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_approve_adds_to_set() {
        let approvers = collect(
            &[comment("bob", "/approve", 1)],
            &RepoPolicy::default(),
        );
        assert_eq!(approvers.current_approver_set(), set(&["bob"]));
    }

    #[test]
    fn test_last_action_per_author_wins() {
        let policy = RepoPolicy::default();
        let approvers = collect(
            &[
                comment("bob", "/approve", 1),
                comment("bob", "/approve cancel", 2),
            ],
            &policy,
        );
        assert!(approvers.current_approver_set().is_empty());

        let approvers = collect(
            &[
                comment("bob", "/approve", 1),
                comment("bob", "/approve cancel", 2),
                comment("bob", "/approve", 3),
            ],
            &policy,
        );
        assert_eq!(approvers.current_approver_set(), set(&["bob"]));
    }

    #[test]
    fn test_cancel_retracts_lgtm_too() {
        let policy = RepoPolicy {
            lgtm_acts_as_approve: true,
            ..RepoPolicy::default()
        };
        let approvers = collect(
            &[
                comment("bob", "/lgtm", 1),
                comment("bob", "/approve cancel", 2),
            ],
            &policy,
        );
        assert!(approvers.current_approver_set().is_empty());
    }

    #[test]
    fn test_lgtm_ignored_unless_enabled() {
        let approvers = collect(&[comment("bob", "/lgtm", 1)], &RepoPolicy::default());
        assert!(approvers.current_approver_set().is_empty());

        let policy = RepoPolicy {
            lgtm_acts_as_approve: true,
            ..RepoPolicy::default()
        };
        let approvers = collect(&[comment("bob", "/lgtm", 1)], &policy);
        assert_eq!(approvers.current_approver_set(), set(&["bob"]));
    }

    #[test]
    fn test_bot_and_deprecated_bots_are_ignored() {
        let approvers = collect(
            &[
                comment(BOT, "/approve", 1),
                comment("mergegate-classic", "/approve", 2),
                comment("merge-robot", "/approve", 3),
            ],
            &RepoPolicy::default(),
        );
        assert!(approvers.current_approver_set().is_empty());
    }

    #[test]
    fn test_review_states_feed_the_set() {
        let policy = RepoPolicy::default();
        let approvers = collect(
            &[review_event("bob", ReviewState::Approved, 1)],
            &policy,
        );
        assert_eq!(approvers.current_approver_set(), set(&["bob"]));

        let approvers = collect(
            &[
                review_event("bob", ReviewState::Approved, 1),
                review_event("bob", ReviewState::ChangesRequested, 2),
            ],
            &policy,
        );
        assert!(approvers.current_approver_set().is_empty());

        // A dismissed review retracts a previous approval.
        let approvers = collect(
            &[
                review_event("bob", ReviewState::Approved, 1),
                review_event("bob", ReviewState::Dismissed, 2),
            ],
            &policy,
        );
        assert!(approvers.current_approver_set().is_empty());
    }

    #[test]
    fn test_review_states_ignored_when_policy_says_so() {
        let policy = RepoPolicy {
            ignore_review_state: true,
            ..RepoPolicy::default()
        };
        let approvers = collect(
            &[review_event("bob", ReviewState::Approved, 1)],
            &policy,
        );
        assert!(approvers.current_approver_set().is_empty());
    }

    #[test]
    fn test_author_command_recorded_as_self_approval() {
        let approvers = collect(
            &[comment("alice", "/approve", 1)],
            &RepoPolicy::default(),
        );
        let approvals = approvers.approvals();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].how, Provenance::AuthorSelf);
        // Still a full member of the approver set.
        assert_eq!(approvers.current_approver_set(), set(&["alice"]));
    }

    #[test]
    fn test_author_lgtm_recorded_as_self_approval() {
        let policy = RepoPolicy {
            lgtm_acts_as_approve: true,
            ..RepoPolicy::default()
        };
        let approvers = collect(&[comment("alice", "/lgtm", 1)], &policy);
        let approvals = approvers.approvals();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].how, Provenance::AuthorSelf);
        assert_eq!(approvers.current_approver_set(), set(&["alice"]));
    }

    #[test]
    fn test_no_issue_waiver_tracked() {
        let mut approvers = Approvers::new(true);
        collect_approvers(
            &mut approvers,
            &[comment("bob", "/approve no-issue", 1)],
            "alice",
            BOT,
            &RepoPolicy::default(),
        );
        assert!(approvers.issue_requirement_met());
        assert_eq!(approvers.no_issue_approvers(), set(&["bob"]));
    }

    #[test]
    fn test_issue_requirement() {
        let mut approvers = Approvers::new(true);
        assert!(!approvers.issue_requirement_met());
        approvers.associated_issue = Some(7);
        assert!(approvers.issue_requirement_met());

        let approvers = Approvers::new(false);
        assert!(approvers.issue_requirement_met());
    }

    #[test]
    fn test_manual_override_short_circuits_coverage() {
        let mut tree = OwnersTree::new();
        tree.add_approvers("pkg", ["bob"]);
        let coverage = Coverage::compute(
            &["pkg/x.go".to_string()],
            &tree,
            &BTreeSet::new(),
        );

        let mut approvers = Approvers::new(true);
        assert!(!approvers.is_approved(&coverage));
        approvers.manually_approved = true;
        assert!(approvers.is_approved(&coverage));
    }

    #[test]
    fn test_suggested_assignees_exclude_current_approvers() {
        let mut approvers = Approvers::new(false);
        approvers.add_assignee("bob");
        approvers.add_assignee("carol");
        approvers.add_approver("bob", "ref", false);
        assert_eq!(approvers.suggested_assignees(), set(&["carol"]));
    }

    #[test]
    fn test_find_associated_issue_bare_reference() {
        assert_eq!(find_associated_issue("Fixes #123", "acme"), Some(123));
        assert_eq!(find_associated_issue("no reference here", "acme"), None);
    }

    #[test]
    fn test_find_associated_issue_url_scoped_to_org() {
        let body = "See https://github.com/acme/widgets/issues/42 for context";
        assert_eq!(find_associated_issue(body, "acme"), Some(42));

        let body = "See https://github.com/otherorg/widgets/issues/42";
        // The URL form does not match a foreign org, but the trailing
        // "/42" never matches either; only a bare #N would.
        assert_eq!(find_associated_issue(body, "acme"), None);
    }

    #[test]
    fn test_find_associated_issue_first_occurrence_wins() {
        assert_eq!(
            find_associated_issue("Fixes #5 and also #9", "acme"),
            Some(5)
        );
    }

    fn labeled(label: &str, actor: &str) -> LabelEvent {
        LabelEvent {
            action: LabelEventAction::Labeled,
            label: label.to_string(),
            actor: actor.to_string(),
        }
    }

    #[test]
    fn test_human_added_approval_latest_event_decides() {
        let events = vec![labeled(APPROVED_LABEL, "human"), labeled(APPROVED_LABEL, BOT)];
        assert!(!human_added_approval(&events, BOT));

        let events = vec![labeled(APPROVED_LABEL, BOT), labeled(APPROVED_LABEL, "human")];
        assert!(human_added_approval(&events, BOT));
    }

    #[test]
    fn test_human_added_approval_ignores_other_labels_and_predecessors() {
        let events = vec![labeled("needs-rebase", "human")];
        assert!(!human_added_approval(&events, BOT));

        let events = vec![labeled(APPROVED_LABEL, "mergegate-classic")];
        assert!(!human_added_approval(&events, BOT));

        let events = vec![labeled(APPROVED_LABEL, "")];
        assert!(!human_added_approval(&events, BOT));

        assert!(!human_added_approval(&[], BOT));
    }
}
