//! Rendering and idempotence of the status notification.
//!
//! The bot maintains a single canonical status comment per pull request. It
//! is recognized by a fixed leading marker token; rendering is fully
//! deterministic (sorted collections throughout) so that a semantically
//! unchanged message is byte-for-byte contained in the previous posting and
//! can be suppressed.

use std::fmt::Write as _;

use crate::approvers::{Approvers, Provenance};
use crate::comment::Comment;
use crate::is_deprecated_bot;
use crate::owners::Coverage;

/// Marker token opening every status comment posted by the bot.
pub const NOTIFICATION_MARKER: &str = "[APPROVALNOTIFIER]";

/// Whether a body opens with the notification marker, case-insensitively.
/// Anything after the marker (including parenthetical detail) is ignored.
pub fn starts_with_marker(body: &str) -> bool {
    match body.get(..NOTIFICATION_MARKER.len()) {
        Some(prefix) => prefix.eq_ignore_ascii_case(NOTIFICATION_MARKER),
        None => false,
    }
}

/// Whether a comment is a status notification left by this bot or by a
/// retired predecessor.
pub fn is_notification(comment: &Comment, bot_name: &str) -> bool {
    (comment.author.eq_ignore_ascii_case(bot_name) || is_deprecated_bot(&comment.author))
        && starts_with_marker(&comment.body)
}

/// Everything the renderer needs beyond the computed state.
#[derive(Debug, Clone)]
pub struct NotificationContext<'a> {
    pub org: &'a str,
    pub repo: &'a str,
    pub branch: &'a str,
    /// Where the bot's command reference lives.
    pub command_help_url: &'a str,
}

/// Render the canonical status comment for the current verdict.
pub fn render(approvers: &Approvers, coverage: &Coverage, ctx: &NotificationContext) -> String {
    let approved = approvers.is_approved(coverage);
    let mut out = String::new();

    let verdict = if approved { "**APPROVED**" } else { "**NOT APPROVED**" };
    let _ = writeln!(out, "{NOTIFICATION_MARKER} This PR is {verdict}");
    out.push('\n');

    if approvers.manually_approved {
        out.push_str("Approval was granted manually by applying the `approved` label.\n\n");
    }

    let approvals = approvers.approvals();
    if approvals.is_empty() {
        out.push_str("No approvals have been recorded yet.\n");
    } else {
        let rendered: Vec<String> = approvals
            .iter()
            .map(|a| match a.how {
                Provenance::AuthorSelf => format!("[{}]({}) (author)", a.login, a.reference),
                _ => format!("[{}]({})", a.login, a.reference),
            })
            .collect();
        let _ = writeln!(
            out,
            "This pull request is approved by: {}",
            rendered.join(", ")
        );
    }
    out.push('\n');

    if approvers.require_issue {
        let waivers = approvers.no_issue_approvers();
        if let Some(issue) = approvers.associated_issue {
            let _ = writeln!(out, "Associated issue: #{issue}");
        } else if !waivers.is_empty() {
            let waivers: Vec<String> = waivers.into_iter().collect();
            let _ = writeln!(
                out,
                "Associated issue requirement waived by: {}",
                waivers.join(", ")
            );
        } else {
            out.push_str(
                "*No associated issue*. An issue reference is required: \
                 link one in the PR description, or approve with `/approve no-issue`.\n",
            );
        }
        out.push('\n');
    }

    if !coverage.is_fully_covered() && !approvers.manually_approved {
        let uncovered = coverage.uncovered_scopes();
        if !uncovered.is_empty() {
            out.push_str(
                "Approval is still needed from an approver in each of these directories:\n",
            );
            for (directory, candidates) in &uncovered {
                let shown = if directory.is_empty() { "(repository root)" } else { directory };
                let candidates: Vec<String> = candidates.iter().cloned().collect();
                let _ = writeln!(out, "- **{}**: {}", shown, candidates.join(", "));
            }
            out.push('\n');
        }

        let unowned = coverage.unowned_files();
        if !unowned.is_empty() {
            out.push_str("These files are outside every ownership scope and cannot be approved:\n");
            for path in unowned {
                let _ = writeln!(out, "- `{path}`");
            }
            out.push('\n');
        }

        let mut suggestions = approvers.suggested_assignees();
        suggestions.extend(coverage.suggested_reviewers());
        if !suggestions.is_empty() {
            let suggestions: Vec<String> = suggestions.into_iter().collect();
            let _ = writeln!(out, "Consider asking for review from: {}", suggestions.join(", "));
            out.push('\n');
        }
    }

    let _ = writeln!(
        out,
        "The full list of commands accepted by this bot is available [here]({}) \
         (evaluated for `{}/{}` on branch `{}`).",
        ctx.command_help_url, ctx.org, ctx.repo, ctx.branch
    );
    out
}

/// Idempotence check: the new message is posted only when its content is not
/// already contained in the most recent prior notification.
pub fn should_post(new_message: &str, latest: Option<&Comment>) -> bool {
    match latest {
        Some(previous) => !previous.body.contains(new_message),
        None => true,
    }
}
