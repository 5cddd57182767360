pub mod approvers;
pub mod command;
pub mod comment;
pub mod notification;
pub mod owners;
pub mod policy;

/// Label applied to a pull request once ownership policy is satisfied.
pub const APPROVED_LABEL: &str = "approved";

/// Logins of retired bots that previously managed the approval label.
/// Each can be removed once every PR it approved has been merged or unapproved.
pub const DEPRECATED_BOT_NAMES: &[&str] = &["mergegate-classic", "merge-robot"];

pub fn is_deprecated_bot(login: &str) -> bool {
    DEPRECATED_BOT_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(login))
}

/// Immutable description of the pull request under evaluation.
///
/// Built once from the triggering event (or re-fetched from the hosting API
/// when the event does not carry the full pull request) and discarded when
/// the evaluation finishes.
#[derive(Debug, Clone)]
pub struct PullRequestContext {
    pub org: String,
    pub repo: String,
    /// Target (base) branch of the pull request.
    pub branch: String,
    pub number: u64,
    /// PR description, used only for associated-issue extraction.
    pub body: String,
    /// Login of the PR author.
    pub author: String,
    /// Logins of declared assignees, used as suggested-approver hints.
    pub assignees: Vec<String>,
    pub html_url: String,
}
