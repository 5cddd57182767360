//! Per-repository approval policy.

use serde::Deserialize;

/// Policy knobs governing how approvals are accumulated for one repository.
///
/// All fields default to off, which yields the historical behavior: implicit
/// self-approval, review states considered, no issue requirement, and `/lgtm`
/// not counting as approval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoPolicy {
    /// Require an associated issue reference before a PR can be approved.
    #[serde(default)]
    pub require_issue: bool,

    /// Require PR authors to explicitly approve their own PRs. When unset,
    /// the author implicitly approves the changes in their PR.
    #[serde(default)]
    pub require_self_approval: bool,

    /// Treat `/lgtm` as if it were `/approve`.
    #[serde(default)]
    pub lgtm_acts_as_approve: bool,

    /// Ignore review submission states. When unset:
    /// an approved review counts as `/approve`, a changes-requested or
    /// dismissed review counts as `/approve cancel`.
    #[serde(default)]
    pub ignore_review_state: bool,
}

impl RepoPolicy {
    /// Whether the PR author is implicitly seeded as an approver.
    pub fn has_self_approval(&self) -> bool {
        !self.require_self_approval
    }

    /// Whether review submission states feed the approver set.
    pub fn consider_review_state(&self) -> bool {
        !self.ignore_review_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_keep_historical_behavior() {
        let policy = RepoPolicy::default();
        assert!(policy.has_self_approval());
        assert!(policy.consider_review_state());
        assert!(!policy.require_issue);
        assert!(!policy.lgtm_acts_as_approve);
    }

    #[test]
    fn test_flags_invert_accessors() {
        let policy = RepoPolicy {
            require_self_approval: true,
            ignore_review_state: true,
            ..RepoPolicy::default()
        };
        assert!(!policy.has_self_approval());
        assert!(!policy.consider_review_state());
    }
}
