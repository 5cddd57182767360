//! One full evaluation of a pull request: fetch, compute, reconcile.
//!
//! All reads happen up front and are fatal on failure; the verdict is then
//! computed purely; finally the status comment and the approval label are
//! reconciled, where failures are logged but never abort the evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

use mergegate_core::approvers::{
    collect_approvers, find_associated_issue, human_added_approval, Approvers,
};
use mergegate_core::comment::{self, Comment};
use mergegate_core::notification::{self, NotificationContext};
use mergegate_core::owners::Coverage;
use mergegate_core::policy::RepoPolicy;
use mergegate_core::{PullRequestContext, APPROVED_LABEL};

use crate::host::HostApi;
use crate::owners_client::OwnersProvider;

/// Identity of one pull request, the unit of evaluation serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrKey {
    pub org: String,
    pub repo: String,
    pub number: u64,
}

impl std::fmt::Display for PrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.org, self.repo, self.number)
    }
}

impl PrKey {
    pub fn of(pr: &PullRequestContext) -> Self {
        Self {
            org: pr.org.clone(),
            repo: pr.repo.clone(),
            number: pr.number,
        }
    }
}

/// Per-PR exclusion around the whole evaluation.
///
/// Trigger events for one pull request can overlap (a new comment while the
/// previous evaluation is still in flight); holding this lock for the full
/// fetch-compute-reconcile sequence keeps label and comment mutations from
/// racing. The map only ever grows, but entries are two pointers each.
#[derive(Default)]
pub struct EvaluationLocks {
    inner: Mutex<HashMap<PrKey, Arc<Mutex<()>>>>,
}

impl EvaluationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &PrKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

/// Link configuration threaded into issue extraction and the notification.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub command_help_url: String,
}

/// Run one evaluation for `pr` and reconcile its visible state.
///
/// The caller is expected to hold the [`EvaluationLocks`] guard for
/// `PrKey::of(pr)` for the duration of this call.
pub async fn evaluate(
    host: &dyn HostApi,
    owners: &dyn OwnersProvider,
    policy: &RepoPolicy,
    links: &LinkConfig,
    pr: &PullRequestContext,
) -> Result<()> {
    let key = PrKey::of(pr);
    info!("Evaluating {key}");

    // Required reads. Any failure aborts with no partial verdict published.
    let files = host
        .get_changed_files(&pr.org, &pr.repo, pr.number)
        .await
        .with_context(|| format!("failed to get PR file changes for {key}"))?;
    let labels = host
        .get_labels(&pr.org, &pr.repo, pr.number)
        .await
        .with_context(|| format!("failed to get issue labels for {key}"))?;
    let has_approved_label = labels.iter().any(|l| l == APPROVED_LABEL);
    let bot_name = host
        .bot_name()
        .await
        .with_context(|| format!("failed to get bot identity for {key}"))?;
    let issue_comments = host
        .list_issue_comments(&pr.org, &pr.repo, pr.number)
        .await
        .with_context(|| format!("failed to get issue comments for {key}"))?;
    let review_comments = host
        .list_review_comments(&pr.org, &pr.repo, pr.number)
        .await
        .with_context(|| format!("failed to get review comments for {key}"))?;
    let reviews = host
        .list_reviews(&pr.org, &pr.repo, pr.number)
        .await
        .with_context(|| format!("failed to get reviews for {key}"))?;
    let tree = owners
        .snapshot(&pr.org, &pr.repo, &pr.branch)
        .await
        .with_context(|| format!("failed to get ownership snapshot for {key}"))?;

    let mut approvers = Approvers::new(policy.require_issue);
    approvers.associated_issue = find_associated_issue(&pr.body, &pr.org);

    // The label-change history fetch is costly; consult it at most once,
    // and only when the label is present (it cannot change mid-evaluation).
    if has_approved_label {
        approvers.manually_approved = human_override(host, &key, &bot_name).await;
    }

    if policy.has_self_approval() {
        // The author implicitly approves their own PR; the reference points
        // at the PR itself rather than at any comment.
        approvers.add_author_self_approver(&pr.author, &format!("{}#", pr.html_url), false);
    } else {
        approvers.add_assignee(&pr.author);
    }
    for assignee in &pr.assignees {
        approvers.add_assignee(assignee);
    }

    let comments = comment::aggregate(&issue_comments, &review_comments, &reviews);
    collect_approvers(&mut approvers, &comments, &pr.author, &bot_name, policy);

    let coverage = Coverage::compute(&files, &tree, &approvers.current_approver_set());
    let approved = approvers.is_approved(&coverage);
    info!(
        "Verdict for {key}: {}",
        if approved { "approved" } else { "not approved" }
    );

    // Only issue-level comments can be notifications; inline review
    // comments live under a different API and are never ours.
    let issue_stream = comment::from_issue_comments(&issue_comments);
    let notifications: Vec<&Comment> = issue_stream
        .iter()
        .filter(|c| notification::is_notification(c, &bot_name))
        .collect();

    let rendered = notification::render(
        &approvers,
        &coverage,
        &NotificationContext {
            org: &pr.org,
            repo: &pr.repo,
            branch: &pr.branch,
            command_help_url: &links.command_help_url,
        },
    );
    if notification::should_post(&rendered, notifications.last().copied()) {
        // There should be at most one prior notification, but stale copies
        // from crashes or predecessors are cleaned up too.
        for stale in &notifications {
            if let Err(e) = host.delete_comment(&pr.org, &pr.repo, stale.id).await {
                error!("Failed to delete stale notification {} on {key}: {e:#}", stale.id);
            }
        }
        if let Err(e) = host
            .create_comment(&pr.org, &pr.repo, pr.number, &rendered)
            .await
        {
            error!("Failed to post status comment on {key}: {e:#}");
        }
    }

    if approved {
        if !has_approved_label {
            if let Err(e) = host
                .add_label(&pr.org, &pr.repo, pr.number, APPROVED_LABEL)
                .await
            {
                error!("Failed to add {APPROVED_LABEL:?} label to {key}: {e:#}");
            }
        }
    } else if has_approved_label {
        if let Err(e) = host
            .remove_label(&pr.org, &pr.repo, pr.number, APPROVED_LABEL)
            .await
        {
            error!("Failed to remove {APPROVED_LABEL:?} label from {key}: {e:#}");
        }
    }

    Ok(())
}

/// Was the approval label applied by a real person? A history-lookup
/// failure is not fatal; it just means no override.
async fn human_override(host: &dyn HostApi, key: &PrKey, bot_name: &str) -> bool {
    match host.list_label_events(&key.org, &key.repo, key.number).await {
        Ok(events) => human_added_approval(&events, bot_name),
        Err(e) => {
            error!("Failed to list label events for {key}: {e:#}");
            false
        }
    }
}
