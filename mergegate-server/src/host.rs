//! Capability interface over the code-hosting service.
//!
//! The evaluation only ever talks to this trait; adapters translate a
//! specific hosting API's wire types into the core shapes. Every operation
//! is keyed by (org, repo, PR number) and returns a structured error on
//! transport or auth failure.

use anyhow::Result;
use async_trait::async_trait;

use mergegate_core::approvers::LabelEvent;
use mergegate_core::comment::{IssueComment, Review, ReviewComment};
use mergegate_core::PullRequestContext;

#[async_trait]
pub trait HostApi: Send + Sync {
    /// Fetch the pull request itself, for triggers whose payload does not
    /// carry the full PR (comment events reference only the issue number).
    async fn get_pull_request(&self, org: &str, repo: &str, number: u64)
        -> Result<PullRequestContext>;

    /// Paths of all files changed by the pull request.
    async fn get_changed_files(&self, org: &str, repo: &str, number: u64) -> Result<Vec<String>>;

    /// Names of the labels currently on the pull request.
    async fn get_labels(&self, org: &str, repo: &str, number: u64) -> Result<Vec<String>>;

    async fn list_issue_comments(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<IssueComment>>;

    async fn list_review_comments(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<ReviewComment>>;

    async fn list_reviews(&self, org: &str, repo: &str, number: u64) -> Result<Vec<Review>>;

    /// Label-change history, oldest first, for human-override detection.
    async fn list_label_events(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<LabelEvent>>;

    async fn create_comment(&self, org: &str, repo: &str, number: u64, body: &str) -> Result<()>;

    async fn delete_comment(&self, org: &str, repo: &str, comment_id: u64) -> Result<()>;

    async fn add_label(&self, org: &str, repo: &str, number: u64, label: &str) -> Result<()>;

    async fn remove_label(&self, org: &str, repo: &str, number: u64, label: &str) -> Result<()>;

    /// The bot's own login, used to recognize its comments and label events.
    async fn bot_name(&self) -> Result<String>;
}
