//! Chronological merge of the three comment sources on a pull request.
//!
//! Issue-level comments, review-level (inline) comments, and review
//! submissions are normalized into one [`Comment`] shape and sorted by
//! creation time. Only review submissions carry a review state; the other
//! two sources never do. This is a pure transformation with no network
//! access.

use chrono::{DateTime, Utc};

/// State attached to a review submission.
///
/// Webhook payloads deliver the state lowercased while the REST API returns
/// it uppercased, so parsing normalizes case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Dismissed,
}

impl ReviewState {
    /// Parse a wire-format review state. Plain "commented" reviews and
    /// unknown states yield `None`: they carry no approval semantics.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_uppercase().as_str() {
            "APPROVED" => Some(ReviewState::Approved),
            "CHANGES_REQUESTED" => Some(ReviewState::ChangesRequested),
            "DISMISSED" => Some(ReviewState::Dismissed),
            _ => None,
        }
    }
}

/// An issue-level comment on the pull request.
#[derive(Debug, Clone)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub html_url: String,
}

/// An inline comment attached to a review.
#[derive(Debug, Clone)]
pub struct ReviewComment {
    pub id: u64,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub html_url: String,
}

/// A review submission, whose body text may itself carry commands.
#[derive(Debug, Clone)]
pub struct Review {
    pub id: u64,
    pub body: String,
    pub author: String,
    pub submitted_at: DateTime<Utc>,
    pub html_url: String,
    /// Raw wire-format state, e.g. "APPROVED" or "changes_requested".
    pub state: String,
}

/// Unified comment event, the input shape for the approver state machine.
#[derive(Debug, Clone)]
pub struct Comment {
    /// Source identifier, kept so stale notifications can be deleted.
    pub id: u64,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub html_url: String,
    /// Present only for comments that came from review submissions.
    pub review_state: Option<ReviewState>,
}

pub fn from_issue_comments(comments: &[IssueComment]) -> Vec<Comment> {
    comments
        .iter()
        .map(|c| Comment {
            id: c.id,
            body: c.body.clone(),
            author: c.author.clone(),
            created_at: c.created_at,
            html_url: c.html_url.clone(),
            review_state: None,
        })
        .collect()
}

pub fn from_review_comments(comments: &[ReviewComment]) -> Vec<Comment> {
    comments
        .iter()
        .map(|c| Comment {
            id: c.id,
            body: c.body.clone(),
            author: c.author.clone(),
            created_at: c.created_at,
            html_url: c.html_url.clone(),
            review_state: None,
        })
        .collect()
}

pub fn from_reviews(reviews: &[Review]) -> Vec<Comment> {
    reviews
        .iter()
        .map(|r| Comment {
            id: r.id,
            body: r.body.clone(),
            author: r.author.clone(),
            created_at: r.submitted_at,
            html_url: r.html_url.clone(),
            review_state: ReviewState::parse(&r.state),
        })
        .collect()
}

/// Merge the three sources into one stream ordered ascending by creation
/// time. The sort is stable, so events with equal timestamps keep their
/// source order (review comments, then issue comments, then reviews).
pub fn aggregate(
    issue_comments: &[IssueComment],
    review_comments: &[ReviewComment],
    reviews: &[Review],
) -> Vec<Comment> {
    let mut comments = from_review_comments(review_comments);
    comments.extend(from_issue_comments(issue_comments));
    comments.extend(from_reviews(reviews));
    comments.sort_by_key(|c| c.created_at);
    comments
}
