//! GitHub adapter for the [`HostApi`] capability interface.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info};

use mergegate_core::approvers::{LabelEvent, LabelEventAction};
use mergegate_core::comment::{IssueComment, Review, ReviewComment};
use mergegate_core::PullRequestContext;

use crate::host::HostApi;

pub struct GitHubClient {
    client: Client,
    api_base: String,
    token: String,
    /// The authenticated login, fetched once and reused for the whole
    /// process lifetime.
    bot_name: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    body: Option<String>,
    html_url: String,
    user: UserResponse,
    base: RefResponse,
    #[serde(default)]
    assignees: Vec<UserResponse>,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct IssueCommentResponse {
    id: u64,
    body: Option<String>,
    user: UserResponse,
    created_at: DateTime<Utc>,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    id: u64,
    body: Option<String>,
    user: Option<UserResponse>,
    submitted_at: Option<DateTime<Utc>>,
    html_url: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct IssueEventResponse {
    event: String,
    actor: Option<UserResponse>,
    label: Option<LabelResponse>,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest {
    body: String,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest {
    labels: Vec<String>,
}

impl GitHubClient {
    pub fn new(api_base: String, token: String) -> Self {
        let client = Client::builder()
            .user_agent("mergegate/0.1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            bot_name: RwLock::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// URL of one label on one issue, with the label name percent-encoded
    /// as a single path segment (label names may contain spaces or `/`).
    fn label_url(&self, org: &str, repo: &str, number: u64, label: &str) -> Result<reqwest::Url> {
        let mut url =
            reqwest::Url::parse(&self.url(&format!("/repos/{org}/{repo}/issues/{number}/labels")))
                .context("Failed to build label URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("label URL cannot be a base"))?
            .push(label);
        Ok(url)
    }

    async fn ensure_success(
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        error!("GitHub API error {}: {} - {}", what, status, error_text);
        Err(anyhow!(
            "GitHub API error {}: {} - {}",
            what,
            status,
            error_text
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .with_context(|| format!("Failed to send {what} request"))?;

        let response = Self::ensure_success(response, what).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))
    }

    /// Fetch every page of a list endpoint. Stops once a page comes back
    /// shorter than the page size.
    async fn get_paginated<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<Vec<T>> {
        let per_page = 100;
        let mut page = 1;
        let mut all = Vec::new();

        loop {
            let paged = format!("{path}?page={page}&per_page={per_page}");
            let items: Vec<T> = self.get_json(&paged, what).await?;
            let count = items.len();
            all.extend(items);
            if count < per_page {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    async fn send_mutation(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<()> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .with_context(|| format!("Failed to send {what} request"))?;

        Self::ensure_success(response, what).await?;
        Ok(())
    }
}

#[async_trait]
impl HostApi for GitHubClient {
    async fn get_pull_request(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequestContext> {
        let pr: PullRequestResponse = self
            .get_json(&format!("/repos/{org}/{repo}/pulls/{number}"), "pull request")
            .await?;

        Ok(PullRequestContext {
            org: org.to_string(),
            repo: repo.to_string(),
            branch: pr.base.ref_name,
            number: pr.number,
            body: pr.body.unwrap_or_default(),
            author: pr.user.login,
            assignees: pr.assignees.into_iter().map(|u| u.login).collect(),
            html_url: pr.html_url,
        })
    }

    async fn get_changed_files(&self, org: &str, repo: &str, number: u64) -> Result<Vec<String>> {
        let files: Vec<FileResponse> = self
            .get_paginated(
                &format!("/repos/{org}/{repo}/pulls/{number}/files"),
                "PR file changes",
            )
            .await?;
        Ok(files.into_iter().map(|f| f.filename).collect())
    }

    async fn get_labels(&self, org: &str, repo: &str, number: u64) -> Result<Vec<String>> {
        let labels: Vec<LabelResponse> = self
            .get_paginated(
                &format!("/repos/{org}/{repo}/issues/{number}/labels"),
                "issue labels",
            )
            .await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    async fn list_issue_comments(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<IssueComment>> {
        let comments: Vec<IssueCommentResponse> = self
            .get_paginated(
                &format!("/repos/{org}/{repo}/issues/{number}/comments"),
                "issue comments",
            )
            .await?;
        Ok(comments
            .into_iter()
            .map(|c| IssueComment {
                id: c.id,
                body: c.body.unwrap_or_default(),
                author: c.user.login,
                created_at: c.created_at,
                html_url: c.html_url,
            })
            .collect())
    }

    async fn list_review_comments(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<ReviewComment>> {
        let comments: Vec<IssueCommentResponse> = self
            .get_paginated(
                &format!("/repos/{org}/{repo}/pulls/{number}/comments"),
                "review comments",
            )
            .await?;
        Ok(comments
            .into_iter()
            .map(|c| ReviewComment {
                id: c.id,
                body: c.body.unwrap_or_default(),
                author: c.user.login,
                created_at: c.created_at,
                html_url: c.html_url,
            })
            .collect())
    }

    async fn list_reviews(&self, org: &str, repo: &str, number: u64) -> Result<Vec<Review>> {
        let reviews: Vec<ReviewResponse> = self
            .get_paginated(
                &format!("/repos/{org}/{repo}/pulls/{number}/reviews"),
                "reviews",
            )
            .await?;
        Ok(reviews
            .into_iter()
            // Pending reviews have no submission time and are invisible to
            // everyone but their author; skip them.
            .filter_map(|r| {
                let submitted_at = r.submitted_at?;
                Some(Review {
                    id: r.id,
                    body: r.body.unwrap_or_default(),
                    author: r.user.map(|u| u.login).unwrap_or_default(),
                    submitted_at,
                    html_url: r.html_url,
                    state: r.state,
                })
            })
            .collect())
    }

    async fn list_label_events(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<LabelEvent>> {
        let events: Vec<IssueEventResponse> = self
            .get_paginated(
                &format!("/repos/{org}/{repo}/issues/{number}/events"),
                "issue events",
            )
            .await?;
        Ok(events
            .into_iter()
            .map(|e| LabelEvent {
                action: match e.event.as_str() {
                    "labeled" => LabelEventAction::Labeled,
                    "unlabeled" => LabelEventAction::Unlabeled,
                    _ => LabelEventAction::Other,
                },
                label: e.label.map(|l| l.name).unwrap_or_default(),
                actor: e.actor.map(|a| a.login).unwrap_or_default(),
            })
            .collect())
    }

    async fn create_comment(&self, org: &str, repo: &str, number: u64, body: &str) -> Result<()> {
        info!("Posting status comment to {org}/{repo}#{number}");
        let request = self
            .client
            .post(self.url(&format!("/repos/{org}/{repo}/issues/{number}/comments")))
            .json(&CreateCommentRequest {
                body: body.to_string(),
            });
        self.send_mutation(request, "create comment").await
    }

    async fn delete_comment(&self, org: &str, repo: &str, comment_id: u64) -> Result<()> {
        info!("Deleting comment {comment_id} in {org}/{repo}");
        let request = self
            .client
            .delete(self.url(&format!("/repos/{org}/{repo}/issues/comments/{comment_id}")));
        self.send_mutation(request, "delete comment").await
    }

    async fn add_label(&self, org: &str, repo: &str, number: u64, label: &str) -> Result<()> {
        info!("Adding label {label:?} to {org}/{repo}#{number}");
        let request = self
            .client
            .post(self.url(&format!("/repos/{org}/{repo}/issues/{number}/labels")))
            .json(&AddLabelsRequest {
                labels: vec![label.to_string()],
            });
        self.send_mutation(request, "add label").await
    }

    async fn remove_label(&self, org: &str, repo: &str, number: u64, label: &str) -> Result<()> {
        info!("Removing label {label:?} from {org}/{repo}#{number}");
        let request = self.client.delete(self.label_url(org, repo, number, label)?);
        self.send_mutation(request, "remove label").await
    }

    async fn bot_name(&self) -> Result<String> {
        {
            let cached = self.bot_name.read().await;
            if let Some(name) = cached.as_ref() {
                return Ok(name.clone());
            }
        }

        let user: UserResponse = self.get_json("/user", "bot identity").await?;
        info!("Resolved bot identity: {}", user.login);

        let mut cached = self.bot_name.write().await;
        *cached = Some(user.login.clone());
        Ok(user.login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_url_percent_encodes_the_label() {
        let client =
            GitHubClient::new("https://api.github.com".to_string(), "token".to_string());

        let url = client.label_url("acme", "widgets", 1, "approved").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/widgets/issues/1/labels/approved"
        );

        let url = client
            .label_url("acme", "widgets", 1, "do not merge/hold")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/widgets/issues/1/labels/do%20not%20merge%2Fhold"
        );
    }
}
