//! Webhook ingestion: signature verification and event dispatch.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, warn};

use mergegate_core::command::contains_approval_command;
use mergegate_core::{is_deprecated_bot, PullRequestContext};

use crate::evaluate::{evaluate, PrKey};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub action: Option<String>,
    pub pull_request: Option<PullRequestPayload>,
    pub repository: Option<RepositoryPayload>,
    pub comment: Option<CommentPayload>,
    pub issue: Option<IssuePayload>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequestPayload {
    pub number: u64,
    pub body: Option<String>,
    pub html_url: String,
    pub user: UserPayload,
    pub base: RefPayload,
    #[serde(default)]
    pub assignees: Vec<UserPayload>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefPayload {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryPayload {
    pub name: String,
    pub owner: UserPayload,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserPayload {
    pub login: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommentPayload {
    pub body: String,
    pub user: UserPayload,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IssuePayload {
    pub number: u64,
    /// Present only when the issue is actually a pull request.
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

type HmacSha256 = Hmac<Sha256>;

fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    // Constant-time verification.
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_signature(&state.webhook_secret, &bytes, signature) {
        error!("Invalid webhook signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

pub fn webhook_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route_layer(middleware::from_fn_with_state(
            state,
            verify_webhook_signature,
        ))
}

fn ok(message: &str) -> Json<WebhookResponse> {
    Json(WebhookResponse {
        message: message.to_string(),
    })
}

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let event_type = headers
        .get("x-github-event")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    let action = payload.action.as_deref().unwrap_or("");

    match event_type {
        "pull_request" => {
            if !matches!(action, "opened" | "synchronize" | "reopened") {
                return Ok(ok("ignored pull_request action"));
            }
            let (Some(pr), Some(repository)) = (&payload.pull_request, &payload.repository) else {
                return Ok(ok("incomplete pull_request payload"));
            };
            spawn_evaluation(&state, context_from_payload(pr, repository));
            Ok(ok("evaluation scheduled"))
        }
        "pull_request_review" => {
            if action != "submitted" {
                return Ok(ok("ignored review action"));
            }
            let (Some(pr), Some(repository)) = (&payload.pull_request, &payload.repository) else {
                return Ok(ok("incomplete review payload"));
            };
            spawn_evaluation(&state, context_from_payload(pr, repository));
            Ok(ok("evaluation scheduled"))
        }
        "issue_comment" => {
            if action != "created" {
                return Ok(ok("ignored comment action"));
            }
            let (Some(issue), Some(comment), Some(repository)) =
                (&payload.issue, &payload.comment, &payload.repository)
            else {
                return Ok(ok("incomplete comment payload"));
            };
            if issue.pull_request.is_none() {
                return Ok(ok("comment is not on a pull request"));
            }
            handle_comment_event(&state, issue.number, comment, repository).await;
            Ok(ok("comment processed"))
        }
        _ => Ok(ok("ignored event")),
    }
}

/// Comment events carry only the issue number; decide relevance cheaply,
/// then fetch the full pull request before scheduling an evaluation.
async fn handle_comment_event(
    state: &Arc<AppState>,
    number: u64,
    comment: &CommentPayload,
    repository: &RepositoryPayload,
) {
    let org = &repository.owner.login;
    let repo = &repository.name;

    let policy = match state.policies.for_repo(org, repo) {
        Ok(policy) => policy,
        Err(e) => {
            warn!("Dropping comment event: {e:#}");
            return;
        }
    };

    if is_deprecated_bot(&comment.user.login) {
        return;
    }
    if let Ok(bot_name) = state.host.bot_name().await {
        if comment.user.login.eq_ignore_ascii_case(&bot_name) {
            return;
        }
    }
    if !contains_approval_command(&comment.body, policy.lgtm_acts_as_approve) {
        return;
    }

    let pr = match state.host.get_pull_request(org, repo, number).await {
        Ok(pr) => pr,
        Err(e) => {
            error!("Failed to fetch PR {org}/{repo}#{number} for comment event: {e:#}");
            return;
        }
    };
    spawn_evaluation(state, pr);
}

fn context_from_payload(
    pr: &PullRequestPayload,
    repository: &RepositoryPayload,
) -> PullRequestContext {
    PullRequestContext {
        org: repository.owner.login.clone(),
        repo: repository.name.clone(),
        branch: pr.base.ref_name.clone(),
        number: pr.number,
        body: pr.body.clone().unwrap_or_default(),
        author: pr.user.login.clone(),
        assignees: pr.assignees.iter().map(|a| a.login.clone()).collect(),
        html_url: pr.html_url.clone(),
    }
}

/// Run the evaluation off the webhook response path, holding the per-PR
/// lock for the whole fetch-compute-reconcile sequence.
fn spawn_evaluation(state: &Arc<AppState>, pr: PullRequestContext) {
    let state = state.clone();
    tokio::spawn(async move {
        let key = PrKey::of(&pr);
        let policy = match state.policies.for_repo(&pr.org, &pr.repo) {
            Ok(policy) => policy.clone(),
            Err(e) => {
                warn!("Dropping event for {key}: {e:#}");
                return;
            }
        };

        let _guard = state.locks.acquire(&key).await;
        info!("Starting evaluation for {key}");
        if let Err(e) = evaluate(
            state.host.as_ref(),
            state.owners.as_ref(),
            &policy,
            &state.links,
            &pr,
        )
        .await
        {
            error!("Evaluation failed for {key}: {e:#}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_signature_accepts_valid_hmac() {
        let secret = "it's a secret to everybody";
        let payload = b"{\"action\":\"opened\"}";

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        assert!(verify_signature(secret, payload, &signature));
    }

    #[test]
    fn test_verify_signature_rejects_bad_input() {
        let secret = "secret";
        let payload = b"payload";

        assert!(!verify_signature(secret, payload, "sha256=deadbeef"));
        assert!(!verify_signature(secret, payload, "sha1=whatever"));
        assert!(!verify_signature(secret, payload, "sha256=not-hex"));
    }

    #[test]
    fn test_payload_parsing() {
        let raw = r#"{
            "action": "created",
            "issue": {"number": 7, "pull_request": {"url": "https://x"}},
            "comment": {"body": "/approve", "user": {"login": "bob"}},
            "repository": {"name": "widgets", "owner": {"login": "acme"}}
        }"#;
        let payload: WebhookPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.action.as_deref(), Some("created"));
        let issue = payload.issue.unwrap();
        assert_eq!(issue.number, 7);
        assert!(issue.pull_request.is_some());
        assert_eq!(payload.comment.unwrap().user.login, "bob");
    }
}
