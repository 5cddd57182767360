use anyhow::Result;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use mergegate_server::config::{Config, PolicyStore};
use mergegate_server::evaluate::{EvaluationLocks, LinkConfig};
use mergegate_server::github::GitHubClient;
use mergegate_server::owners_client::OwnersServiceClient;
use mergegate_server::webhook::webhook_router;
use mergegate_server::AppState;

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "mergegate"
    })))
}

async fn help_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "mergegate",
        "description": "Merge-gate decision engine: reconciles directory ownership policy onto pull requests",
        "commands": [
            {
                "command": "/approve",
                "description": "Approve the changed files your ownership scopes cover"
            },
            {
                "command": "/approve cancel",
                "description": "Retract your approval"
            },
            {
                "command": "/approve no-issue",
                "description": "Approve and waive the associated-issue requirement"
            },
            {
                "command": "/lgtm",
                "description": "Counts as /approve when the repository enables lgtm_acts_as_approve"
            },
            {
                "command": "/lgtm cancel",
                "description": "Retract an lgtm"
            }
        ],
        "endpoints": [
            {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint"
            },
            {
                "path": "/webhook",
                "method": "POST",
                "description": "GitHub webhook receiver (X-Hub-Signature-256 verified)"
            },
            {
                "path": "/help",
                "method": "GET",
                "description": "Service information and the command reference"
            }
        ],
        "configuration": {
            "required_env_vars": [
                "MERGEGATE_GITHUB_TOKEN",
                "MERGEGATE_WEBHOOK_SECRET",
                "MERGEGATE_OWNERS_URL"
            ],
            "optional_env_vars": [
                "MERGEGATE_GITHUB_API_BASE (default: https://api.github.com)",
                "MERGEGATE_POLICY_PATH (default: built-in permissive policy)",
                "MERGEGATE_COMMAND_HELP_URL",
                "PORT (default: 3000)"
            ]
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting mergegate");

    let config = Config::from_env().expect("Failed to load configuration from environment variables");

    let policies = match &config.policy_path {
        Some(path) => PolicyStore::load(path).expect("Failed to load policy file"),
        None => PolicyStore::permissive(),
    };

    let github_client = GitHubClient::new(config.github_api_base.clone(), config.github_token.clone());
    let owners_client = OwnersServiceClient::new(config.owners_service_url.clone());

    let app_state = Arc::new(AppState {
        host: Arc::new(github_client),
        owners: Arc::new(owners_client),
        webhook_secret: config.webhook_secret.clone(),
        policies,
        links: LinkConfig {
            command_help_url: config.command_help_url.clone(),
        },
        locks: EvaluationLocks::new(),
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/help", get(help_handler))
        .merge(webhook_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
