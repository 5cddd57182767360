//! Client for the out-of-process ownership-resolution service.
//!
//! The service maintains parsed ownership data per branch; one snapshot is
//! fetched per evaluation and queried locally through
//! [`mergegate_core::owners::OwnershipScopes`].

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info};

use mergegate_core::owners::OwnersTree;

/// Capability to obtain an ownership snapshot for a branch.
#[async_trait]
pub trait OwnersProvider: Send + Sync {
    async fn snapshot(&self, org: &str, repo: &str, branch: &str) -> Result<OwnersTree>;
}

pub struct OwnersServiceClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    /// Declaring directory ("" for the repository root) to its identities.
    scopes: BTreeMap<String, ScopeEntry>,
}

#[derive(Debug, Deserialize)]
struct ScopeEntry {
    #[serde(default)]
    approvers: Vec<String>,
    #[serde(default)]
    reviewers: Vec<String>,
}

impl OwnersServiceClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .user_agent("mergegate/0.1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl OwnersProvider for OwnersServiceClient {
    async fn snapshot(&self, org: &str, repo: &str, branch: &str) -> Result<OwnersTree> {
        let url = format!("{}/v1/owners/{org}/{repo}/{branch}", self.base_url);
        info!("Fetching ownership snapshot for {org}/{repo}@{branch}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send ownership snapshot request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(
                "Ownership service error for {org}/{repo}@{branch}: {status} - {error_text}"
            );
            return Err(anyhow!(
                "Ownership service error for {org}/{repo}@{branch}: {status} - {error_text}"
            ));
        }

        let snapshot: SnapshotResponse = response
            .json()
            .await
            .context("Failed to parse ownership snapshot response")?;

        let mut tree = OwnersTree::new();
        for (directory, entry) in snapshot.scopes {
            if !entry.approvers.is_empty() {
                tree.add_approvers(&directory, &entry.approvers);
            }
            if !entry.reviewers.is_empty() {
                tree.add_reviewers(&directory, &entry.reviewers);
            }
        }
        Ok(tree)
    }
}
