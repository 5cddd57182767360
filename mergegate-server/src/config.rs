use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use mergegate_core::policy::RepoPolicy;

#[derive(Clone)]
pub struct Config {
    pub github_token: String,
    pub github_api_base: String,
    pub webhook_secret: String,
    pub owners_service_url: String,
    /// Per-repository policy file (TOML). When unset, every repository gets
    /// the default policy.
    pub policy_path: Option<PathBuf>,
    /// Where the status comment points readers for the command reference.
    pub command_help_url: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_token = env::var("MERGEGATE_GITHUB_TOKEN")
            .context("MERGEGATE_GITHUB_TOKEN environment variable is required")?;

        let github_api_base = env::var("MERGEGATE_GITHUB_API_BASE")
            .unwrap_or_else(|_| "https://api.github.com".to_string());

        let webhook_secret = env::var("MERGEGATE_WEBHOOK_SECRET")
            .context("MERGEGATE_WEBHOOK_SECRET environment variable is required")?;

        let owners_service_url = env::var("MERGEGATE_OWNERS_URL")
            .context("MERGEGATE_OWNERS_URL environment variable is required")?;

        let policy_path = env::var("MERGEGATE_POLICY_PATH").ok().map(PathBuf::from);

        let command_help_url = env::var("MERGEGATE_COMMAND_HELP_URL")
            .unwrap_or_else(|_| "https://github.com/mergegate/mergegate#commands".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        Ok(Config {
            github_token,
            github_api_base,
            webhook_secret,
            owners_service_url,
            policy_path,
            command_help_url,
            port,
        })
    }
}

/// On-disk shape of the policy file.
#[derive(Debug, Default, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    default: Option<RepoPolicy>,
    /// Keys are "org/repo" or just "org".
    #[serde(default)]
    repos: BTreeMap<String, RepoPolicy>,
}

/// Resolved per-repository policies.
///
/// Lookup order: exact "org/repo", then "org", then the default. A
/// repository with none of the three is a configuration error, surfaced
/// when its first event arrives.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    default: Option<RepoPolicy>,
    repos: BTreeMap<String, RepoPolicy>,
}

impl PolicyStore {
    /// A store that hands every repository the default policy.
    pub fn permissive() -> Self {
        Self {
            default: Some(RepoPolicy::default()),
            repos: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file {}", path.display()))?;
        Self::parse(&raw)
            .with_context(|| format!("Failed to parse policy file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: PolicyFile = toml::from_str(raw).context("Invalid policy TOML")?;
        Ok(Self {
            default: file.default,
            repos: file.repos,
        })
    }

    pub fn for_repo(&self, org: &str, repo: &str) -> Result<&RepoPolicy> {
        self.repos
            .get(&format!("{org}/{repo}"))
            .or_else(|| self.repos.get(org))
            .or(self.default.as_ref())
            .ok_or_else(|| anyhow!("No approval policy configured for {org}/{repo}"))
    }
}
