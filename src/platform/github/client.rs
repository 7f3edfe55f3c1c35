use std::time::Duration;

use async_trait::async_trait;
use octocrab::Octocrab;
use reqwest::{Client, StatusCode};

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::platform::ContentFetcher;
use crate::workflow::validate::RepoReference;

use super::mapper;

/// Fetches README content through the GitHub contents API, falling back to
/// raw files on the configured branches.
pub struct GitHubFetcher {
    config: GitHubConfig,
    api: Octocrab,
    http: Client,
    timeout: Duration,
}

impl GitHubFetcher {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let mut builder = Octocrab::builder()
            .base_uri(config.api_base.as_str())
            .map_err(|e| AppError::Config(format!("Invalid GitHub API base: {e}")))?;
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            builder = builder.personal_token(token.to_string());
        }
        let api = builder
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build octocrab client: {e}")))?;

        Ok(Self {
            config: config.clone(),
            api,
            http: Client::new(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn fetch_via_api(&self, repo: &RepoReference) -> Result<Option<String>> {
        tracing::info!(repo = %repo, "Fetching README via GitHub API");

        let repos = self.api.repos(repo.owner(), repo.name());
        let request = repos.get_readme().send();
        let content = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AppError::Timeout(format!("GitHub API README request for {repo}")))??;

        mapper::map_readme(&content)
    }

    async fn fetch_raw(&self, repo: &RepoReference, branch: &str) -> Result<Option<String>> {
        let url = raw_readme_url(&self.config.raw_base, repo, branch);
        tracing::info!(url = %url, "Trying raw README");

        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("{url}: {e}"))
                } else {
                    AppError::Network(format!("{url}: {e}"))
                }
            })?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.text().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => Err(
                AppError::Network(format!("{url} returned {status}")),
            ),
            status => Err(AppError::GitHubApi(format!("{url} returned {status}"))),
        }
    }
}

#[async_trait]
impl ContentFetcher for GitHubFetcher {
    async fn fetch(&self, repo: &RepoReference) -> Result<String> {
        let mut last_error: Option<AppError> = None;
        let mut found_blank = false;

        match self.fetch_via_api(repo).await {
            Ok(Some(text)) if !text.trim().is_empty() => return Ok(text),
            Ok(Some(_)) => found_blank = true,
            Ok(None) | Err(AppError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(repo = %repo, error = %e, "GitHub API fetch failed, will try raw URLs");
                last_error = Some(e);
            }
        }

        for branch in &self.config.fallback_branches {
            match self.fetch_raw(repo, branch).await {
                Ok(Some(text)) if !text.trim().is_empty() => return Ok(text),
                Ok(Some(_)) => found_blank = true,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(repo = %repo, branch = %branch, error = %e, "Raw README fetch failed");
                    last_error = Some(e);
                }
            }
        }

        if found_blank {
            return Ok(String::new());
        }

        tracing::error!(repo = %repo, "Unable to fetch README");
        Err(last_error.unwrap_or_else(|| AppError::NotFound(format!("No README found for {repo}"))))
    }
}

fn raw_readme_url(raw_base: &str, repo: &RepoReference, branch: &str) -> String {
    format!(
        "{}/{}/{}/{}/README.md",
        raw_base.trim_end_matches('/'),
        urlencoding::encode(repo.owner()),
        urlencoding::encode(repo.name()),
        urlencoding::encode(branch),
    )
}
