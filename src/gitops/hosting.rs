//! Hosting-provider interface — pull request creation and reconciliation.
//!
//! The engine only needs three operations; everything else about the
//! hosting API stays outside. `GitHubClient` is the real implementation,
//! tests substitute their own.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::HostingConfig;
use crate::error::HostingError;

/// Externally observable state of a change proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalState {
    Open,
    Merged,
    Closed,
}

/// A created change proposal.
#[derive(Debug, Clone)]
pub struct ProposalInfo {
    pub number: u64,
    pub url: String,
}

/// Narrow client for the hosting provider's pull request API.
#[async_trait]
pub trait HostingClient: Send + Sync {
    /// Open a pull request from `head` into `base`.
    async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<ProposalInfo, HostingError>;

    /// Current state of a pull request.
    async fn pull_request_state(&self, number: u64) -> Result<ProposalState, HostingError>;

    /// Close a pull request without merging.
    async fn close_pull_request(&self, number: u64) -> Result<(), HostingError>;
}

/// GitHub REST implementation.
pub struct GitHubClient {
    http: reqwest::Client,
    config: HostingConfig,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
    state: String,
    merged_at: Option<String>,
}

impl GitHubClient {
    pub fn new(config: HostingConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn pulls_url(&self, suffix: &str) -> String {
        format!(
            "https://api.github.com/repos/{}/{}/pulls{}",
            self.config.owner, self.config.repo, suffix
        )
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(self.config.token.expose_secret())
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "autodev")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, HostingError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(HostingError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl HostingClient for GitHubClient {
    async fn create_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<ProposalInfo, HostingError> {
        let response = self
            .request(self.http.post(self.pulls_url("")))
            .json(&serde_json::json!({
                "title": title,
                "body": body,
                "head": head,
                "base": base,
            }))
            .send()
            .await?;
        let pull: PullResponse = Self::check(response).await?.json().await?;
        tracing::info!(number = pull.number, url = %pull.html_url, "Pull request created");
        Ok(ProposalInfo {
            number: pull.number,
            url: pull.html_url,
        })
    }

    async fn pull_request_state(&self, number: u64) -> Result<ProposalState, HostingError> {
        let response = self
            .request(self.http.get(self.pulls_url(&format!("/{number}"))))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(HostingError::NotFound { number });
        }
        let pull: PullResponse = Self::check(response).await?.json().await?;
        let state = if pull.merged_at.is_some() {
            ProposalState::Merged
        } else if pull.state == "closed" {
            ProposalState::Closed
        } else {
            ProposalState::Open
        };
        Ok(state)
    }

    async fn close_pull_request(&self, number: u64) -> Result<(), HostingError> {
        let response = self
            .request(self.http.patch(self.pulls_url(&format!("/{number}"))))
            .json(&serde_json::json!({"state": "closed"}))
            .send()
            .await?;
        Self::check(response).await?;
        tracing::info!(number, "Pull request closed");
        Ok(())
    }
}
