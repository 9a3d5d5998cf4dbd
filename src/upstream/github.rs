use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};

use crate::config::{RetryConfig, UpstreamConfig};
use crate::error::{AppError, Result};
use crate::upstream::retry::RetryPolicy;
use crate::upstream::types::Release;
use crate::upstream::ReleaseSource;

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("pinsync/", env!("CARGO_PKG_VERSION"));

/// Latest-release lookup against the GitHub REST API.
pub struct GitHubReleases {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
    allow_prerelease: bool,
    retry: RetryPolicy,
}

impl GitHubReleases {
    pub fn new(config: &UpstreamConfig, retry: &RetryConfig) -> Result<Self> {
        let (owner, repo) = config.repo.split_once('/').ok_or_else(|| {
            AppError::Config(format!("upstream.repo must be owner/name, got {}", config.repo))
        })?;

        let token = config
            .token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|t| !t.is_empty());

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token,
            allow_prerelease: config.allow_prerelease,
            retry: RetryPolicy::from_config(retry),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("GET {url} returned {status}: {body}");
            return Err(if is_transient_status(status) {
                AppError::UpstreamTransient(message)
            } else {
                AppError::Upstream(message)
            });
        }

        let bytes = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Upstream(format!("Malformed release JSON from {url}: {e}")))
    }

    async fn fetch_latest(&self) -> Result<Release> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, self.owner, self.repo
        );
        self.get_json(&url).await
    }

    /// Newest non-draft release, pre-releases included.
    async fn fetch_newest_including_prereleases(&self) -> Result<Release> {
        let url = format!(
            "{}/repos/{}/{}/releases?per_page=20",
            self.api_base, self.owner, self.repo
        );
        let releases: Vec<Release> = self.get_json(&url).await?;
        releases
            .into_iter()
            .find(|r| !r.draft)
            .ok_or_else(|| AppError::Upstream(format!("No published releases at {url}")))
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleases {
    async fn latest_release(&self) -> Result<Release> {
        let release = if self.allow_prerelease {
            self.retry
                .run("list releases", || self.fetch_newest_including_prereleases())
                .await?
        } else {
            self.retry
                .run("latest release", || self.fetch_latest())
                .await?
        };

        if release.draft {
            return Err(AppError::Upstream(format!(
                "Latest release {} is a draft",
                release.tag_name
            )));
        }
        if release.prerelease && !self.allow_prerelease {
            return Err(AppError::Upstream(format!(
                "Latest release {} is a pre-release",
                release.tag_name
            )));
        }

        tracing::debug!(
            repo = %format!("{}/{}", self.owner, self.repo),
            tag = %release.tag_name,
            url = release.html_url.as_deref().unwrap_or_default(),
            "Fetched latest release"
        );

        Ok(release)
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn classify(e: reqwest::Error) -> AppError {
    let transient_status = e.status().is_some_and(is_transient_status);
    if e.is_timeout() || e.is_connect() || transient_status {
        AppError::UpstreamTransient(e.to_string())
    } else {
        AppError::Upstream(e.to_string())
    }
}
