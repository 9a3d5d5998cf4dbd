use async_trait::async_trait;
use octocrab::Octocrab;
use tokio::sync::RwLock;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::Platform;

use super::auth::generate_app_jwt;
use super::mapper;

pub struct GitHubPlatform {
    config: GitHubConfig,
    /// Cached installation token and its expiry (GitHub App mode only).
    token_cache: RwLock<Option<(String, chrono::DateTime<chrono::Utc>)>>,
}

impl GitHubPlatform {
    pub async fn new(config: &GitHubConfig) -> Result<Self> {
        if let Some(app) = &config.app {
            if !app.private_key_path.exists() {
                return Err(AppError::Config(format!(
                    "GitHub App private key not found at: {}",
                    app.private_key_path.display()
                )));
            }
        }

        Ok(Self {
            config: config.clone(),
            token_cache: RwLock::new(None),
        })
    }

    /// Get an octocrab instance authenticated with the push token.
    async fn client(&self) -> Result<Octocrab> {
        let token = self.access_token().await?.ok_or_else(|| {
            AppError::Config(format!(
                "No GitHub token available; set {} or configure github.app",
                self.config.token_env
            ))
        })?;
        Octocrab::builder()
            .personal_token(token)
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to build octocrab client: {e}")))
    }

    fn parse_repo(repo_full_name: &str) -> Result<(&str, &str)> {
        match repo_full_name.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok((owner, repo)),
            _ => Err(AppError::GitHubApi(format!(
                "Invalid repo name: {repo_full_name}"
            ))),
        }
    }

    async fn installation_token(&self) -> Result<String> {
        let Some(app) = &self.config.app else {
            return Err(AppError::Config("github.app is not configured".to_string()));
        };

        // Check cache
        {
            let cache = self.token_cache.read().await;
            if let Some((token, expiry)) = cache.as_ref() {
                if *expiry > chrono::Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(token.clone());
                }
            }
        }

        let jwt = generate_app_jwt(app)?;

        let client = Octocrab::builder()
            .personal_token(jwt)
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to build JWT client: {e}")))?;

        let url = format!("/app/installations/{}/access_tokens", app.installation_id);
        let response: serde_json::Value = client
            .post(&url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to create installation token: {e}")))?;

        let token = response["token"]
            .as_str()
            .ok_or_else(|| AppError::GitHubApi("No token in response".to_string()))?
            .to_string();

        let expires_at = response["expires_at"]
            .as_str()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|| chrono::Utc::now() + chrono::Duration::hours(1));

        *self.token_cache.write().await = Some((token.clone(), expires_at));

        tracing::debug!(
            installation_id = app.installation_id,
            expires_at = %expires_at,
            "Minted installation token"
        );

        Ok(token)
    }
}

#[async_trait]
impl Platform for GitHubPlatform {
    async fn access_token(&self) -> Result<Option<String>> {
        if self.config.app.is_some() {
            return self.installation_token().await.map(Some);
        }

        Ok(std::env::var(&self.config.token_env)
            .ok()
            .filter(|t| !t.is_empty()))
    }

    async fn create_pull_request(
        &self,
        repo_full_name: &str,
        pr: &CreatePullRequest,
    ) -> Result<PullRequest> {
        let client = self.client().await?;
        let (owner, repo) = Self::parse_repo(repo_full_name)?;

        let created = client
            .pulls(owner, repo)
            .create(&pr.title, &pr.head_branch, &pr.base_branch)
            .body(&pr.body)
            .send()
            .await?;

        Ok(mapper::map_pull_request(created))
    }

    async fn add_label(&self, repo_full_name: &str, issue_number: u64, label: &str) -> Result<()> {
        let client = self.client().await?;
        let (owner, repo) = Self::parse_repo(repo_full_name)?;

        client
            .issues(owner, repo)
            .add_labels(issue_number, &[label.to_string()])
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo() {
        assert_eq!(
            GitHubPlatform::parse_repo("alice/blog").unwrap(),
            ("alice", "blog")
        );
        assert!(GitHubPlatform::parse_repo("blog").is_err());
        assert!(GitHubPlatform::parse_repo("/blog").is_err());
    }

    #[tokio::test]
    async fn test_token_mode_without_env_has_no_token() {
        let config = GitHubConfig {
            token_env: "PINSYNC_TEST_TOKEN_THAT_IS_NEVER_SET".to_string(),
            ..GitHubConfig::default()
        };
        let platform = GitHubPlatform::new(&config).await.unwrap();
        assert_eq!(platform.access_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_app_mode_requires_private_key() {
        let config = GitHubConfig {
            app: Some(crate::config::GitHubAppConfig {
                app_id: 1,
                private_key_path: "/nonexistent/key.pem".into(),
                installation_id: 2,
            }),
            ..GitHubConfig::default()
        };
        assert!(GitHubPlatform::new(&config).await.is_err());
    }
}
