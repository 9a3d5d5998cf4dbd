pub mod github;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

#[async_trait]
pub trait Platform: Send + Sync {
    /// The elevated token used for pushing, if one is configured.
    async fn access_token(&self) -> Result<Option<String>>;

    /// Create a pull request.
    async fn create_pull_request(
        &self,
        repo_full_name: &str,
        pr: &CreatePullRequest,
    ) -> Result<PullRequest>;

    /// Add a label to an issue or PR.
    async fn add_label(&self, repo_full_name: &str, issue_number: u64, label: &str) -> Result<()>;
}

/// Extract `owner/name` from a GitHub remote URL (HTTPS or SSH form).
pub fn repo_from_remote_url(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://"))
        .unwrap_or(url);
    let path = match rest.split_once(':') {
        Some((host, path)) if !host.contains('/') => path,
        _ => rest.split_once('/')?.1,
    };
    let path = path.trim_end_matches('/').trim_end_matches(".git");
    let mut parts = path.rsplitn(3, '/');
    let name = parts.next().filter(|s| !s.is_empty())?;
    let owner = parts.next().filter(|s| !s.is_empty())?;
    Some(format!("{owner}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_from_https_url() {
        assert_eq!(
            repo_from_remote_url("https://github.com/alice/blog.git").as_deref(),
            Some("alice/blog")
        );
        assert_eq!(
            repo_from_remote_url("https://x-access-token@github.com/alice/blog").as_deref(),
            Some("alice/blog")
        );
    }

    #[test]
    fn test_repo_from_ssh_url() {
        assert_eq!(
            repo_from_remote_url("git@github.com:alice/blog.git").as_deref(),
            Some("alice/blog")
        );
    }

    #[test]
    fn test_repo_from_unusable_url() {
        assert_eq!(repo_from_remote_url("blog"), None);
        assert_eq!(repo_from_remote_url("https://github.com/"), None);
    }
}
