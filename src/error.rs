use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pinned version key `{key}` not found in {}", .path.display())]
    PatternNotFound { path: PathBuf, key: String },

    #[error("Invalid version: {0}")]
    VersionParse(String),

    #[error("Upstream release API error: {0}")]
    Upstream(String),

    #[error("Upstream release API transient error: {0}")]
    UpstreamTransient(String),

    #[error("Build verification error: {0}")]
    Build(String),

    #[error("State store error: {0}")]
    State(String),

    #[error("Pinned version invariant violated: {0}")]
    Invariant(String),

    #[error("Pinned file has uncommitted changes: {0}")]
    DirtyPinnedFile(String),

    #[error("Another run holds the lock for branch {0}")]
    Locked(String),

    #[error("Webhook verification failed: {0}")]
    WebhookVerification(String),

    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    #[error("Git operation failed: {0}")]
    Git(String),

    #[error("Push rejected by remote: {0}")]
    PushRejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::UpstreamTransient(_))
    }
}

impl From<octocrab::Error> for AppError {
    fn from(e: octocrab::Error) -> Self {
        AppError::GitHubApi(e.to_string())
    }
}

impl From<git2::Error> for AppError {
    fn from(e: git2::Error) -> Self {
        AppError::Git(e.message().to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
