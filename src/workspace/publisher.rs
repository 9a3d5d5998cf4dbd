use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, PublishMode};
use crate::error::{AppError, Result};
use crate::pin::version::Version;
use crate::platform::types::CreatePullRequest;
use crate::platform::{repo_from_remote_url, Platform};
use crate::workspace::git::{self, Author};

/// Where a verified version bump ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publication {
    Pushed {
        branch: String,
        commit: String,
    },
    PullRequest {
        branch: String,
        commit: String,
        number: u64,
        url: Option<String>,
    },
}

impl Publication {
    pub fn commit(&self) -> &str {
        match self {
            Publication::Pushed { commit, .. } | Publication::PullRequest { commit, .. } => commit,
        }
    }
}

impl fmt::Display for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Publication::Pushed { branch, commit } => write!(f, "pushed {commit} to {branch}"),
            Publication::PullRequest {
                branch,
                number,
                url,
                ..
            } => match url {
                Some(url) => write!(f, "opened pull request #{number} from {branch} ({url})"),
                None => write!(f, "opened pull request #{number} from {branch}"),
            },
        }
    }
}

/// Commits the patched pinned file and publishes it.
pub struct Publisher {
    config: AppConfig,
    platform: Arc<dyn Platform>,
}

impl Publisher {
    pub fn new(config: &AppConfig, platform: Arc<dyn Platform>) -> Self {
        Self {
            config: config.clone(),
            platform,
        }
    }

    fn repo_dir(&self) -> &PathBuf {
        &self.config.git.repo_dir
    }

    fn author(&self) -> Author {
        Author {
            name: self.config.git.author_name.clone(),
            email: self.config.git.author_email.clone(),
        }
    }

    fn render(&self, template: &str, from: &Version, to: &Version) -> String {
        template
            .replace("{tool}", &self.config.target.tool)
            .replace("{from}", &from.to_string())
            .replace("{to}", &to.to_string())
    }

    pub fn commit_message(&self, from: &Version, to: &Version) -> String {
        self.render(&self.config.publish.commit_message, from, to)
    }

    fn head_branch(&self, to: &Version) -> String {
        format!(
            "{}{}-{}",
            self.config.publish.branch_prefix, self.config.target.tool, to
        )
    }

    /// In pull-request mode, the head branch of an earlier run that already carries `to`.
    pub async fn pending_branch(&self, to: &Version) -> Result<Option<String>> {
        if self.config.publish.mode != PublishMode::PullRequest {
            return Ok(None);
        }

        let head = self.head_branch(to);
        let token = self.platform.access_token().await?;
        let exists = git::branch_exists(
            self.repo_dir(),
            &self.config.git.remote,
            &head,
            token.as_deref(),
        )
        .await?;

        Ok(exists.then_some(head))
    }

    /// Commit and publish on `branch`. On failure no local commit is left behind.
    pub async fn publish(&self, branch: &str, from: &Version, to: &Version) -> Result<Publication> {
        let dir = self.repo_dir();
        let file = &self.config.target.file;

        if !git::is_path_dirty(dir, file).await? {
            return Err(AppError::Internal(format!(
                "{} shows no changes after patching",
                file.display()
            )));
        }

        let token = self.platform.access_token().await?;

        match self.config.publish.mode {
            PublishMode::Push => self.push_to_branch(branch, from, to, token.as_deref()).await,
            PublishMode::PullRequest => {
                self.open_pull_request(branch, from, to, token.as_deref())
                    .await
            }
        }
    }

    async fn commit_file(&self, from: &Version, to: &Version) -> Result<String> {
        let dir = self.repo_dir();
        git::add_path(dir, &self.config.target.file).await?;
        git::commit(dir, &self.commit_message(from, to), &self.author()).await
    }

    async fn roll_back(&self, previous: &str) {
        let dir = self.repo_dir();
        if let Err(e) = git::reset_soft(dir, previous).await {
            tracing::error!(error = %e, "Failed to roll back unpublished commit");
            return;
        }
        if let Err(e) = git::unstage(dir, &self.config.target.file).await {
            tracing::warn!(error = %e, "Failed to unstage pinned file");
        }
    }

    async fn push_to_branch(
        &self,
        branch: &str,
        from: &Version,
        to: &Version,
        token: Option<&str>,
    ) -> Result<Publication> {
        let dir = self.repo_dir();
        let previous = git::head_commit(dir).await?;
        let commit = self.commit_file(from, to).await?;

        if let Err(e) = git::push(dir, &self.config.git.remote, branch, token).await {
            tracing::error!(branch, error = %e, "Push failed, rolling back commit");
            self.roll_back(&previous).await;
            return Err(e);
        }

        tracing::info!(branch, commit = %commit, "Pushed version bump");
        Ok(Publication::Pushed {
            branch: branch.to_string(),
            commit,
        })
    }

    async fn open_pull_request(
        &self,
        base: &str,
        from: &Version,
        to: &Version,
        token: Option<&str>,
    ) -> Result<Publication> {
        let dir = self.repo_dir();
        let remote = &self.config.git.remote;
        let repo_full_name = match &self.config.github.repo {
            Some(repo) => repo.clone(),
            None => {
                let url = git::remote_url(dir, remote).await?;
                repo_from_remote_url(&url).ok_or_else(|| {
                    AppError::Config(format!(
                        "Cannot derive owner/name from remote URL {url}; set github.repo"
                    ))
                })?
            }
        };

        let head = self.head_branch(to);
        let previous = git::head_commit(dir).await?;

        git::create_branch(dir, &head).await?;
        let commit = match self.commit_file(from, to).await {
            Ok(commit) => commit,
            Err(e) => {
                self.roll_back(&previous).await;
                self.leave_branch(base, &head).await;
                return Err(e);
            }
        };

        if let Err(e) = git::push(dir, remote, &head, token).await {
            tracing::error!(branch = %head, error = %e, "Push failed, rolling back commit");
            self.roll_back(&previous).await;
            self.leave_branch(base, &head).await;
            return Err(e);
        }

        // The bump now lives on its own branch; return the work tree to the base.
        git::checkout(dir, base).await?;

        let pr = self
            .platform
            .create_pull_request(
                &repo_full_name,
                &CreatePullRequest {
                    title: self.render(&self.config.publish.pr_title, from, to),
                    body: format!(
                        "Bumps {} from {from} to {to}.\n\nThe site build passed with {to} before this pull request was opened.",
                        self.config.target.tool
                    ),
                    head_branch: head.clone(),
                    base_branch: base.to_string(),
                },
            )
            .await?;

        if let Some(label) = &self.config.publish.label {
            if let Err(e) = self.platform.add_label(&repo_full_name, pr.number, label).await {
                tracing::warn!(pr = pr.number, label = %label, error = %e, "Failed to label pull request");
            }
        }

        tracing::info!(pr = pr.number, branch = %head, "Opened pull request for version bump");
        Ok(Publication::PullRequest {
            branch: head,
            commit,
            number: pr.number,
            url: pr.url,
        })
    }

    async fn leave_branch(&self, base: &str, branch: &str) {
        if let Err(e) = git::abandon_branch(self.repo_dir(), base, branch).await {
            tracing::warn!(branch, error = %e, "Failed to remove unpublished branch");
        }
    }
}
