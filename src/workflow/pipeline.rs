use std::sync::Arc;

use chrono::Utc;
use tracing::Instrument;

use crate::build::{BuildReport, BuildVerifier, Verifier};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::pin::file::{PatchGuard, PinnedFile};
use crate::pin::version::Version;
use crate::platform::github::GitHubPlatform;
use crate::platform::Platform;
use crate::state::{PendingPullRequest, StateStore, SyncState};
use crate::upstream::{GitHubReleases, ReleaseSource};
use crate::workflow::gate::{decide, Decision};
use crate::workflow::lock::BranchLock;
use crate::workflow::types::RunOutcome;
use crate::workspace::git;
use crate::workspace::publisher::{Publication, Publisher};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop after the comparison; never patch, build or publish.
    pub dry_run: bool,
}

/// Pinned and latest versions with the gate's verdict.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub pinned: Version,
    pub remote: Version,
    pub tag: String,
    pub decision: Decision,
}

/// check → patch → build → commit → push, one linear pass per run.
pub struct Pipeline {
    config: AppConfig,
    pinned: PinnedFile,
    source: Arc<dyn ReleaseSource>,
    verifier: Arc<dyn Verifier>,
    platform: Arc<dyn Platform>,
    publisher: Publisher,
    state: StateStore,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        source: Arc<dyn ReleaseSource>,
        verifier: Arc<dyn Verifier>,
        platform: Arc<dyn Platform>,
    ) -> Result<Self> {
        let pinned = PinnedFile::new(config.target_path(), &config.target.key)?;
        let publisher = Publisher::new(&config, Arc::clone(&platform));
        let state = StateStore::new(&config.state.dir);

        Ok(Self {
            config,
            pinned,
            source,
            verifier,
            platform,
            publisher,
            state,
        })
    }

    /// Wire the GitHub release source, the command-based verifier and the GitHub platform.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let source = Arc::new(GitHubReleases::new(&config.upstream, &config.retry)?);
        let verifier = Arc::new(BuildVerifier::new(&config.build, &config.git.repo_dir)?);
        let platform = Arc::new(GitHubPlatform::new(&config.github).await?);
        Self::new(config.clone(), source, verifier, platform)
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    /// Read both versions and compare them. No side effects.
    pub async fn check(&self) -> Result<CheckReport> {
        let pinned = self.pinned.read_pinned().await?;
        let release = self.source.latest_release().await?;
        let remote = release.version()?;
        let decision = decide(&pinned, &remote);

        tracing::info!(
            pinned = %pinned,
            remote = %remote,
            tag = %release.tag_name,
            decision = ?decision,
            "Compared pinned and latest versions"
        );

        Ok(CheckReport {
            pinned,
            remote,
            tag: release.tag_name,
            decision,
        })
    }

    async fn resolve_branch(&self) -> Result<String> {
        match &self.config.git.branch {
            Some(branch) => Ok(branch.clone()),
            None => git::current_branch(&self.config.git.repo_dir).await,
        }
    }

    /// Run the pipeline once under the branch lock and record the outcome.
    pub async fn run(&self, options: RunOptions) -> Result<RunOutcome> {
        let branch = self.resolve_branch().await?;
        let _lock = BranchLock::acquire(&self.config.state.dir, &branch)?
            .ok_or_else(|| AppError::Locked(branch.clone()))?;

        let span = tracing::info_span!("sync", tool = %self.config.target.tool, branch = %branch);
        let result: Result<RunOutcome> = async {
            let mut state = self.state.load().await?;
            let result = self.run_locked(&branch, &state, options).await;
            self.record(&mut state, &result).await;
            result
        }
        .instrument(span)
        .await;
        result
    }

    async fn record(&self, state: &mut SyncState, result: &Result<RunOutcome>) {
        let now = Utc::now();
        match result {
            Ok(outcome) => {
                state.record_check(outcome.label(), now);
                match outcome {
                    RunOutcome::UpToDate { version } => {
                        if state.promote_merged(version) {
                            tracing::info!(version = %version, "Pending pull request was merged");
                        }
                    }
                    RunOutcome::Updated {
                        to,
                        publication: Publication::Pushed { commit, .. },
                        ..
                    } => state.record_verified(to.clone(), commit.clone(), now),
                    // Base branch keeps the old version until the pull request merges.
                    RunOutcome::Updated {
                        to,
                        publication:
                            Publication::PullRequest {
                                branch,
                                commit,
                                number,
                                ..
                            },
                        ..
                    } => state.record_pending(PendingPullRequest {
                        version: to.clone(),
                        branch: branch.clone(),
                        commit: commit.clone(),
                        number: *number,
                        opened_at: now,
                    }),
                    _ => {}
                }
            }
            Err(_) => state.record_check("error", now),
        }

        if let Err(e) = self.state.save(state).await {
            tracing::warn!(path = %self.state.path().display(), error = %e, "Failed to save sync state");
        }
    }

    async fn run_locked(
        &self,
        branch: &str,
        state: &SyncState,
        options: RunOptions,
    ) -> Result<RunOutcome> {
        // A leftover edit would be read back as the pinned version without ever being built.
        let file = &self.config.target.file;
        let present = tokio::fs::try_exists(self.config.target_path())
            .await
            .unwrap_or(false);
        if present && git::is_path_dirty(&self.config.git.repo_dir, file).await? {
            return Err(AppError::DirtyPinnedFile(format!(
                "{} differs from HEAD; commit or discard it before syncing",
                file.display()
            )));
        }

        if self.config.git.pull_before_run && !options.dry_run {
            let token = self.platform.access_token().await?;
            git::fast_forward(
                &self.config.git.repo_dir,
                &self.config.git.remote,
                branch,
                token.as_deref(),
            )
            .await?;
        }

        let check = self
            .check()
            .instrument(tracing::info_span!("check_versions"))
            .await?;

        if let Err(e) = state.check_invariant(&check.pinned) {
            if self.config.state.enforce_invariant {
                return Err(e);
            }
            tracing::warn!(error = %e, "Pinned file disagrees with the sync state");
        }

        let CheckReport {
            pinned,
            remote,
            decision,
            ..
        } = check;
        match decision {
            Decision::UpToDate => {
                tracing::info!(version = %pinned, "Already up to date");
                return Ok(RunOutcome::UpToDate { version: pinned });
            }
            Decision::RemoteOlder => {
                tracing::warn!(
                    pinned = %pinned,
                    remote = %remote,
                    "Upstream latest release is older than the pinned version, leaving it"
                );
                return Ok(RunOutcome::RemoteOlder { pinned, remote });
            }
            Decision::Upgrade => {}
        }

        if options.dry_run {
            tracing::info!(from = %pinned, to = %remote, "Dry run, not patching");
            return Ok(RunOutcome::DryRun {
                from: pinned,
                to: remote,
            });
        }

        if let Some(branch) = self.publisher.pending_branch(&remote).await? {
            tracing::info!(
                to = %remote,
                branch = %branch,
                "Pull request branch for this version already exists"
            );
            return Ok(RunOutcome::Pending {
                from: pinned,
                to: remote,
                branch,
            });
        }

        let guard = self.pinned.patch(&remote).await?;

        let report = self
            .verifier
            .verify(&remote)
            .instrument(tracing::info_span!("build", version = %remote))
            .await;

        match report {
            Ok(BuildReport::Passed { .. }) => {}
            Ok(BuildReport::Failed { step, status, .. }) => {
                guard.restore().await?;
                return Ok(RunOutcome::BuildFailed {
                    from: pinned,
                    to: remote,
                    step,
                    status,
                });
            }
            Err(e) => return Err(restore_then(guard, e).await),
        }

        let publication = match self
            .publisher
            .publish(branch, &pinned, &remote)
            .instrument(tracing::info_span!("publish", version = %remote))
            .await
        {
            Ok(publication) => publication,
            Err(e) => return Err(restore_then(guard, e).await),
        };
        guard.keep();

        tracing::info!(from = %pinned, to = %remote, %publication, "Pinned version updated");

        Ok(RunOutcome::Updated {
            from: pinned,
            to: remote,
            publication,
        })
    }
}

/// Undo the patch and hand back the error that caused it.
async fn restore_then(guard: PatchGuard, cause: AppError) -> AppError {
    if let Err(e) = guard.restore().await {
        tracing::error!(error = %e, "Failed to restore pinned file");
    }
    cause
}
