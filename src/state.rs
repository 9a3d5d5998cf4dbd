use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::pin::version::Version;

const STATE_FILENAME: &str = "state.json";
const HISTORY_LIMIT: usize = 20;

/// A version that passed build verification and was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedRelease {
    pub version: Version,
    pub commit: String,
    pub verified_at: DateTime<Utc>,
}

/// A verified version waiting in an open pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPullRequest {
    pub version: Version,
    pub branch: String,
    pub commit: String,
    pub number: u64,
    pub opened_at: DateTime<Utc>,
}

/// Persisted record of what the pinned file should hold and how we got there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub pinned_version: Option<Version>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_verified_build_id: Option<String>,
    pub last_outcome: Option<String>,
    /// Set while a pull request carries a verified bump that is not merged yet.
    #[serde(default)]
    pub pending: Option<PendingPullRequest>,
    #[serde(default)]
    pub history: Vec<VerifiedRelease>,
}

impl SyncState {
    pub fn record_check(&mut self, outcome: &str, at: DateTime<Utc>) {
        self.last_checked_at = Some(at);
        self.last_outcome = Some(outcome.to_string());
    }

    pub fn record_verified(&mut self, version: Version, commit: String, at: DateTime<Utc>) {
        if self.pending.as_ref().is_some_and(|p| p.version <= version) {
            self.pending = None;
        }
        self.pinned_version = Some(version.clone());
        self.last_verified_build_id = Some(commit.clone());
        self.history.push(VerifiedRelease {
            version,
            commit,
            verified_at: at,
        });
        self.trim_history();
    }

    pub fn record_pending(&mut self, pending: PendingPullRequest) {
        self.pending = Some(pending);
    }

    /// Once the pinned file holds the pending version its pull request was merged.
    /// Returns true when the pending bump was promoted to verified.
    pub fn promote_merged(&mut self, file_version: &Version) -> bool {
        if !self.pending.as_ref().is_some_and(|p| &p.version == file_version) {
            return false;
        }
        let Some(pending) = self.pending.take() else {
            return false;
        };
        self.pinned_version = Some(pending.version.clone());
        self.last_verified_build_id = Some(pending.commit.clone());
        self.history.push(VerifiedRelease {
            version: pending.version,
            commit: pending.commit,
            verified_at: pending.opened_at,
        });
        self.trim_history();
        true
    }

    fn trim_history(&mut self) {
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    /// The pinned file must hold the last version that passed verification,
    /// or the version of a pending pull request that has since been merged.
    ///
    /// A record with no verified version yet accepts anything.
    pub fn check_invariant(&self, file_version: &Version) -> Result<()> {
        if self.pending.as_ref().is_some_and(|p| &p.version == file_version) {
            return Ok(());
        }
        match &self.pinned_version {
            Some(verified) if verified != file_version => Err(AppError::Invariant(format!(
                "pinned file holds {file_version} but the last verified version is {verified}"
            ))),
            _ => Ok(()),
        }
    }
}

/// JSON file holding the [`SyncState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(STATE_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<SyncState> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                AppError::State(format!("Malformed state file {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SyncState::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a temp file and rename so readers never see a partial record.
    pub async fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = format!("{}\n", serde_json::to_string_pretty(state)?);
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
