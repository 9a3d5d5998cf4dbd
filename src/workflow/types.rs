use std::fmt;

use crate::pin::version::Version;
use crate::workspace::publisher::Publication;

/// Outcome of one pass of the sync pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Pinned and latest versions are the same; nothing was touched.
    UpToDate { version: Version },
    /// Upstream reports an older release than the pinned one; nothing was touched.
    RemoteOlder { pinned: Version, remote: Version },
    /// A newer release exists but the run was asked not to change anything.
    DryRun { from: Version, to: Version },
    /// A pull request for the new version is already open; nothing was touched.
    Pending {
        from: Version,
        to: Version,
        branch: String,
    },
    /// The new version built and was published.
    Updated {
        from: Version,
        to: Version,
        publication: Publication,
    },
    /// The new version broke the build; the pinned file was restored.
    BuildFailed {
        from: Version,
        to: Version,
        step: String,
        status: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::BuildFailed { .. })
    }

    /// Short label persisted in the state record.
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::UpToDate { .. } => "up_to_date",
            RunOutcome::RemoteOlder { .. } => "remote_older",
            RunOutcome::DryRun { .. } => "dry_run",
            RunOutcome::Pending { .. } => "pending",
            RunOutcome::Updated { .. } => "updated",
            RunOutcome::BuildFailed { .. } => "build_failed",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::UpToDate { version } => write!(f, "already at latest release {version}"),
            RunOutcome::RemoteOlder { pinned, remote } => {
                write!(f, "pinned {pinned} is newer than upstream {remote}; left unchanged")
            }
            RunOutcome::DryRun { from, to } => write!(f, "would update {from} -> {to} (dry run)"),
            RunOutcome::Pending { from, to, branch } => {
                write!(f, "update {from} -> {to} already waiting on branch {branch}")
            }
            RunOutcome::Updated {
                from,
                to,
                publication,
            } => write!(f, "updated {from} -> {to}, {publication}"),
            RunOutcome::BuildFailed {
                from,
                to,
                step,
                status,
            } => write!(
                f,
                "build failed under {to} at step {step} ({status}); kept {from}"
            ),
        }
    }
}
