use std::fs::{self, File, OpenOptions};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;

use crate::error::Result;

/// Cross-process lock serializing runs that publish to the same branch.
///
/// Backed by an exclusive advisory lock on `<dir>/<branch>.lock`. The OS
/// releases it when the holder exits, so there is no stale state to take
/// over. The file itself is never removed; it records `<pid> <acquired-at>`
/// of the last holder.
#[derive(Debug)]
pub struct BranchLock {
    file: File,
    path: PathBuf,
}

impl BranchLock {
    /// Returns `Ok(None)` when another live run holds the lock.
    pub fn acquire(dir: &Path, branch: &str) -> Result<Option<Self>> {
        fs::create_dir_all(dir)?;
        let path = Self::lock_path(dir, branch);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                tracing::info!(
                    path = %path.display(),
                    holder = %holder.trim(),
                    "Branch lock is held by another run"
                );
                return Ok(None);
            }
            return Err(e.into());
        }

        file.set_len(0)?;
        file.rewind()?;
        writeln!(file, "{} {}", std::process::id(), Utc::now().to_rfc3339())?;

        Ok(Some(Self { file, path }))
    }

    pub fn lock_path(dir: &Path, branch: &str) -> PathBuf {
        dir.join(format!("{}.lock", urlencoding::encode(branch)))
    }
}

impl Drop for BranchLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release branch lock");
        }
    }
}
