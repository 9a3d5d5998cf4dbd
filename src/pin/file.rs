use std::path::PathBuf;

use regex::Regex;

use crate::error::{AppError, Result};
use crate::pin::version::Version;

/// A `KEY: value` line inside a text file (usually a CI definition).
///
/// Matching is line based: leading indentation, optional quotes around the
/// value, and either `:` or `=` as separator. Nothing else in the file is
/// interpreted.
#[derive(Debug, Clone)]
pub struct PinnedFile {
    path: PathBuf,
    key: String,
    pattern: Regex,
}

/// The original contents of a patched file, kept until the change is accepted.
///
/// Dropping an unsettled guard (a cancelled or panicking run) writes the
/// original bytes back, so an unverified version never outlives its run.
#[must_use = "a patch must be kept or restored"]
pub struct PatchGuard {
    path: PathBuf,
    original: String,
    settled: bool,
}

impl PinnedFile {
    pub fn new(path: impl Into<PathBuf>, key: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(
            r#"(?m)^(?P<lead>[ \t]*-?[ \t]*)(?P<key>{})(?P<sep>[ \t]*[:=][ \t]*)(?P<open>["']?)(?P<value>[0-9A-Za-z.+\-]+)"#,
            regex::escape(key)
        ))
        .map_err(|e| AppError::Config(format!("Invalid key pattern for {key}: {e}")))?;

        Ok(Self {
            path: path.into(),
            key: key.to_string(),
            pattern,
        })
    }

    fn not_found(&self) -> AppError {
        AppError::PatternNotFound {
            path: self.path.clone(),
            key: self.key.clone(),
        }
    }

    /// Extract the pinned version from file contents.
    ///
    /// Every matching line must agree on the value.
    pub fn find_pinned(&self, contents: &str) -> Result<Version> {
        let mut values = self
            .pattern
            .captures_iter(contents)
            .filter_map(|caps| caps.name("value").map(|m| m.as_str()));

        let first = values.next().ok_or_else(|| self.not_found())?;
        if let Some(other) = values.find(|v| *v != first) {
            return Err(AppError::VersionParse(format!(
                "{} pins conflicting values in {}: {first} and {other}",
                self.key,
                self.path.display()
            )));
        }

        first.parse()
    }

    /// Replace the pinned value on every matching line, leaving all other bytes untouched.
    pub fn render_patched(&self, contents: &str, new: &Version) -> Result<String> {
        let replacement = new.to_string();
        let mut out = String::with_capacity(contents.len() + replacement.len());
        let mut cursor = 0;

        for caps in self.pattern.captures_iter(contents) {
            let Some(value) = caps.name("value") else {
                continue;
            };
            out.push_str(&contents[cursor..value.start()]);
            out.push_str(&replacement);
            cursor = value.end();
        }

        if cursor == 0 {
            return Err(self.not_found());
        }

        out.push_str(&contents[cursor..]);
        Ok(out)
    }

    pub async fn read_pinned(&self) -> Result<Version> {
        let contents = self.read().await?;
        self.find_pinned(&contents)
    }

    /// Write `new` into the file, returning a guard that can undo the write.
    pub async fn patch(&self, new: &Version) -> Result<PatchGuard> {
        let original = self.read().await?;
        let patched = self.render_patched(&original, new)?;
        tokio::fs::write(&self.path, patched).await?;

        tracing::info!(
            path = %self.path.display(),
            key = %self.key,
            version = %new,
            "Patched pinned version"
        );

        Ok(PatchGuard {
            path: self.path.clone(),
            original,
            settled: false,
        })
    }

    async fn read(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                self.not_found()
            } else {
                AppError::Io(e)
            }
        })
    }
}

impl PatchGuard {
    /// Put the original bytes back.
    pub async fn restore(mut self) -> Result<()> {
        tokio::fs::write(&self.path, &self.original).await?;
        self.settled = true;
        tracing::info!(path = %self.path.display(), "Restored pinned file");
        Ok(())
    }

    /// Accept the patched contents.
    pub fn keep(mut self) {
        self.settled = true;
    }
}

impl Drop for PatchGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        match std::fs::write(&self.path, &self.original) {
            Ok(()) => tracing::warn!(
                path = %self.path.display(),
                "Run ended before the patch was settled, restored pinned file"
            ),
            Err(e) => tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to restore pinned file after an interrupted run"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKFLOW: &str = "\
name: Deploy Hugo site
on:
  schedule:
    - cron: '0 6 * * 1'
jobs:
  build:
    runs-on: ubuntu-latest
    env:
      HUGO_VERSION: 0.134.0
    steps:
      - uses: actions/checkout@v4
";

    fn pinned() -> PinnedFile {
        PinnedFile::new("hugo.yml", "HUGO_VERSION").unwrap()
    }

    #[test]
    fn test_find_pinned_in_workflow() {
        assert_eq!(pinned().find_pinned(WORKFLOW).unwrap(), Version::new(0, 134, 0));
    }

    #[test]
    fn test_find_pinned_accepts_quotes_and_equals() {
        let file = pinned();
        assert_eq!(
            file.find_pinned("HUGO_VERSION = \"0.120.4\"\n").unwrap(),
            Version::new(0, 120, 4)
        );
        assert_eq!(
            file.find_pinned("  HUGO_VERSION: '0.120.4' # pinned\n").unwrap(),
            Version::new(0, 120, 4)
        );
    }

    #[test]
    fn test_find_pinned_missing_key_fails_loudly() {
        let err = pinned().find_pinned("GO_VERSION: 1.22.0\n").unwrap_err();
        assert!(matches!(err, AppError::PatternNotFound { .. }));
    }

    #[test]
    fn test_find_pinned_ignores_longer_keys() {
        let err = pinned()
            .find_pinned("HUGO_VERSION_OLD: 0.100.0\nMY_HUGO_VERSION: 0.1.0\n")
            .unwrap_err();
        assert!(matches!(err, AppError::PatternNotFound { .. }));
    }

    #[test]
    fn test_find_pinned_rejects_conflicting_values() {
        let contents = "HUGO_VERSION: 0.134.0\nHUGO_VERSION: 0.133.0\n";
        assert!(pinned().find_pinned(contents).is_err());
    }

    #[test]
    fn test_render_patched_touches_only_the_value() {
        let patched = pinned()
            .render_patched(WORKFLOW, &Version::new(0, 135, 0))
            .unwrap();
        assert_eq!(patched, WORKFLOW.replace("0.134.0", "0.135.0"));
    }

    #[test]
    fn test_render_patched_preserves_quotes_and_comment() {
        let patched = pinned()
            .render_patched(
                "env:\n  HUGO_VERSION: \"0.134.0\" # keep in sync\nNODE: 20\n",
                &Version::new(0, 135, 0),
            )
            .unwrap();
        assert_eq!(patched, "env:\n  HUGO_VERSION: \"0.135.0\" # keep in sync\nNODE: 20\n");
    }

    #[test]
    fn test_render_patched_without_match_is_an_error() {
        let err = pinned()
            .render_patched("HUGO_VER: 0.134.0\n", &Version::new(0, 135, 0))
            .unwrap_err();
        assert!(matches!(err, AppError::PatternNotFound { .. }));
    }

    #[tokio::test]
    async fn test_patch_then_restore_round_trips_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hugo.yml");
        std::fs::write(&path, WORKFLOW).unwrap();

        let file = PinnedFile::new(&path, "HUGO_VERSION").unwrap();
        let guard = file.patch(&Version::new(0, 135, 0)).await.unwrap();
        assert_eq!(file.read_pinned().await.unwrap(), Version::new(0, 135, 0));

        guard.restore().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), WORKFLOW);
    }

    #[tokio::test]
    async fn test_read_pinned_missing_file() {
        let file = PinnedFile::new("/nonexistent/hugo.yml", "HUGO_VERSION").unwrap();
        let err = file.read_pinned().await.unwrap_err();
        assert!(matches!(err, AppError::PatternNotFound { .. }));
    }

    #[tokio::test]
    async fn test_dropped_guard_restores_original() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hugo.yml");
        std::fs::write(&path, WORKFLOW).unwrap();
        let file = PinnedFile::new(&path, "HUGO_VERSION").unwrap();

        let kept = file.patch(&Version::new(0, 135, 0)).await.unwrap();
        kept.keep();
        assert_eq!(file.read_pinned().await.unwrap(), Version::new(0, 135, 0));

        let dropped = file.patch(&Version::new(0, 136, 0)).await.unwrap();
        drop(dropped);
        assert_eq!(file.read_pinned().await.unwrap(), Version::new(0, 135, 0));
    }

    #[tokio::test]
    async fn test_aborted_task_restores_original() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hugo.yml");
        std::fs::write(&path, WORKFLOW).unwrap();
        let file = PinnedFile::new(&path, "HUGO_VERSION").unwrap();

        let (patched_tx, patched_rx) = tokio::sync::oneshot::channel();
        let task_file = file.clone();
        let task = tokio::spawn(async move {
            let _guard = task_file.patch(&Version::new(0, 135, 0)).await.unwrap();
            patched_tx.send(()).unwrap();
            // Stands in for a build that never finishes
            std::future::pending::<()>().await;
        });

        patched_rx.await.unwrap();
        assert_eq!(file.read_pinned().await.unwrap(), Version::new(0, 135, 0));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), WORKFLOW);
    }
}
