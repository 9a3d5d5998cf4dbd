pub mod github;
pub mod retry;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::Release;

pub use github::GitHubReleases;

/// Where the latest published release of the pinned tool comes from.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_release(&self) -> Result<Release>;
}
