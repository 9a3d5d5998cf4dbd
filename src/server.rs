use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::queue::TriggerQueue;
use crate::workflow::Pipeline;

pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Pipeline,
    pub queue: RwLock<TriggerQueue>,
    /// Held for the duration of a sync run.
    pub running: Mutex<()>,
    /// Cancelled at shutdown; background tasks stop picking up work.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub async fn new(config: AppConfig) -> crate::error::Result<Self> {
        let pipeline = Pipeline::from_config(&config).await?;
        Ok(Self::with_pipeline(config, pipeline))
    }

    pub fn with_pipeline(config: AppConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline,
            queue: RwLock::new(TriggerQueue::new()),
            running: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhooks/github", post(crate::webhook::handler::handle_webhook))
        .route("/trigger", post(crate::webhook::handler::handle_trigger))
        .route("/health", get(health_check))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

/// The persisted sync state as JSON.
async fn status(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.state_store().load().await {
        Ok(sync_state) => Json(sync_state).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load sync state");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;

    use super::*;
    use crate::build::{BuildReport, Verifier};
    use crate::error::{AppError, Result};
    use crate::pin::version::Version;
    use crate::platform::types::{CreatePullRequest, PullRequest};
    use crate::platform::Platform;
    use crate::upstream::types::Release;
    use crate::upstream::ReleaseSource;

    struct NoSource;

    #[async_trait]
    impl ReleaseSource for NoSource {
        async fn latest_release(&self) -> Result<Release> {
            Err(AppError::Upstream("no release source in this test".to_string()))
        }
    }

    struct NoVerifier;

    #[async_trait]
    impl Verifier for NoVerifier {
        async fn verify(&self, _version: &Version) -> Result<BuildReport> {
            Ok(BuildReport::Passed { steps: Vec::new() })
        }
    }

    struct NoPlatform;

    #[async_trait]
    impl Platform for NoPlatform {
        async fn access_token(&self) -> Result<Option<String>> {
            Ok(None)
        }

        async fn create_pull_request(&self, _: &str, _: &CreatePullRequest) -> Result<PullRequest> {
            Err(AppError::GitHubApi("no platform in this test".to_string()))
        }

        async fn add_label(&self, _: &str, _: u64, _: &str) -> Result<()> {
            Err(AppError::GitHubApi("no platform in this test".to_string()))
        }
    }

    /// State whose pipeline never reaches the network.
    pub(crate) fn app_state(config: AppConfig) -> Arc<AppState> {
        let pipeline = Pipeline::new(
            config.clone(),
            Arc::new(NoSource),
            Arc::new(NoVerifier),
            Arc::new(NoPlatform),
        )
        .unwrap();
        Arc::new(AppState::with_pipeline(config, pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::version::Version;
    use crate::state::{StateStore, SyncState};

    #[tokio::test]
    async fn test_status_returns_saved_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.state.dir = tmp.path().to_path_buf();

        let mut saved = SyncState::default();
        saved.record_verified(Version::new(0, 135, 0), "abc123".to_string(), chrono::Utc::now());
        StateStore::new(tmp.path()).save(&saved).await.unwrap();

        let response = status(State(testing::app_state(config))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let loaded: SyncState = serde_json::from_slice(&body).unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_status_on_malformed_state_is_server_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("state.json"), "{not json").unwrap();
        let mut config = AppConfig::default();
        config.state.dir = tmp.path().to_path_buf();

        let response = status(State(testing::app_state(config))).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
