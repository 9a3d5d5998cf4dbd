use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::pin::version::{normalize_tag, Version};
use crate::queue::task::Trigger;
use crate::server::AppState;
use crate::webhook::events::{ReleaseEvent, WebhookEvent};
use crate::webhook::signature::verify_signature;

/// Check the signature header against the configured secret.
///
/// Without a secret nothing can be verified, so every request is refused.
fn verify_request(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), StatusCode> {
    let Some(secret) = state.config.webhook_secret() else {
        tracing::warn!("Rejecting request: server.webhook_secret is not configured");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let signature = match headers.get("x-hub-signature-256").and_then(|v| v.to_str().ok()) {
        Some(sig) => sig,
        None => {
            tracing::warn!("Missing X-Hub-Signature-256 header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    if let Err(e) = verify_signature(secret, body, signature) {
        tracing::warn!(error = %e, "Signature verification failed");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(())
}

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Err(status) = verify_request(&state, &headers, &body) {
        return status;
    }

    let event_type = match headers.get("x-github-event").and_then(|v| v.to_str().ok()) {
        Some(et) => et.to_string(),
        None => {
            tracing::warn!("Missing X-GitHub-Event header");
            return StatusCode::BAD_REQUEST;
        }
    };

    let event = match WebhookEvent::parse(&event_type, &body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, event_type = %event_type, "Failed to parse webhook event");
            return StatusCode::BAD_REQUEST;
        }
    };

    tracing::info!(event_type = %event_type, "Received webhook event");

    match event {
        WebhookEvent::Release(release_event) => handle_release_event(&state, release_event).await,
        WebhookEvent::Ping => {
            tracing::info!("Received ping event");
            StatusCode::OK
        }
        WebhookEvent::Unsupported(event_type) => {
            tracing::debug!(event_type = %event_type, "Ignoring unsupported event");
            StatusCode::OK
        }
    }
}

async fn handle_release_event(state: &AppState, event: ReleaseEvent) -> StatusCode {
    if !event.is_publication() {
        return StatusCode::OK;
    }

    let upstream = &state.config.upstream;
    if !event.repository.full_name.eq_ignore_ascii_case(&upstream.repo) {
        tracing::debug!(
            repo = %event.repository.full_name,
            "Ignoring release from a repository other than the upstream"
        );
        return StatusCode::OK;
    }

    if event.release.draft || (event.release.prerelease && !upstream.allow_prerelease) {
        tracing::debug!(tag = %event.release.tag_name, "Ignoring draft or pre-release");
        return StatusCode::OK;
    }

    if normalize_tag(&event.release.tag_name)
        .and_then(|tag| tag.parse::<Version>())
        .is_err()
    {
        tracing::warn!(tag = %event.release.tag_name, "Ignoring release with unparseable tag");
        return StatusCode::OK;
    }

    tracing::info!(
        repo = %event.repository.full_name,
        tag = %event.release.tag_name,
        url = event.release.html_url.as_deref().unwrap_or_default(),
        "Upstream release published, enqueuing sync run"
    );

    state.queue.write().await.enqueue(Trigger::Release {
        tag: event.release.tag_name,
    });

    StatusCode::ACCEPTED
}

/// `POST /trigger`: signed manual dispatch. The body is only used for the signature.
pub async fn handle_trigger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Err(status) = verify_request(&state, &headers, &body) {
        return status;
    }

    state.queue.write().await.enqueue(Trigger::Manual);
    StatusCode::ACCEPTED
}
