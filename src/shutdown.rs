use std::sync::Arc;
use std::time::Duration;

use tokio::signal;

use crate::config::AppConfig;
use crate::server::AppState;

/// Build steps a run can spawn: install, submodules, build.
const BUILD_STEPS: u32 = 3;
/// Headroom for git work and the state write after the build.
const PUBLISH_MARGIN: Duration = Duration::from_secs(120);

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Upper bound on one sync run, used as the shutdown deadline.
pub fn grace_period(config: &AppConfig) -> Duration {
    let lookup = Duration::from_secs(config.upstream.timeout_secs)
        .saturating_add(crate::upstream::retry::MAX_DELAY)
        .saturating_mul(config.retry.attempts);
    let build = Duration::from_secs(config.build.step_timeout_secs).saturating_mul(BUILD_STEPS);
    lookup.saturating_add(build).saturating_add(PUBLISH_MARGIN)
}

/// Stop the background tasks, then let an in-flight sync run finish so the
/// pinned file and branch are left consistent.
pub async fn graceful_shutdown(state: &Arc<AppState>, timeout: Duration) {
    tracing::info!("Starting graceful shutdown...");
    state.shutdown.cancel();

    if state.running.try_lock().is_ok() {
        tracing::info!("No sync run in flight");
        return;
    }

    tracing::info!("Waiting for the in-flight sync run to finish");
    match tokio::time::timeout(timeout, state.running.lock()).await {
        Ok(_guard) => tracing::info!("Graceful shutdown complete"),
        Err(_) => tracing::warn!(
            timeout_secs = timeout.as_secs(),
            "Sync run still in flight at shutdown deadline"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::app_state;

    #[test]
    fn test_grace_period_covers_worst_case_run() {
        let mut config = AppConfig::default();
        config.build.step_timeout_secs = 600;
        config.upstream.timeout_secs = 30;
        config.retry.attempts = 3;

        let grace = grace_period(&config);
        assert!(grace >= Duration::from_secs(3 * 600 + 3 * 30));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_run() {
        let state = app_state(AppConfig::default());

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let run_state = Arc::clone(&state);
        let run = tokio::spawn(async move {
            let _running = run_state.running.lock().await;
            let _ = started_tx.send(());
            tokio::time::sleep(Duration::from_millis(100)).await;
        });
        started_rx.await.unwrap();

        let started = std::time::Instant::now();
        graceful_shutdown(&state, Duration::from_secs(5)).await;

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(run.is_finished() || state.running.try_lock().is_ok());
        assert!(state.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_stops_queue_processor_before_next_run() {
        let state = app_state(AppConfig::default());
        let processor = tokio::spawn(crate::queue::run_queue_processor(Arc::clone(&state)));

        graceful_shutdown(&state, Duration::from_secs(1)).await;
        tokio::time::timeout(Duration::from_secs(1), processor)
            .await
            .expect("processor should stop after shutdown")
            .unwrap();
    }
}
