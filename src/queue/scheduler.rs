use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::queue::task::Trigger;
use crate::server::AppState;

/// Enqueue a run every `schedule.interval_secs`, and once at startup if configured.
pub async fn run_scheduler(state: Arc<AppState>) {
    let schedule = &state.config.schedule;
    let period = Duration::from_secs(schedule.interval_secs.max(1));

    if schedule.run_on_startup {
        state.queue.write().await.enqueue(Trigger::Startup);
    }

    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = period.as_secs(), "Scheduler started");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = interval.tick() => {
                state.queue.write().await.enqueue(Trigger::Schedule);
            }
        }
    }

    tracing::info!("Scheduler stopped");
}
