pub mod scheduler;
pub mod task;

use std::sync::Arc;

use crate::error::AppError;
use crate::server::AppState;
use crate::workflow::RunOptions;

use task::Trigger;

/// Coalescing trigger queue.
///
/// Holds at most one pending trigger: requests that arrive while one is
/// already pending fold into it, so a burst of triggers during a run yields
/// a single follow-up run.
pub struct TriggerQueue {
    pending: Option<Trigger>,
    /// Notification channel for the processor.
    notify: Option<tokio::sync::mpsc::UnboundedSender<()>>,
}

impl Default for TriggerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self {
            pending: None,
            notify: None,
        }
    }

    pub fn set_notifier(&mut self, tx: tokio::sync::mpsc::UnboundedSender<()>) {
        self.notify = Some(tx);
    }

    /// Returns false when the trigger was folded into an already pending one.
    pub fn enqueue(&mut self, trigger: Trigger) -> bool {
        if let Some(pending) = &self.pending {
            tracing::debug!(
                trigger = %trigger.description(),
                pending = %pending.description(),
                "Run already pending, coalescing trigger"
            );
            return false;
        }

        tracing::info!(trigger = %trigger.description(), "Enqueuing sync run");
        self.pending = Some(trigger);

        if let Some(ref tx) = self.notify {
            let _ = tx.send(());
        }
        true
    }

    pub fn take_next(&mut self) -> Option<Trigger> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Run the background queue processor until shutdown.
///
/// Runs never overlap within the process. `running` is taken before a
/// trigger is dequeued, so once shutdown is signalled no new run starts.
pub async fn run_queue_processor(state: Arc<AppState>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    {
        let mut queue = state.queue.write().await;
        // Anything enqueued before the processor started is still pending.
        if queue.is_pending() {
            let _ = tx.send(());
        }
        queue.set_notifier(tx);
    }

    tracing::info!("Queue processor started");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            message = rx.recv() => {
                if message.is_none() {
                    break;
                }
            }
        }

        loop {
            let _running = state.running.lock().await;
            if state.shutdown.is_cancelled() {
                break;
            }

            let trigger = {
                let mut queue = state.queue.write().await;
                queue.take_next()
            };

            let Some(trigger) = trigger else {
                break;
            };

            tracing::info!(trigger = %trigger.description(), "Starting sync run");

            match state.pipeline.run(RunOptions::default()).await {
                Ok(outcome) if outcome.is_success() => {
                    tracing::info!(
                        trigger = %trigger.description(),
                        outcome = %outcome,
                        "Sync run completed"
                    );
                }
                Ok(outcome) => {
                    tracing::error!(
                        trigger = %trigger.description(),
                        outcome = %outcome,
                        "Sync run failed build verification"
                    );
                }
                Err(AppError::Locked(branch)) => {
                    tracing::info!(
                        trigger = %trigger.description(),
                        branch = %branch,
                        "Another process holds the branch lock, skipping run"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        trigger = %trigger.description(),
                        error = %e,
                        "Sync run failed"
                    );
                }
            }
        }
    }

    tracing::info!("Queue processor stopped");
}
