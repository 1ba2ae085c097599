use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::core::state::AppState;
use crate::tasks::scoring;

const SCORING_WORKER_CONCURRENCY: usize = 2;
const IDLE_POLL_SECONDS: u64 = 2;
const EXPIRE_SWEEP_SECONDS: u64 = 30;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(SCORING_WORKER_CONCURRENCY + 1);

    for _ in 0..SCORING_WORKER_CONCURRENCY {
        handles.push(tokio::spawn(scoring_worker(state.clone(), shutdown_rx.clone())));
    }
    handles.push(tokio::spawn(expire_attempts_loop(state.clone(), shutdown_rx.clone())));

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn scoring_worker(state: AppState, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match scoring::claim_next_ungraded_attempt(state.db()).await {
            Ok(Some(attempt_id)) => {
                if let Err(err) = scoring::process_attempt(&state, &attempt_id).await {
                    tracing::error!(attempt_id, error = %err, "Failed to score claimed attempt");
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(error = %err, "Failed to claim attempt for scoring"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(Duration::from_secs(IDLE_POLL_SECONDS)) => {}
        }
    }
}

async fn expire_attempts_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match scoring::close_expired_attempts(&state).await {
            Ok(closed) if closed > 0 => {
                tracing::info!(closed, "Expired attempts timed out");
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "Failed to close expired attempts"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(Duration::from_secs(EXPIRE_SWEEP_SECONDS)) => {}
        }
    }
}
