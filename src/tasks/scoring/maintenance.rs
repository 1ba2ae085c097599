use anyhow::{Context, Result};

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::services::attempt_finalize::{finalize_attempt, FinalizeError, FinalizeMode};
use crate::services::result_builder::GradingPolicy;

const EXPIRE_BATCH_SIZE: i64 = 50;

/// Times out in-progress attempts whose clock ran out without the client
/// ever calling the time-remaining endpoint.
pub(crate) async fn close_expired_attempts(state: &AppState) -> Result<usize> {
    let now = primitive_now_utc();
    let grace = state.settings().exam().submit_grace_seconds;
    let expired =
        repositories::attempts::list_expired_in_progress(state.db(), now, grace, EXPIRE_BATCH_SIZE)
            .await
            .context("Failed to list expired attempts")?;

    let policy = GradingPolicy::from_settings(state.settings());
    let mut closed = 0;

    for attempt_id in expired {
        let Some(attempt) = repositories::attempts::find_by_id(state.db(), &attempt_id)
            .await
            .context("Failed to fetch expired attempt")?
        else {
            continue;
        };

        match finalize_attempt(
            state.db(),
            state.scoring(),
            &policy,
            &attempt,
            FinalizeMode::AutoTimeout,
            primitive_now_utc(),
        )
        .await
        {
            Ok(_) => {
                closed += 1;
                tracing::info!(attempt_id = %attempt.id, "Attempt timed out");
            }
            // A submit won the race; nothing to do.
            Err(FinalizeError::AlreadySubmitted | FinalizeError::AttemptTerminal) => {}
            Err(err) => {
                tracing::error!(attempt_id = %attempt.id, error = %err, "Failed to time out attempt");
            }
        }
    }

    Ok(closed)
}
