use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::ExamAttempt;
use crate::db::types::AttemptStatus;
use crate::repositories;
use crate::services::attempt_timing;
use crate::services::exam_scoring;
use crate::services::result_builder::{self, GradingPolicy};
use crate::services::similarity_scoring::SimilarityScorer;

#[derive(Debug, Clone, Copy)]
pub(crate) enum FinalizeMode {
    ManualSubmit,
    AutoTimeout,
    Disqualified,
}

impl FinalizeMode {
    fn terminal_status(self) -> AttemptStatus {
        match self {
            Self::ManualSubmit => AttemptStatus::Submitted,
            Self::AutoTimeout => AttemptStatus::TimedOut,
            Self::Disqualified => AttemptStatus::Disqualified,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum FinalizeError {
    #[error("Exam attempt not found")]
    NotFound,
    #[error("Attempt already submitted")]
    AlreadySubmitted,
    #[error("Attempt is already terminal")]
    AttemptTerminal,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Moves an attempt to a terminal state and triggers the one-time scoring
/// and result generation. The transition commits first and is never rolled
/// back: a scoring failure leaves the attempt terminal-but-ungraded for
/// the background worker to retry.
pub(crate) async fn finalize_attempt(
    pool: &PgPool,
    scorer: &SimilarityScorer,
    policy: &GradingPolicy,
    attempt: &ExamAttempt,
    mode: FinalizeMode,
    now: PrimitiveDateTime,
) -> Result<ExamAttempt, FinalizeError> {
    let time_spent = attempt_timing::finalized_time_spent(
        attempt.status,
        attempt.time_spent,
        attempt.started_at,
        now,
    );

    let transitioned = repositories::attempts::mark_terminal(
        pool,
        &attempt.id,
        mode.terminal_status(),
        time_spent,
        now,
    )
    .await?;

    if !transitioned {
        // Lost the race (or the caller raced a timeout): report terminal
        // state for explicit submits, succeed quietly for automatic ones.
        let current = repositories::attempts::find_by_id(pool, &attempt.id)
            .await?
            .ok_or(FinalizeError::NotFound)?;

        if !current.status.is_terminal() {
            return Err(FinalizeError::AttemptTerminal);
        }

        match mode {
            FinalizeMode::ManualSubmit if current.status == AttemptStatus::Submitted => {
                return Err(FinalizeError::AlreadySubmitted)
            }
            FinalizeMode::ManualSubmit => return Err(FinalizeError::AttemptTerminal),
            FinalizeMode::AutoTimeout | FinalizeMode::Disqualified => return Ok(current),
        }
    }

    trigger_automatic_scoring(pool, scorer, policy, &attempt.id).await;

    repositories::attempts::find_by_id(pool, &attempt.id)
        .await?
        .ok_or(FinalizeError::NotFound)
}

/// Scoring after a successful terminal transition is best-effort here; the
/// submission is already durable and user-visible, so failures are logged
/// and retried out-of-band.
pub(crate) async fn trigger_automatic_scoring(
    pool: &PgPool,
    scorer: &SimilarityScorer,
    policy: &GradingPolicy,
    attempt_id: &str,
) {
    if let Err(err) =
        exam_scoring::score_attempt(pool, scorer, attempt_id, policy.count_unanswered_in_total)
            .await
    {
        metrics::counter!("scoring_jobs_total", "status" => "failed").increment(1);
        tracing::error!(attempt_id, error = %err, "Automatic scoring failed after submission");
        return;
    }

    if let Err(err) = result_builder::generate_result(pool, scorer, policy, attempt_id).await {
        tracing::error!(attempt_id, error = %err, "Result generation failed after scoring");
    }
}
