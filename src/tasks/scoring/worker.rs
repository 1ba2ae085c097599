use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::services::exam_scoring;
use crate::services::result_builder::{self, GradingPolicy};

/// A claim older than this is assumed to belong to a crashed scorer and
/// becomes claimable again.
const SCORING_RETRY_SECONDS: i64 = 300;

pub(crate) async fn claim_next_ungraded_attempt(pool: &PgPool) -> Result<Option<String>> {
    repositories::attempts::claim_next_ungraded(pool, SCORING_RETRY_SECONDS, primitive_now_utc())
        .await
        .context("Failed to claim attempt for scoring")
}

/// Out-of-band scoring retry: scores a terminal attempt that submission-time
/// scoring missed (crash, provider outage, process restart) and derives its
/// Result. Both steps are idempotent, so racing the API path is harmless.
pub(crate) async fn process_attempt(state: &AppState, attempt_id: &str) -> Result<()> {
    let policy = GradingPolicy::from_settings(state.settings());

    exam_scoring::score_attempt(
        state.db(),
        state.scoring(),
        attempt_id,
        policy.count_unanswered_in_total,
    )
    .await
    .context("Failed to score attempt")?;

    result_builder::generate_result(state.db(), state.scoring(), &policy, attempt_id)
        .await
        .context("Failed to generate result")?;

    tracing::info!(attempt_id, "Background scoring completed");

    Ok(())
}
