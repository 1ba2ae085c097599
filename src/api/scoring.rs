use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::core::state::AppState;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::answer::{answer_to_response, AnswerResponse};
use crate::services::exam_scoring::{self, ScoringProgress};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/attempts/:attempt_id/progress", get(scoring_progress))
        .route("/answers/:answer_id/regrade", post(regrade_answer))
}

async fn scoring_progress(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ScoringProgress>, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))?;

    if user.role != UserRole::Admin && attempt.student_id != user.id {
        return Err(ApiError::Forbidden("Access denied"));
    }

    let progress = exam_scoring::scoring_progress(state.db(), &attempt.id).await?;
    Ok(Json(progress))
}

async fn regrade_answer(
    Path(answer_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let answer = exam_scoring::regrade_answer(state.db(), state.scoring(), &answer_id).await?;
    Ok(Json(answer_to_response(answer)))
}
