use axum::{
    extract::{Path, State},
    routing::put,
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::attempts::fetch_attempt_for_student;
use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::AttemptStatus;
use crate::repositories;
use crate::schemas::answer::{answer_to_response, AnswerResponse, SaveAnswerPayload};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:attempt_id/answers", put(save_answer).get(list_answers))
}

/// Upserts one answer for an in-progress attempt. Clients autosave on every
/// edit, so the write is rate-limited per (attempt, question).
async fn save_answer(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswerPayload>,
) -> Result<Json<AnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;

    if attempt.status != AttemptStatus::InProgress {
        return Err(ApiError::BadRequest(
            "Cannot submit answers to inactive attempt".to_string(),
        ));
    }

    let interval = state.settings().exam().answer_save_interval_seconds.max(1);
    let rate_key = format!("answersave:{}:{}", attempt.id, payload.question_id);
    let allowed = match state.redis().rate_limit(&rate_key, 1, interval).await {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(error = %err, "Failed to check answer save rate limit");
            true
        }
    };
    if !allowed {
        return Err(ApiError::TooManyRequests("Answer save rate limit exceeded"));
    }

    let question = repositories::questions::find_by_id(state.db(), &payload.question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    let in_exam =
        repositories::questions::belongs_to_exam(state.db(), &question.id, &attempt.exam_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to verify question"))?;
    if !in_exam {
        return Err(ApiError::BadRequest(
            "Question does not belong to the same exam".to_string(),
        ));
    }

    let answer = repositories::answers::upsert(
        state.db(),
        repositories::answers::UpsertAnswer {
            id: &Uuid::new_v4().to_string(),
            attempt_id: &attempt.id,
            student_id: &user.id,
            question_id: &question.id,
            answer_text: payload.answer_text.as_deref(),
            selected_options: payload.selected_options.as_deref(),
            max_score: question.marks,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to save answer"))?;

    let answered = repositories::answers::count_by_attempt(state.db(), &attempt.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count answers"))?;
    repositories::attempts::update_questions_answered(
        state.db(),
        &attempt.id,
        answered.min(i32::MAX as i64) as i32,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update attempt progress"))?;

    Ok(Json(answer_to_response(answer)))
}

async fn list_answers(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AnswerResponse>>, ApiError> {
    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;

    let answers = repositories::answers::list_by_attempt(state.db(), &attempt.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list answers"))?;

    Ok(Json(answers.into_iter().map(answer_to_response).collect()))
}
