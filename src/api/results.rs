use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::result::{exam_stats, result_to_response, ExamStatsResponse, ResultResponse};
use crate::services::result_builder::{self, GradingPolicy};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_my_results))
        .route("/attempts/:attempt_id", post(generate_result).get(get_result))
        .route("/exams/:exam_id", get(list_exam_results))
        .route("/exams/:exam_id/stats", get(exam_result_stats))
        .route("/:result_id/publish", post(publish_result))
}

async fn list_my_results(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ResultResponse>>, ApiError> {
    let results = repositories::results::list_by_student(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list results"))?;

    Ok(Json(results.into_iter().map(|result| result_to_response(result, None)).collect()))
}

/// Idempotent: repeated calls return the already-persisted Result.
async fn generate_result(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ResultResponse>, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))?;

    if user.role != UserRole::Admin && attempt.student_id != user.id {
        return Err(ApiError::Forbidden("Access denied"));
    }

    let policy = GradingPolicy::from_settings(state.settings());
    let result =
        result_builder::generate_result(state.db(), state.scoring(), &policy, &attempt.id).await?;

    let breakdown = result_builder::question_breakdown(state.db(), &attempt.id).await?;

    Ok(Json(result_to_response(result, Some(breakdown))))
}

async fn get_result(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ResultResponse>, ApiError> {
    let result = repositories::results::find_by_attempt(state.db(), &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch result"))?
        .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))?;

    if user.role != UserRole::Admin {
        if result.student_id != user.id {
            return Err(ApiError::Forbidden("Access denied"));
        }
        if !result.is_published {
            return Err(ApiError::NotFound("Result not found".to_string()));
        }
    }

    let breakdown = result_builder::question_breakdown(state.db(), &attempt_id).await?;

    Ok(Json(result_to_response(result, Some(breakdown))))
}

async fn list_exam_results(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ResultResponse>>, ApiError> {
    let published_only = user.role != UserRole::Admin;
    let results = repositories::results::list_by_exam(state.db(), &exam_id, published_only)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list results"))?;

    Ok(Json(results.into_iter().map(|result| result_to_response(result, None)).collect()))
}

async fn exam_result_stats(
    Path(exam_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ExamStatsResponse>, ApiError> {
    let results = repositories::results::list_by_exam(state.db(), &exam_id, false)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list results"))?;

    Ok(Json(exam_stats(&results)))
}

async fn publish_result(
    Path(result_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ResultResponse>, ApiError> {
    let published =
        repositories::results::publish(state.db(), &result_id, primitive_now_utc())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to publish result"))?;

    if !published {
        return Err(ApiError::NotFound("Result not found".to_string()));
    }

    let result = repositories::results::find_by_id(state.db(), &result_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch result"))?
        .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))?;

    Ok(Json(result_to_response(result, None)))
}
