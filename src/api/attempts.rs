use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_student, CurrentAdmin, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{ExamAttempt, ViolationRecord};
use crate::db::types::{AttemptStatus, ExamStatus};
use crate::repositories;
use crate::schemas::attempt::{
    attempt_to_response, cheating_warning_response, AttemptResponse, AttemptStatsResponse,
    CheatingWarningResponse, CreateAttemptPayload, TimeRemainingResponse, ViolationPayload,
};
use crate::services::attempt_finalize::{finalize_attempt, FinalizeMode};
use crate::services::attempt_timing;
use crate::services::result_builder::GradingPolicy;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_attempt).get(list_attempts))
        .route("/current", get(current_attempt))
        .route("/stats", get(attempt_stats))
        .route("/:attempt_id", get(get_attempt))
        .route("/:attempt_id/pause", post(pause_attempt))
        .route("/:attempt_id/resume", post(resume_attempt))
        .route("/:attempt_id/submit", post(submit_attempt))
        .route("/:attempt_id/time-remaining", get(time_remaining))
        .route("/:attempt_id/violations", post(add_violation).get(get_violations))
        .route("/:attempt_id/disqualify", post(disqualify_attempt))
        .merge(crate::api::answers::router())
}

pub(crate) async fn fetch_attempt_for_student(
    pool: &sqlx::PgPool,
    attempt_id: &str,
    student_id: &str,
) -> Result<ExamAttempt, ApiError> {
    repositories::attempts::find_by_id_for_student(pool, attempt_id, student_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))
}

async fn create_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateAttemptPayload>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    require_student(&user)?;

    let exam = repositories::exams::find_by_id(state.db(), &payload.exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    if !matches!(exam.status, ExamStatus::Published | ExamStatus::Active) {
        return Err(ApiError::BadRequest("Exam is not available for attempts".to_string()));
    }

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    repositories::attempts::acquire_pair_lock(&mut *tx, &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to acquire attempt lock"))?;

    if let Some(existing) =
        repositories::attempts::find_by_student_exam(&mut *tx, &user.id, &exam.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
    {
        return Err(duplicate_attempt_error(existing.status));
    }

    let total_questions = repositories::questions::count_by_exam(&mut *tx, &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;

    let attempt_id = Uuid::new_v4().to_string();
    let now = primitive_now_utc();
    let inserted = repositories::attempts::create(
        &mut *tx,
        repositories::attempts::CreateAttempt {
            id: &attempt_id,
            student_id: &user.id,
            exam_id: &exam.id,
            total_questions: total_questions.min(i32::MAX as i64) as i32,
            max_cheating_warnings: state.settings().exam().max_cheating_warnings as i32,
            started_at: now,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create attempt"))?;

    if !inserted {
        let existing = repositories::attempts::find_by_student_exam(&mut *tx, &user.id, &exam.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
            .ok_or_else(|| {
                ApiError::Conflict("Student already has an attempt for this exam".to_string())
            })?;
        return Err(duplicate_attempt_error(existing.status));
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    let attempt = repositories::attempts::find_by_id(state.db(), &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::Internal("Attempt missing after create".to_string()))?;

    Ok((StatusCode::CREATED, Json(attempt_to_response(attempt))))
}

fn duplicate_attempt_error(status: AttemptStatus) -> ApiError {
    if status == AttemptStatus::Submitted {
        ApiError::Conflict(
            "Student has already submitted this exam and cannot retake it".to_string(),
        )
    } else {
        ApiError::Conflict("Student already has an attempt for this exam".to_string())
    }
}

async fn list_attempts(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttemptResponse>>, ApiError> {
    let attempts = repositories::attempts::list_by_student(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;

    Ok(Json(attempts.into_iter().map(attempt_to_response).collect()))
}

#[derive(Debug, Deserialize)]
struct CurrentAttemptQuery {
    exam_id: String,
}

async fn current_attempt(
    Query(query): Query<CurrentAttemptQuery>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Option<AttemptResponse>>, ApiError> {
    let attempt =
        repositories::attempts::find_active_for_exam(state.db(), &user.id, &query.exam_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?;

    Ok(Json(attempt.map(attempt_to_response)))
}

async fn attempt_stats(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptStatsResponse>, ApiError> {
    let attempts = repositories::attempts::list_by_student(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;

    let completed: Vec<&ExamAttempt> =
        attempts.iter().filter(|attempt| attempt.status == AttemptStatus::Submitted).collect();
    let average_score = if completed.is_empty() {
        0.0
    } else {
        completed.iter().map(|attempt| attempt.score).sum::<f64>() / completed.len() as f64
    };

    Ok(Json(AttemptStatsResponse {
        total_attempts: attempts.len(),
        completed_attempts: completed.len(),
        in_progress_attempts: attempts
            .iter()
            .filter(|attempt| attempt.status == AttemptStatus::InProgress)
            .count(),
        paused_attempts: attempts
            .iter()
            .filter(|attempt| attempt.status == AttemptStatus::Paused)
            .count(),
        average_score,
        total_time_spent: attempts.iter().map(|attempt| i64::from(attempt.time_spent)).sum(),
    }))
}

async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;
    Ok(Json(attempt_to_response(attempt)))
}

async fn pause_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;

    if attempt.status != AttemptStatus::InProgress {
        return Err(ApiError::BadRequest("Only in-progress attempts can be paused".to_string()));
    }

    let now = primitive_now_utc();
    let time_spent = attempt_timing::finalized_time_spent(
        attempt.status,
        attempt.time_spent,
        attempt.started_at,
        now,
    );

    let paused = repositories::attempts::mark_paused(state.db(), &attempt.id, time_spent, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to pause attempt"))?;

    if !paused {
        return Err(ApiError::BadRequest("Only in-progress attempts can be paused".to_string()));
    }

    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;
    Ok(Json(attempt_to_response(attempt)))
}

async fn resume_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;

    if attempt.status != AttemptStatus::Paused {
        return Err(ApiError::BadRequest("Only paused attempts can be resumed".to_string()));
    }

    let resumed = repositories::attempts::mark_resumed(state.db(), &attempt.id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resume attempt"))?;

    if !resumed {
        return Err(ApiError::BadRequest("Only paused attempts can be resumed".to_string()));
    }

    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;
    Ok(Json(attempt_to_response(attempt)))
}

async fn submit_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;

    if attempt.status == AttemptStatus::Submitted {
        return Err(ApiError::Conflict("Attempt already submitted".to_string()));
    }
    if attempt.status.is_terminal() {
        return Err(ApiError::Conflict("Attempt is already terminal".to_string()));
    }

    let policy = GradingPolicy::from_settings(state.settings());
    let attempt = finalize_attempt(
        state.db(),
        state.scoring(),
        &policy,
        &attempt,
        FinalizeMode::ManualSubmit,
        primitive_now_utc(),
    )
    .await?;

    Ok(Json(attempt_to_response(attempt)))
}

async fn time_remaining(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<TimeRemainingResponse>, ApiError> {
    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;

    let exam = repositories::exams::find_by_id(state.db(), &attempt.exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    let now = primitive_now_utc();
    let remaining = attempt_timing::remaining_seconds(
        attempt.status,
        exam.duration_minutes,
        attempt.time_spent,
        attempt.started_at,
        now,
    );

    if remaining == 0 && attempt.status == AttemptStatus::InProgress {
        let policy = GradingPolicy::from_settings(state.settings());
        let attempt = finalize_attempt(
            state.db(),
            state.scoring(),
            &policy,
            &attempt,
            FinalizeMode::AutoTimeout,
            now,
        )
        .await?;

        return Ok(Json(TimeRemainingResponse { remaining_seconds: 0, status: attempt.status }));
    }

    Ok(Json(TimeRemainingResponse { remaining_seconds: remaining, status: attempt.status }))
}

async fn add_violation(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ViolationPayload>,
) -> Result<Json<CheatingWarningResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;

    if attempt.status.is_terminal() {
        return Err(ApiError::Conflict("Cannot add violations to a terminal attempt".to_string()));
    }

    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().to_string());
    let mut violations = attempt.violations.0.clone();
    violations.push(ViolationRecord {
        violation_type: payload.violation_type,
        description: payload.description,
        timestamp,
        metadata: payload.metadata.unwrap_or_else(|| serde_json::json!({})),
    });

    let recorded = repositories::attempts::record_violations(
        state.db(),
        &attempt.id,
        &violations,
        attempt.cheating_warnings + 1,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record violation"))?;

    if !recorded {
        return Err(ApiError::Conflict("Cannot add violations to a terminal attempt".to_string()));
    }

    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;
    Ok(Json(cheating_warning_response(&attempt)))
}

async fn get_violations(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<CheatingWarningResponse>, ApiError> {
    let attempt = fetch_attempt_for_student(state.db(), &attempt_id, &user.id).await?;
    Ok(Json(cheating_warning_response(&attempt)))
}

async fn disqualify_attempt(
    Path(attempt_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), &attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))?;

    if attempt.status.is_terminal() {
        return Err(ApiError::Conflict("Attempt is already terminal".to_string()));
    }

    let policy = GradingPolicy::from_settings(state.settings());
    let attempt = finalize_attempt(
        state.db(),
        state.scoring(),
        &policy,
        &attempt,
        FinalizeMode::Disqualified,
        primitive_now_utc(),
    )
    .await?;

    Ok(Json(attempt_to_response(attempt)))
}
