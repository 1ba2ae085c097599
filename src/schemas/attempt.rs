use serde::{Deserialize, Serialize};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{ExamAttempt, ViolationRecord};
use crate::db::types::AttemptStatus;
use crate::services::attempt_timing;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CreateAttemptPayload {
    #[validate(length(min = 1))]
    pub(crate) exam_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: Option<String>,
    pub(crate) paused_at: Option<String>,
    pub(crate) resumed_at: Option<String>,
    pub(crate) submitted_at: Option<String>,
    pub(crate) time_spent: i32,
    pub(crate) questions_answered: i32,
    pub(crate) total_questions: i32,
    pub(crate) score: f64,
    pub(crate) total_marks: f64,
    pub(crate) percentage: f64,
    pub(crate) is_graded: bool,
    pub(crate) cheating_warnings: i32,
    pub(crate) max_cheating_warnings: i32,
}

pub(crate) fn attempt_to_response(attempt: ExamAttempt) -> AttemptResponse {
    AttemptResponse {
        id: attempt.id,
        exam_id: attempt.exam_id,
        student_id: attempt.student_id,
        status: attempt.status,
        started_at: attempt.started_at.map(format_primitive),
        paused_at: attempt.paused_at.map(format_primitive),
        resumed_at: attempt.resumed_at.map(format_primitive),
        submitted_at: attempt.submitted_at.map(format_primitive),
        time_spent: attempt.time_spent,
        questions_answered: attempt.questions_answered,
        total_questions: attempt.total_questions,
        score: attempt.score,
        total_marks: attempt.total_marks,
        percentage: attempt.percentage,
        is_graded: attempt.is_graded,
        cheating_warnings: attempt.cheating_warnings,
        max_cheating_warnings: attempt.max_cheating_warnings,
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ViolationPayload {
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 64))]
    pub(crate) violation_type: String,
    #[validate(length(min = 1, max = 500))]
    pub(crate) description: String,
    pub(crate) metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CheatingWarningResponse {
    pub(crate) warning_count: i32,
    pub(crate) max_warnings: i32,
    pub(crate) remaining_warnings: i32,
    pub(crate) should_auto_submit: bool,
    pub(crate) violations: Vec<ViolationRecord>,
}

pub(crate) fn cheating_warning_response(attempt: &ExamAttempt) -> CheatingWarningResponse {
    CheatingWarningResponse {
        warning_count: attempt.cheating_warnings,
        max_warnings: attempt.max_cheating_warnings,
        remaining_warnings: attempt_timing::remaining_warnings(
            attempt.cheating_warnings,
            attempt.max_cheating_warnings,
        ),
        should_auto_submit: attempt_timing::should_auto_submit(
            attempt.cheating_warnings,
            attempt.max_cheating_warnings,
        ),
        violations: attempt.violations.0.clone(),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TimeRemainingResponse {
    pub(crate) remaining_seconds: i64,
    pub(crate) status: AttemptStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptStatsResponse {
    pub(crate) total_attempts: usize,
    pub(crate) completed_attempts: usize,
    pub(crate) in_progress_attempts: usize,
    pub(crate) paused_attempts: usize,
    pub(crate) average_score: f64,
    pub(crate) total_time_spent: i64,
}
