use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{ExamAttempt, ViolationRecord};
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, student_id, exam_id, status, started_at, paused_at, resumed_at, submitted_at, \
    time_spent, questions_answered, total_questions, score, total_marks, percentage, \
    is_graded, scoring_started_at, cheating_warnings, max_cheating_warnings, violations, \
    created_at, updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) total_questions: i32,
    pub(crate) max_cheating_warnings: i32,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Serializes concurrent attempt creation for one (exam, student) pair
/// within the surrounding transaction.
pub(crate) async fn acquire_pair_lock(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("attempt:{exam_id}:{student_id}"))
        .execute(executor)
        .await?;
    Ok(())
}

/// Serializes the terminal-transition/scoring/result critical section for
/// one attempt within the surrounding transaction.
pub(crate) async fn acquire_attempt_lock(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("attempt-scoring:{attempt_id}"))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: CreateAttempt<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exam_attempts (
            id, student_id, exam_id, status, started_at, total_questions,
            max_cheating_warnings, violations, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        ON CONFLICT DO NOTHING",
    )
    .bind(attempt.id)
    .bind(attempt.student_id)
    .bind(attempt.exam_id)
    .bind(AttemptStatus::InProgress)
    .bind(attempt.started_at)
    .bind(attempt.total_questions)
    .bind(attempt.max_cheating_warnings)
    .bind(Json(Vec::<ViolationRecord>::new()))
    .bind(attempt.created_at)
    .bind(attempt.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_id_for_student(
    pool: &PgPool,
    id: &str,
    student_id: &str,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts WHERE id = $1 AND student_id = $2"
    ))
    .bind(id)
    .bind(student_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_by_student_exam(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: &str,
    exam_id: &str,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts WHERE student_id = $1 AND exam_id = $2"
    ))
    .bind(student_id)
    .bind(exam_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts WHERE student_id = $1 ORDER BY created_at DESC"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_active_for_exam(
    pool: &PgPool,
    student_id: &str,
    exam_id: &str,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts \
         WHERE student_id = $1 AND exam_id = $2 AND status = $3"
    ))
    .bind(student_id)
    .bind(exam_id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(pool)
    .await
}

/// Compare-and-set pause; false when the attempt was not in progress.
pub(crate) async fn mark_paused(
    pool: &PgPool,
    id: &str,
    time_spent: i32,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_attempts
         SET status = $1, paused_at = $2, time_spent = $3, updated_at = $2
         WHERE id = $4 AND status = $5",
    )
    .bind(AttemptStatus::Paused)
    .bind(now)
    .bind(time_spent)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Compare-and-set resume; restarts the wall clock at `now`.
pub(crate) async fn mark_resumed(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_attempts
         SET status = $1, resumed_at = $2, started_at = $2, updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(AttemptStatus::InProgress)
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::Paused)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Compare-and-set terminal transition from any non-terminal state; the
/// returned flag distinguishes the winner of two racing finalizations.
pub(crate) async fn mark_terminal(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    status: AttemptStatus,
    time_spent: i32,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_attempts
         SET status = $1, submitted_at = $2, time_spent = $3, updated_at = $2
         WHERE id = $4 AND status IN ($5, $6)",
    )
    .bind(status)
    .bind(now)
    .bind(time_spent)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .bind(AttemptStatus::Paused)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn record_violations(
    pool: &PgPool,
    id: &str,
    violations: &[ViolationRecord],
    cheating_warnings: i32,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_attempts
         SET violations = $1, cheating_warnings = $2, updated_at = $3
         WHERE id = $4 AND status IN ($5, $6)",
    )
    .bind(Json(violations))
    .bind(cheating_warnings)
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .bind(AttemptStatus::Paused)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_questions_answered(
    pool: &PgPool,
    id: &str,
    questions_answered: i32,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_attempts SET questions_answered = $1, updated_at = $2 WHERE id = $3",
    )
    .bind(questions_answered)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// One-time aggregate write at the end of scoring.
pub(crate) async fn write_aggregate(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: f64,
    total_marks: f64,
    percentage: f64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_attempts
         SET score = $1, total_marks = $2, percentage = $3, is_graded = TRUE, updated_at = $4
         WHERE id = $5",
    )
    .bind(score)
    .bind(total_marks)
    .bind(percentage)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Claims one terminal-but-ungraded attempt for the background scorer.
pub(crate) async fn claim_next_ungraded(
    pool: &PgPool,
    retry_after_seconds: i64,
    now: PrimitiveDateTime,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "WITH candidate AS (
            SELECT id
            FROM exam_attempts
            WHERE status IN ($1, $2, $3)
              AND is_graded = FALSE
              AND (scoring_started_at IS NULL
                   OR scoring_started_at < $4 - make_interval(secs => $5))
            ORDER BY submitted_at NULLS FIRST
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE exam_attempts
        SET scoring_started_at = $4
        FROM candidate
        WHERE exam_attempts.id = candidate.id
        RETURNING exam_attempts.id",
    )
    .bind(AttemptStatus::Submitted)
    .bind(AttemptStatus::TimedOut)
    .bind(AttemptStatus::Disqualified)
    .bind(now)
    .bind(retry_after_seconds as f64)
    .fetch_optional(pool)
    .await
}

/// In-progress attempts whose exam clock ran out more than `grace_seconds`
/// ago, leaving room for a just-in-time submit to win.
pub(crate) async fn list_expired_in_progress(
    pool: &PgPool,
    now: PrimitiveDateTime,
    grace_seconds: i64,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT a.id
         FROM exam_attempts a
         JOIN exams e ON e.id = a.exam_id
         WHERE a.status = $1
           AND a.started_at IS NOT NULL
           AND EXTRACT(EPOCH FROM ($2::timestamp - a.started_at)) + a.time_spent
               >= e.duration_minutes * 60 + $3
         LIMIT $4",
    )
    .bind(AttemptStatus::InProgress)
    .bind(now)
    .bind(grace_seconds as f64)
    .bind(limit)
    .fetch_all(pool)
    .await
}
