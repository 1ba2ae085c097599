use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Answer;

pub(crate) const COLUMNS: &str = "\
    id, attempt_id, student_id, question_id, answer_text, selected_options, \
    is_correct, score, max_score, is_graded, feedback, created_at, updated_at";

pub(crate) struct UpsertAnswer<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) answer_text: Option<&'a str>,
    pub(crate) selected_options: Option<&'a [String]>,
    pub(crate) max_score: f64,
    pub(crate) now: PrimitiveDateTime,
}

/// Insert-or-update on (attempt_id, question_id). The max_score snapshot
/// taken at first insert is never overwritten.
pub(crate) async fn upsert(
    pool: &PgPool,
    answer: UpsertAnswer<'_>,
) -> Result<Answer, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "INSERT INTO answers (
            id, attempt_id, student_id, question_id, answer_text, selected_options,
            max_score, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$8)
        ON CONFLICT (attempt_id, question_id) DO UPDATE
        SET answer_text = EXCLUDED.answer_text,
            selected_options = EXCLUDED.selected_options,
            updated_at = EXCLUDED.updated_at
        RETURNING {COLUMNS}"
    ))
    .bind(answer.id)
    .bind(answer.attempt_id)
    .bind(answer.student_id)
    .bind(answer.question_id)
    .bind(answer.answer_text)
    .bind(answer.selected_options.map(Json))
    .bind(answer.max_score)
    .bind(answer.now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!("SELECT {COLUMNS} FROM answers WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_by_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "SELECT {COLUMNS} FROM answers WHERE attempt_id = $1 ORDER BY created_at"
    ))
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn count_by_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM answers WHERE attempt_id = $1")
        .bind(attempt_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn count_graded_by_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM answers WHERE attempt_id = $1 AND is_graded = TRUE",
    )
    .bind(attempt_id)
    .fetch_one(executor)
    .await
}

/// One-time grading write for a single answer.
pub(crate) async fn write_grade(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: f64,
    is_correct: bool,
    feedback: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE answers
         SET score = $1, is_correct = $2, feedback = $3, is_graded = TRUE, updated_at = $4
         WHERE id = $5",
    )
    .bind(score)
    .bind(is_correct)
    .bind(feedback)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Clears grading state ahead of an administrative regrade.
pub(crate) async fn reset_grade(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE answers
         SET score = 0, is_correct = NULL, feedback = NULL, is_graded = FALSE, updated_at = $1
         WHERE id = $2",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
