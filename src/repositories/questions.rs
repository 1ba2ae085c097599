use sqlx::PgPool;

use crate::db::models::Question;

pub(crate) const COLUMNS: &str = "\
    id, section_id, question_text, qtype, options, correct_answer, marks, \
    order_index, explanation, is_active, created_at, updated_at";

const PREFIXED_COLUMNS: &str = "\
    q.id, q.section_id, q.question_text, q.qtype, q.options, q.correct_answer, q.marks, \
    q.order_index, q.explanation, q.is_active, q.created_at, q.updated_at";

/// All active questions of an exam across its sections, in display order.
pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {PREFIXED_COLUMNS} FROM questions q
         JOIN sections s ON s.id = q.section_id
         WHERE s.exam_id = $1 AND q.is_active = TRUE
         ORDER BY s.order_index, q.order_index"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn count_by_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM questions q
         JOIN sections s ON s.id = q.section_id
         WHERE s.exam_id = $1 AND q.is_active = TRUE",
    )
    .bind(exam_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn belongs_to_exam(
    executor: impl sqlx::PgExecutor<'_>,
    question_id: &str,
    exam_id: &str,
) -> Result<bool, sqlx::Error> {
    let found: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM questions q
         JOIN sections s ON s.id = q.section_id
         WHERE q.id = $1 AND s.exam_id = $2",
    )
    .bind(question_id)
    .bind(exam_id)
    .fetch_optional(executor)
    .await?;

    Ok(found.is_some())
}

