use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::ExamResult;
use crate::db::types::{AttemptStatus, Grade};

pub(crate) const COLUMNS: &str = "\
    id, attempt_id, student_id, exam_id, score, total_marks, percentage, grade, \
    rank, total_students, questions_answered, total_questions, correct_answers, \
    wrong_answers, time_spent, is_passed, pass_percentage, is_published, \
    published_at, created_at";

pub(crate) struct CreateResult<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) score: f64,
    pub(crate) total_marks: f64,
    pub(crate) percentage: f64,
    pub(crate) grade: Grade,
    pub(crate) rank: i32,
    pub(crate) total_students: i32,
    pub(crate) questions_answered: i32,
    pub(crate) total_questions: i32,
    pub(crate) correct_answers: i32,
    pub(crate) wrong_answers: i32,
    pub(crate) time_spent: i32,
    pub(crate) is_passed: bool,
    pub(crate) pass_percentage: f64,
    pub(crate) is_published: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

/// The unique constraint on attempt_id makes result creation a
/// first-writer-wins operation; losers observe the existing row.
pub(crate) async fn create_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    result: CreateResult<'_>,
) -> Result<bool, sqlx::Error> {
    let inserted = sqlx::query(
        "INSERT INTO results (
            id, attempt_id, student_id, exam_id, score, total_marks, percentage,
            grade, rank, total_students, questions_answered, total_questions,
            correct_answers, wrong_answers, time_spent, is_passed, pass_percentage,
            is_published, published_at, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,
                  CASE WHEN $18 THEN $19 ELSE NULL END, $19)
        ON CONFLICT (attempt_id) DO NOTHING",
    )
    .bind(result.id)
    .bind(result.attempt_id)
    .bind(result.student_id)
    .bind(result.exam_id)
    .bind(result.score)
    .bind(result.total_marks)
    .bind(result.percentage)
    .bind(result.grade)
    .bind(result.rank)
    .bind(result.total_students)
    .bind(result.questions_answered)
    .bind(result.total_questions)
    .bind(result.correct_answers)
    .bind(result.wrong_answers)
    .bind(result.time_spent)
    .bind(result.is_passed)
    .bind(result.pass_percentage)
    .bind(result.is_published)
    .bind(result.created_at)
    .execute(executor)
    .await?;

    Ok(inserted.rows_affected() > 0)
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!("SELECT {COLUMNS} FROM results WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_by_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "SELECT {COLUMNS} FROM results WHERE attempt_id = $1"
    ))
    .bind(attempt_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    published_only: bool,
) -> Result<Vec<ExamResult>, sqlx::Error> {
    if published_only {
        sqlx::query_as::<_, ExamResult>(&format!(
            "SELECT {COLUMNS} FROM results \
             WHERE exam_id = $1 AND is_published = TRUE ORDER BY score DESC"
        ))
        .bind(exam_id)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query_as::<_, ExamResult>(&format!(
            "SELECT {COLUMNS} FROM results WHERE exam_id = $1 ORDER BY score DESC"
        ))
        .bind(exam_id)
        .fetch_all(pool)
        .await
    }
}

pub(crate) async fn list_by_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "SELECT {COLUMNS} FROM results WHERE student_id = $1 ORDER BY created_at DESC"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await
}

/// Rank input: results for the exam scoring strictly higher.
pub(crate) async fn count_better_scores(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    score: f64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM results WHERE exam_id = $1 AND score > $2")
        .bind(exam_id)
        .bind(score)
        .fetch_one(executor)
        .await
}

/// Distinct students with a submitted attempt for the exam.
pub(crate) async fn count_submitted_students(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(DISTINCT student_id) FROM exam_attempts \
         WHERE exam_id = $1 AND status = $2",
    )
    .bind(exam_id)
    .bind(AttemptStatus::Submitted)
    .fetch_one(executor)
    .await
}

pub(crate) async fn publish(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE results SET is_published = TRUE, published_at = $1 WHERE id = $2",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
