use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, ExamResult};
use crate::db::types::Grade;
use crate::repositories;
use crate::services::exam_scoring::{self, ScoringError};
use crate::services::similarity_scoring::SimilarityScorer;

#[derive(Debug, Error)]
pub(crate) enum ResultError {
    #[error("Attempt not found")]
    AttemptNotFound,
    #[error("Cannot generate result for non-terminal attempt")]
    AttemptNotTerminal,
    #[error("Result not found")]
    ResultNotFound,
    #[error(transparent)]
    Scoring(ScoringError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<ScoringError> for ResultError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::AttemptNotFound => Self::AttemptNotFound,
            ScoringError::AttemptNotTerminal => Self::AttemptNotTerminal,
            ScoringError::Db(err) => Self::Db(err),
            other => Self::Scoring(other),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GradeBand {
    pub(crate) min_percentage: f64,
    pub(crate) grade: Grade,
}

/// Pass threshold, grade bands, and the unanswered-questions policy are
/// explicit configuration handed to the result builder rather than
/// module-level constants.
#[derive(Debug, Clone)]
pub(crate) struct GradingPolicy {
    pub(crate) pass_percentage: f64,
    pub(crate) count_unanswered_in_total: bool,
    pub(crate) bands: Vec<GradeBand>,
}

impl GradingPolicy {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            pass_percentage: settings.exam().pass_percentage,
            count_unanswered_in_total: settings.exam().count_unanswered_in_total,
            bands: default_grade_bands(),
        }
    }

    pub(crate) fn grade_for(&self, percentage: f64) -> Grade {
        for band in &self.bands {
            if percentage >= band.min_percentage {
                return band.grade;
            }
        }
        Grade::F
    }

    pub(crate) fn is_passed(&self, percentage: f64) -> bool {
        percentage >= self.pass_percentage
    }
}

fn default_grade_bands() -> Vec<GradeBand> {
    vec![
        GradeBand { min_percentage: 95.0, grade: Grade::APlus },
        GradeBand { min_percentage: 90.0, grade: Grade::A },
        GradeBand { min_percentage: 85.0, grade: Grade::BPlus },
        GradeBand { min_percentage: 80.0, grade: Grade::B },
        GradeBand { min_percentage: 75.0, grade: Grade::CPlus },
        GradeBand { min_percentage: 70.0, grade: Grade::C },
        GradeBand { min_percentage: 60.0, grade: Grade::D },
    ]
}

/// Competition ranking: rank 1 plus the number of strictly better scores,
/// so tied scores share a rank.
pub(crate) fn rank_from_better_count(better_count: i64) -> i32 {
    (better_count + 1).min(i32::MAX as i64) as i32
}

/// Derives the durable Result for a terminal attempt. Idempotent: an
/// existing Result is returned unchanged, never recomputed, so retries
/// cannot produce divergent ranks.
pub(crate) async fn generate_result(
    pool: &PgPool,
    scorer: &SimilarityScorer,
    policy: &GradingPolicy,
    attempt_id: &str,
) -> Result<ExamResult, ResultError> {
    if let Some(existing) = repositories::results::find_by_attempt(pool, attempt_id).await? {
        return Ok(existing);
    }

    let attempt = repositories::attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or(ResultError::AttemptNotFound)?;

    if !attempt.status.is_terminal() {
        return Err(ResultError::AttemptNotTerminal);
    }

    // Idempotent itself; returns the cached aggregate when already graded.
    let outcome = exam_scoring::score_attempt(
        pool,
        scorer,
        attempt_id,
        policy.count_unanswered_in_total,
    )
    .await?;

    let total_questions = repositories::questions::count_by_exam(pool, &attempt.exam_id).await?;
    let questions_answered = outcome.graded_answers.len() as i32;
    let correct_answers = outcome
        .graded_answers
        .iter()
        .filter(|answer| answer.is_correct.unwrap_or(false))
        .count() as i32;
    let wrong_answers = questions_answered - correct_answers;

    let mut tx = pool.begin().await?;
    repositories::attempts::acquire_attempt_lock(&mut *tx, attempt_id).await?;

    if let Some(existing) = repositories::results::find_by_attempt(&mut *tx, attempt_id).await? {
        tx.commit().await?;
        return Ok(existing);
    }

    let better_count =
        repositories::results::count_better_scores(&mut *tx, &attempt.exam_id, outcome.total_score)
            .await?;
    let total_students =
        repositories::results::count_submitted_students(&mut *tx, &attempt.exam_id).await?;

    let result_id = Uuid::new_v4().to_string();
    let now = primitive_now_utc();
    repositories::results::create_if_absent(
        &mut *tx,
        repositories::results::CreateResult {
            id: &result_id,
            attempt_id: &attempt.id,
            student_id: &attempt.student_id,
            exam_id: &attempt.exam_id,
            score: outcome.total_score,
            total_marks: outcome.total_marks,
            percentage: outcome.percentage,
            grade: policy.grade_for(outcome.percentage),
            rank: rank_from_better_count(better_count),
            total_students: total_students.min(i32::MAX as i64) as i32,
            questions_answered,
            total_questions: total_questions.min(i32::MAX as i64) as i32,
            correct_answers,
            wrong_answers,
            time_spent: attempt.time_spent,
            is_passed: policy.is_passed(outcome.percentage),
            pass_percentage: policy.pass_percentage,
            is_published: true,
            created_at: now,
        },
    )
    .await?;

    let result = repositories::results::find_by_attempt(&mut *tx, attempt_id)
        .await?
        .ok_or(ResultError::ResultNotFound)?;

    tx.commit().await?;

    tracing::info!(
        attempt_id,
        exam_id = %result.exam_id,
        rank = result.rank,
        grade = result.grade.as_str(),
        "Result generated"
    );

    Ok(result)
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct QuestionResult {
    pub(crate) question_id: String,
    pub(crate) question_text: String,
    pub(crate) student_answer: String,
    pub(crate) correct_answer: String,
    pub(crate) is_correct: bool,
    pub(crate) marks_obtained: f64,
    pub(crate) total_marks: f64,
    pub(crate) explanation: Option<String>,
}

/// Per-question review rows for every graded answer of the attempt.
pub(crate) async fn question_breakdown(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<QuestionResult>, ResultError> {
    let attempt = repositories::attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or(ResultError::AttemptNotFound)?;

    let questions = repositories::questions::list_by_exam(pool, &attempt.exam_id).await?;
    let answers = repositories::answers::list_by_attempt(pool, attempt_id).await?;

    let mut breakdown = Vec::new();
    for answer in answers.iter().filter(|answer| answer.is_graded) {
        let Some(question) = questions.iter().find(|question| question.id == answer.question_id)
        else {
            continue;
        };

        breakdown.push(QuestionResult {
            question_id: question.id.clone(),
            question_text: question.question_text.clone(),
            student_answer: format_student_answer(answer),
            correct_answer: question
                .correct_answer
                .clone()
                .unwrap_or_else(|| "No correct answer available".to_string()),
            is_correct: answer.is_correct.unwrap_or(false),
            marks_obtained: answer.score,
            total_marks: answer.max_score,
            explanation: question.explanation.clone().or_else(|| answer.feedback.clone()),
        });
    }

    Ok(breakdown)
}

fn format_student_answer(answer: &Answer) -> String {
    let formatted = answer.formatted_answer();
    if formatted.trim().is_empty() {
        "No answer provided".to_string()
    } else {
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> GradingPolicy {
        GradingPolicy {
            pass_percentage: 50.0,
            count_unanswered_in_total: true,
            bands: default_grade_bands(),
        }
    }

    #[test]
    fn grade_band_boundaries() {
        let policy = policy();
        assert_eq!(policy.grade_for(100.0), Grade::APlus);
        assert_eq!(policy.grade_for(95.0), Grade::APlus);
        assert_eq!(policy.grade_for(94.9), Grade::A);
        assert_eq!(policy.grade_for(90.0), Grade::A);
        assert_eq!(policy.grade_for(85.0), Grade::BPlus);
        assert_eq!(policy.grade_for(80.0), Grade::B);
        assert_eq!(policy.grade_for(75.0), Grade::CPlus);
        assert_eq!(policy.grade_for(70.0), Grade::C);
        assert_eq!(policy.grade_for(60.0), Grade::D);
        assert_eq!(policy.grade_for(59.9), Grade::F);
        assert_eq!(policy.grade_for(0.0), Grade::F);
    }

    #[test]
    fn pass_threshold_is_inclusive() {
        let policy = policy();
        assert!(policy.is_passed(50.0));
        assert!(!policy.is_passed(49.99));
    }

    #[test]
    fn custom_pass_threshold_is_respected() {
        let policy = GradingPolicy {
            pass_percentage: 70.0,
            count_unanswered_in_total: true,
            bands: default_grade_bands(),
        };
        assert!(!policy.is_passed(65.0));
        assert!(policy.is_passed(70.0));
    }

    #[test]
    fn tied_top_scores_share_rank_one() {
        // No strictly better results means rank 1, for every tied scorer.
        assert_eq!(rank_from_better_count(0), 1);
        // Two better scores puts this result at rank 3.
        assert_eq!(rank_from_better_count(2), 3);
    }
}
