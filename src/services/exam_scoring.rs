use std::collections::HashMap;
use std::time::Instant;

use sqlx::PgPool;
use thiserror::Error;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, Question};
use crate::repositories;
use crate::services::objective_scoring::score_objective;
use crate::services::similarity_scoring::SimilarityScorer;

#[derive(Debug, Error)]
pub(crate) enum ScoringError {
    #[error("Exam attempt not found")]
    AttemptNotFound,
    #[error("Answer not found")]
    AnswerNotFound,
    #[error("Question {0} not found")]
    QuestionMissing(String),
    #[error("Cannot score non-terminal attempt")]
    AttemptNotTerminal,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Question-type dispatch resolved once at the boundary; scoring matches on
/// this closed enum, so an unhandled type cannot slip through.
pub(crate) enum ScorableQuestion {
    Objective { correct_answer: String, marks: f64 },
    Subjective { question_text: String, correct_answer: String, rubric: Option<String>, marks: f64 },
}

impl ScorableQuestion {
    pub(crate) fn from_question(question: &Question) -> Self {
        use crate::db::types::QuestionType;

        let correct_answer = question.correct_answer.clone().unwrap_or_default();
        match question.qtype {
            QuestionType::MultipleChoice | QuestionType::TrueFalse => {
                Self::Objective { correct_answer, marks: question.marks }
            }
            QuestionType::ShortAnswer | QuestionType::Essay => Self::Subjective {
                question_text: question.question_text.clone(),
                correct_answer,
                rubric: question.explanation.clone(),
                marks: question.marks,
            },
        }
    }
}

#[derive(Debug)]
pub(crate) struct ScoringOutcome {
    pub(crate) total_score: f64,
    pub(crate) total_marks: f64,
    pub(crate) percentage: f64,
    pub(crate) graded_answers: Vec<Answer>,
}

#[derive(Debug, PartialEq)]
pub(crate) struct AggregateTotals {
    pub(crate) total_score: f64,
    pub(crate) total_marks: f64,
    pub(crate) percentage: f64,
}

/// Aggregates per-answer (score, max_score) pairs. With
/// `count_unanswered_in_total` the denominator is the whole exam's mark
/// total, so skipped questions count against the student; otherwise only
/// answered questions contribute.
pub(crate) fn aggregate_totals(
    scored: &[(f64, f64)],
    exam_total_marks: f64,
    count_unanswered_in_total: bool,
) -> AggregateTotals {
    let total_score: f64 = scored.iter().map(|(score, _)| score).sum();
    let total_marks = if count_unanswered_in_total {
        exam_total_marks
    } else {
        scored.iter().map(|(_, max)| max).sum()
    };
    let percentage = if total_marks > 0.0 { total_score / total_marks * 100.0 } else { 0.0 };

    AggregateTotals { total_score, total_marks, percentage }
}

/// Scores one answer against its resolved question. Subjective scoring
/// never errors; a blank answer is scored locally without a provider call.
pub(crate) async fn score_single(
    scorer: &SimilarityScorer,
    question: &ScorableQuestion,
    answer: &Answer,
) -> (f64, bool, String) {
    match question {
        ScorableQuestion::Objective { correct_answer, marks } => {
            let result = score_objective(correct_answer, &answer.formatted_answer(), *marks);
            (result.score, result.is_correct, result.feedback.to_string())
        }
        ScorableQuestion::Subjective { question_text, correct_answer, rubric, marks } => {
            let student_answer = answer.answer_text.as_deref().unwrap_or("");
            if student_answer.trim().is_empty() {
                return (0.0, false, "No answer provided.".to_string());
            }

            let result = scorer
                .score(question_text, correct_answer, rubric.as_deref(), student_answer, *marks)
                .await;
            (result.score, result.score > 0.0, result.feedback)
        }
    }
}

/// Scores every answer of a terminal attempt and writes the attempt
/// aggregate. Idempotent: an already-graded attempt returns its cached
/// aggregate, and already-graded answers are never rescored, so a retry
/// after a mid-scoring crash only processes the remainder.
///
/// A per-attempt advisory lock is held for the whole run; per-answer
/// grades commit individually before the aggregate, so readers never see
/// a graded aggregate without its per-answer detail.
pub(crate) async fn score_attempt(
    pool: &PgPool,
    scorer: &SimilarityScorer,
    attempt_id: &str,
    count_unanswered_in_total: bool,
) -> Result<ScoringOutcome, ScoringError> {
    let timer = Instant::now();

    let mut lock_tx = pool.begin().await?;
    repositories::attempts::acquire_attempt_lock(&mut *lock_tx, attempt_id).await?;

    let attempt = repositories::attempts::find_by_id(&mut *lock_tx, attempt_id)
        .await?
        .ok_or(ScoringError::AttemptNotFound)?;

    if !attempt.status.is_terminal() {
        return Err(ScoringError::AttemptNotTerminal);
    }

    let answers = repositories::answers::list_by_attempt(pool, &attempt.id).await?;

    if attempt.is_graded {
        let graded_answers = answers.into_iter().filter(|answer| answer.is_graded).collect();
        return Ok(ScoringOutcome {
            total_score: attempt.score,
            total_marks: attempt.total_marks,
            percentage: attempt.percentage,
            graded_answers,
        });
    }

    let questions = repositories::questions::list_by_exam(pool, &attempt.exam_id).await?;
    let exam_total_marks: f64 = questions.iter().map(|question| question.marks).sum();
    let scorable: HashMap<String, ScorableQuestion> = questions
        .iter()
        .map(|question| (question.id.clone(), ScorableQuestion::from_question(question)))
        .collect();

    let mut graded_answers = Vec::with_capacity(answers.len());
    for mut answer in answers {
        if answer.is_graded {
            graded_answers.push(answer);
            continue;
        }

        let question = scorable
            .get(&answer.question_id)
            .ok_or_else(|| ScoringError::QuestionMissing(answer.question_id.clone()))?;

        let (score, is_correct, feedback) = score_single(scorer, question, &answer).await;

        let now = primitive_now_utc();
        repositories::answers::write_grade(pool, &answer.id, score, is_correct, &feedback, now)
            .await?;

        answer.score = score;
        answer.is_correct = Some(is_correct);
        answer.is_graded = true;
        answer.feedback = Some(feedback);
        graded_answers.push(answer);
    }

    let scored: Vec<(f64, f64)> =
        graded_answers.iter().map(|answer| (answer.score, answer.max_score)).collect();
    let totals = aggregate_totals(&scored, exam_total_marks, count_unanswered_in_total);

    repositories::attempts::write_aggregate(
        pool,
        &attempt.id,
        totals.total_score,
        totals.total_marks,
        totals.percentage,
        primitive_now_utc(),
    )
    .await?;

    lock_tx.commit().await?;

    metrics::counter!("scoring_jobs_total", "status" => "success").increment(1);
    metrics::histogram!("scoring_duration_seconds").record(timer.elapsed().as_secs_f64());

    tracing::info!(
        attempt_id,
        total_score = totals.total_score,
        total_marks = totals.total_marks,
        "Attempt scored"
    );

    Ok(ScoringOutcome {
        total_score: totals.total_score,
        total_marks: totals.total_marks,
        percentage: totals.percentage,
        graded_answers,
    })
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct ScoringProgress {
    pub(crate) total_answers: i64,
    pub(crate) graded_answers: i64,
    pub(crate) progress_percentage: f64,
}

pub(crate) async fn scoring_progress(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<ScoringProgress, ScoringError> {
    let attempt = repositories::attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or(ScoringError::AttemptNotFound)?;

    let total_answers = repositories::answers::count_by_attempt(pool, &attempt.id).await?;
    let graded_answers = repositories::answers::count_graded_by_attempt(pool, &attempt.id).await?;
    let progress_percentage = if total_answers > 0 {
        graded_answers as f64 / total_answers as f64 * 100.0
    } else {
        0.0
    };

    Ok(ScoringProgress { total_answers, graded_answers, progress_percentage })
}

/// Administrative rescore of a single answer: clears the grading fields
/// and re-invokes the per-answer scorer. The attempt aggregate and any
/// existing Result are left untouched.
pub(crate) async fn regrade_answer(
    pool: &PgPool,
    scorer: &SimilarityScorer,
    answer_id: &str,
) -> Result<Answer, ScoringError> {
    let mut answer = repositories::answers::find_by_id(pool, answer_id)
        .await?
        .ok_or(ScoringError::AnswerNotFound)?;

    let question = repositories::questions::find_by_id(pool, &answer.question_id)
        .await?
        .ok_or_else(|| ScoringError::QuestionMissing(answer.question_id.clone()))?;

    repositories::answers::reset_grade(pool, &answer.id, primitive_now_utc()).await?;

    let scorable = ScorableQuestion::from_question(&question);
    let (score, is_correct, feedback) = score_single(scorer, &scorable, &answer).await;

    let now = primitive_now_utc();
    repositories::answers::write_grade(pool, &answer.id, score, is_correct, &feedback, now).await?;

    answer.score = score;
    answer.is_correct = Some(is_correct);
    answer.is_graded = true;
    answer.feedback = Some(feedback);

    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_marks_covers_unanswered_questions() {
        // Two answered questions out of a 25-mark exam.
        let totals = aggregate_totals(&[(5.0, 5.0), (3.0, 10.0)], 25.0, true);
        assert_eq!(totals.total_score, 8.0);
        assert_eq!(totals.total_marks, 25.0);
        assert_eq!(totals.percentage, 32.0);
    }

    #[test]
    fn answered_only_policy_uses_answer_snapshots() {
        let totals = aggregate_totals(&[(5.0, 5.0), (3.0, 10.0)], 25.0, false);
        assert_eq!(totals.total_marks, 15.0);
        assert!((totals.percentage - 8.0 / 15.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_total_marks_yields_zero_percentage() {
        let totals = aggregate_totals(&[], 0.0, true);
        assert_eq!(totals.total_score, 0.0);
        assert_eq!(totals.percentage, 0.0);
    }

    #[test]
    fn correct_mcq_and_blank_essay_scenario() {
        // 5-mark MCQ answered correctly, 5-mark essay left blank: the blank
        // essay still counts in the denominator.
        let totals = aggregate_totals(&[(5.0, 5.0), (0.0, 5.0)], 10.0, true);
        assert_eq!(totals.total_score, 5.0);
        assert_eq!(totals.total_marks, 10.0);
        assert_eq!(totals.percentage, 50.0);
    }

    #[tokio::test]
    async fn blank_subjective_answer_scores_zero_without_provider_call() {
        use crate::core::time::primitive_now_utc;

        let scorer = SimilarityScorer::fallback_only();
        let question = ScorableQuestion::Subjective {
            question_text: "Explain osmosis.".to_string(),
            correct_answer: "movement of water across a membrane".to_string(),
            rubric: None,
            marks: 5.0,
        };
        let now = primitive_now_utc();
        let answer = Answer {
            id: "a1".to_string(),
            attempt_id: "at1".to_string(),
            student_id: "s1".to_string(),
            question_id: "q1".to_string(),
            answer_text: Some("   ".to_string()),
            selected_options: None,
            is_correct: None,
            score: 0.0,
            max_score: 5.0,
            is_graded: false,
            feedback: None,
            created_at: now,
            updated_at: now,
        };

        let (score, is_correct, feedback) = score_single(&scorer, &question, &answer).await;
        assert_eq!(score, 0.0);
        assert!(!is_correct);
        assert_eq!(feedback, "No answer provided.");
    }

    #[tokio::test]
    async fn objective_dispatch_is_whitespace_insensitive() {
        use crate::core::time::primitive_now_utc;

        let scorer = SimilarityScorer::fallback_only();
        let question =
            ScorableQuestion::Objective { correct_answer: "Paris".to_string(), marks: 5.0 };
        let now = primitive_now_utc();
        let answer = Answer {
            id: "a1".to_string(),
            attempt_id: "at1".to_string(),
            student_id: "s1".to_string(),
            question_id: "q1".to_string(),
            answer_text: Some(" paris ".to_string()),
            selected_options: None,
            is_correct: None,
            score: 0.0,
            max_score: 5.0,
            is_graded: false,
            feedback: None,
            created_at: now,
            updated_at: now,
        };

        let (score, is_correct, _) = score_single(&scorer, &question, &answer).await;
        assert_eq!(score, 5.0);
        assert!(is_correct);
    }
}
