use std::collections::HashMap;

use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::ExamResult;
use crate::db::types::Grade;
use crate::services::result_builder::QuestionResult;

#[derive(Debug, Serialize)]
pub(crate) struct ResultResponse {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) student_id: String,
    pub(crate) exam_id: String,
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
    pub(crate) published_at: Option<String>,
    pub(crate) created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) question_results: Option<Vec<QuestionResult>>,
}

pub(crate) fn result_to_response(
    result: ExamResult,
    question_results: Option<Vec<QuestionResult>>,
) -> ResultResponse {
    ResultResponse {
        id: result.id,
        attempt_id: result.attempt_id,
        student_id: result.student_id,
        exam_id: result.exam_id,
        score: result.score,
        total_marks: result.total_marks,
        percentage: result.percentage,
        grade: result.grade,
        rank: result.rank,
        total_students: result.total_students,
        questions_answered: result.questions_answered,
        total_questions: result.total_questions,
        correct_answers: result.correct_answers,
        wrong_answers: result.wrong_answers,
        time_spent: result.time_spent,
        is_passed: result.is_passed,
        pass_percentage: result.pass_percentage,
        is_published: result.is_published,
        published_at: result.published_at.map(format_primitive),
        created_at: format_primitive(result.created_at),
        question_results,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamStatsResponse {
    pub(crate) total_students: usize,
    pub(crate) average_score: f64,
    pub(crate) highest_score: f64,
    pub(crate) lowest_score: f64,
    pub(crate) average_percentage: f64,
    pub(crate) pass_rate: f64,
    pub(crate) grade_distribution: HashMap<String, usize>,
}

pub(crate) fn exam_stats(results: &[ExamResult]) -> ExamStatsResponse {
    if results.is_empty() {
        return ExamStatsResponse {
            total_students: 0,
            average_score: 0.0,
            highest_score: 0.0,
            lowest_score: 0.0,
            average_percentage: 0.0,
            pass_rate: 0.0,
            grade_distribution: HashMap::new(),
        };
    }

    let count = results.len() as f64;
    let average_score = results.iter().map(|result| result.score).sum::<f64>() / count;
    let highest_score = results.iter().map(|result| result.score).fold(f64::MIN, f64::max);
    let lowest_score = results.iter().map(|result| result.score).fold(f64::MAX, f64::min);
    let average_percentage =
        results.iter().map(|result| result.percentage).sum::<f64>() / count;
    let passed = results.iter().filter(|result| result.is_passed).count();

    let mut grade_distribution = HashMap::new();
    for result in results {
        *grade_distribution.entry(result.grade.as_str().to_string()).or_insert(0) += 1;
    }

    ExamStatsResponse {
        total_students: results.len(),
        average_score,
        highest_score,
        lowest_score,
        average_percentage,
        pass_rate: passed as f64 / count * 100.0,
        grade_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;

    fn result(score: f64, percentage: f64, grade: Grade, is_passed: bool) -> ExamResult {
        let now = primitive_now_utc();
        ExamResult {
            id: format!("r-{score}"),
            attempt_id: format!("a-{score}"),
            student_id: "s1".to_string(),
            exam_id: "e1".to_string(),
            score,
            total_marks: 100.0,
            percentage,
            grade,
            rank: 1,
            total_students: 2,
            questions_answered: 10,
            total_questions: 10,
            correct_answers: 5,
            wrong_answers: 5,
            time_spent: 600,
            is_passed,
            pass_percentage: 50.0,
            is_published: true,
            published_at: Some(now),
            created_at: now,
        }
    }

    #[test]
    fn exam_stats_empty_input() {
        let stats = exam_stats(&[]);
        assert_eq!(stats.total_students, 0);
        assert_eq!(stats.pass_rate, 0.0);
    }

    #[test]
    fn exam_stats_aggregates() {
        let results = vec![
            result(90.0, 90.0, Grade::A, true),
            result(40.0, 40.0, Grade::F, false),
        ];
        let stats = exam_stats(&results);
        assert_eq!(stats.total_students, 2);
        assert_eq!(stats.average_score, 65.0);
        assert_eq!(stats.highest_score, 90.0);
        assert_eq!(stats.lowest_score, 40.0);
        assert_eq!(stats.pass_rate, 50.0);
        assert_eq!(stats.grade_distribution.get("A"), Some(&1));
        assert_eq!(stats.grade_distribution.get("F"), Some(&1));
    }
}
