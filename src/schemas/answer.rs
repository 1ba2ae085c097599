use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Answer;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SaveAnswerPayload {
    #[validate(length(min = 1))]
    pub(crate) question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_options: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_options: Option<Vec<String>>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) is_graded: bool,
    pub(crate) feedback: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

pub(crate) fn answer_to_response(answer: Answer) -> AnswerResponse {
    AnswerResponse {
        id: answer.id,
        attempt_id: answer.attempt_id,
        question_id: answer.question_id,
        answer_text: answer.answer_text,
        selected_options: answer.selected_options.map(|options| options.0),
        is_correct: answer.is_correct,
        score: answer.score,
        max_score: answer.max_score,
        is_graded: answer.is_graded,
        feedback: answer.feedback,
        created_at: format_primitive(answer.created_at),
        updated_at: format_primitive(answer.updated_at),
    }
}
