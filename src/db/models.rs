use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, ExamStatus, Grade, QuestionType, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) status: ExamStatus,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) section_id: String,
    pub(crate) question_text: String,
    pub(crate) qtype: QuestionType,
    pub(crate) options: Option<Json<Vec<String>>>,
    pub(crate) correct_answer: Option<String>,
    pub(crate) marks: f64,
    pub(crate) order_index: i32,
    pub(crate) explanation: Option<String>,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// One violation entry in the attempt's ordered log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ViolationRecord {
    #[serde(rename = "type")]
    pub(crate) violation_type: String,
    pub(crate) description: String,
    pub(crate) timestamp: String,
    pub(crate) metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamAttempt {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) exam_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) paused_at: Option<PrimitiveDateTime>,
    pub(crate) resumed_at: Option<PrimitiveDateTime>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) time_spent: i32,
    pub(crate) questions_answered: i32,
    pub(crate) total_questions: i32,
    pub(crate) score: f64,
    pub(crate) total_marks: f64,
    pub(crate) percentage: f64,
    pub(crate) is_graded: bool,
    pub(crate) scoring_started_at: Option<PrimitiveDateTime>,
    pub(crate) cheating_warnings: i32,
    pub(crate) max_cheating_warnings: i32,
    pub(crate) violations: Json<Vec<ViolationRecord>>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Answer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) student_id: String,
    pub(crate) question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_options: Option<Json<Vec<String>>>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) is_graded: bool,
    pub(crate) feedback: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Answer {
    /// Student answer as a single display string, whichever shape was used.
    pub(crate) fn formatted_answer(&self) -> String {
        if let Some(options) = self.selected_options.as_ref().filter(|o| !o.0.is_empty()) {
            return options.0.join(", ");
        }
        self.answer_text.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamResult {
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
    pub(crate) published_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
}
