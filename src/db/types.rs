use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Admin,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Draft,
    Published,
    Active,
    Completed,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Paused,
    Submitted,
    TimedOut,
    Disqualified,
}

impl AttemptStatus {
    /// Terminal attempts are immutable except for the one-time scoring write.
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Submitted | Self::TimedOut | Self::Disqualified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "grade")]
pub(crate) enum Grade {
    #[serde(rename = "A+")]
    #[sqlx(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    #[sqlx(rename = "A")]
    A,
    #[serde(rename = "B+")]
    #[sqlx(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    #[sqlx(rename = "B")]
    B,
    #[serde(rename = "C+")]
    #[sqlx(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    #[sqlx(rename = "C")]
    C,
    #[serde(rename = "D")]
    #[sqlx(rename = "D")]
    D,
    #[serde(rename = "F")]
    #[sqlx(rename = "F")]
    F,
}

impl Grade {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(AttemptStatus::Submitted.is_terminal());
        assert!(AttemptStatus::TimedOut.is_terminal());
        assert!(AttemptStatus::Disqualified.is_terminal());
        assert!(!AttemptStatus::InProgress.is_terminal());
        assert!(!AttemptStatus::Paused.is_terminal());
    }

    #[test]
    fn grade_serializes_with_plus_signs() {
        let json = serde_json::to_string(&Grade::APlus).expect("grade json");
        assert_eq!(json, "\"A+\"");
    }
}
