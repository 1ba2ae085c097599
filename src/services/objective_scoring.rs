pub(crate) struct ObjectiveScore {
    pub(crate) score: f64,
    pub(crate) is_correct: bool,
    pub(crate) feedback: &'static str,
}

/// Lowercase, trim, collapse internal whitespace.
pub(crate) fn normalize_answer(answer: &str) -> String {
    answer.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Exact-match scoring for multiple-choice and true/false questions:
/// full marks on a normalized match, zero otherwise.
pub(crate) fn score_objective(
    correct_answer: &str,
    student_answer: &str,
    marks: f64,
) -> ObjectiveScore {
    let is_correct = normalize_answer(correct_answer) == normalize_answer(student_answer);

    ObjectiveScore {
        score: if is_correct { marks } else { 0.0 },
        is_correct,
        feedback: if is_correct { "Correct answer!" } else { "Incorrect answer." },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_case_and_whitespace_insensitive() {
        assert_eq!(normalize_answer("  Paris "), "paris");
        assert_eq!(normalize_answer("New   York\tCity"), "new york city");
    }

    #[test]
    fn matching_answer_earns_full_marks() {
        let result = score_objective("Paris", " paris ", 5.0);
        assert_eq!(result.score, 5.0);
        assert!(result.is_correct);
        assert_eq!(result.feedback, "Correct answer!");
    }

    #[test]
    fn mismatched_answer_earns_zero() {
        let result = score_objective("true", "false", 2.0);
        assert_eq!(result.score, 0.0);
        assert!(!result.is_correct);
        assert_eq!(result.feedback, "Incorrect answer.");
    }
}
