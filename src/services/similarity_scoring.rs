use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;

const MAX_EMBED_ATTEMPTS: u32 = 3;

/// Discrete similarity bands, highest threshold first; raw cosine
/// similarity is never mapped to marks directly.
const SIMILARITY_BANDS: &[(f64, f64)] = &[
    (0.90, 1.0),
    (0.80, 0.8),
    (0.65, 0.6),
    (0.50, 0.4),
    (0.35, 0.2),
];

#[derive(Debug, Clone)]
pub(crate) struct SubjectiveScore {
    pub(crate) score: f64,
    pub(crate) feedback: String,
    pub(crate) confidence: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct EmbeddingsClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl EmbeddingsClient {
    fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().request_timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().embedding_model.clone(),
        })
    }

    pub(crate) async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let payload = json!({ "model": self.model, "input": text });

        let mut last_error = None;
        let mut body = Value::Null;

        for attempt in 0..MAX_EMBED_ATTEMPTS {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(&payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    body = resp.json().await.unwrap_or(Value::Null);
                    if status.is_success() {
                        last_error = None;
                        break;
                    }
                    last_error = Some(anyhow::anyhow!("Embedding API error: {body}"));
                }
                Err(err) => {
                    last_error = Some(anyhow::anyhow!(err).context("Failed to call embedding API"));
                }
            }

            if attempt + 1 < MAX_EMBED_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        if let Some(err) = last_error {
            return Err(err);
        }

        let vector = body
            .get("data")
            .and_then(|data| data.get(0))
            .and_then(|entry| entry.get("embedding"))
            .and_then(|value| value.as_array())
            .context("Missing embedding in provider response")?
            .iter()
            .map(|value| value.as_f64().unwrap_or(0.0) as f32)
            .collect();

        Ok(vector)
    }
}

/// Scores short-answer and essay questions. Provider failures degrade to
/// the local keyword heuristic, so scoring always completes.
#[derive(Debug, Clone)]
pub(crate) struct SimilarityScorer {
    client: Option<EmbeddingsClient>,
}

impl SimilarityScorer {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        if settings.ai().openai_api_key.is_empty() {
            tracing::warn!("OPENAI_API_KEY not configured; similarity scoring uses keyword fallback");
            return Ok(Self { client: None });
        }

        Ok(Self { client: Some(EmbeddingsClient::from_settings(settings)?) })
    }

    pub(crate) fn fallback_only() -> Self {
        Self { client: None }
    }

    pub(crate) async fn score(
        &self,
        question_text: &str,
        correct_answer: &str,
        rubric: Option<&str>,
        student_answer: &str,
        marks: f64,
    ) -> SubjectiveScore {
        let Some(client) = &self.client else {
            return keyword_fallback(correct_answer, student_answer, marks);
        };

        let context_correct = match rubric {
            Some(rubric) => format!("{question_text} {correct_answer} {rubric}"),
            None => format!("{question_text} {correct_answer}"),
        };
        let context_student = format!("{question_text} {student_answer}");

        let embeddings = tokio::try_join!(
            client.embed(&context_correct),
            client.embed(&context_student)
        );

        match embeddings {
            Ok((correct_vector, student_vector)) => {
                let similarity = cosine_similarity(&correct_vector, &student_vector);
                let clamped = similarity.clamp(0.0, 1.0);
                let score = (band_fraction(clamped) * marks).round().min(marks);

                SubjectiveScore {
                    score,
                    feedback: similarity_feedback(clamped).to_string(),
                    confidence: clamped,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Embedding provider failed; using keyword fallback");
                metrics::counter!("embedding_fallback_total").increment(1);
                keyword_fallback(correct_answer, student_answer, marks)
            }
        }
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Fraction of the question's marks awarded for a clamped similarity.
pub(crate) fn band_fraction(similarity: f64) -> f64 {
    for (threshold, fraction) in SIMILARITY_BANDS {
        if similarity >= *threshold {
            return *fraction;
        }
    }
    0.0
}

fn similarity_feedback(similarity: f64) -> &'static str {
    let percentage = similarity * 100.0;

    if percentage >= 90.0 {
        "Excellent answer! Very close to the expected response."
    } else if percentage >= 75.0 {
        "Good answer! Shows strong understanding of the topic."
    } else if percentage >= 60.0 {
        "Fair answer. Some key points are covered but could be improved."
    } else if percentage >= 40.0 {
        "Partial answer. Some relevant points mentioned but missing key concepts."
    } else if percentage >= 20.0 {
        "Limited answer. Very few relevant points covered."
    } else {
        "Insufficient answer. Does not adequately address the question."
    }
}

/// Keyword-overlap heuristic: the share of correct-answer tokens that
/// substring-match some student token (or vice versa).
pub(crate) fn keyword_fallback(
    correct_answer: &str,
    student_answer: &str,
    marks: f64,
) -> SubjectiveScore {
    let correct = correct_answer.to_lowercase();
    let student = student_answer.to_lowercase();

    let correct_keywords: Vec<&str> =
        correct.split_whitespace().filter(|word| word.len() > 2).collect();
    let student_keywords: Vec<&str> =
        student.split_whitespace().filter(|word| word.len() > 2).collect();

    let matching = correct_keywords
        .iter()
        .filter(|keyword| {
            student_keywords
                .iter()
                .any(|candidate| candidate.contains(**keyword) || keyword.contains(*candidate))
        })
        .count();

    let ratio = if correct_keywords.is_empty() {
        0.0
    } else {
        matching as f64 / correct_keywords.len() as f64
    };

    let feedback = if ratio >= 0.8 {
        "Good answer with most key points covered."
    } else if ratio >= 0.5 {
        "Partial answer with some key points covered."
    } else if ratio > 0.0 {
        "Answer partially correct but missing key points."
    } else {
        "Answer does not match the expected response."
    };

    SubjectiveScore {
        score: (marks * ratio).round(),
        feedback: feedback.to_string(),
        confidence: 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.5_f32, 0.25, -0.75];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_similarity_handles_mismatched_and_zero_vectors() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn band_fraction_cut_points() {
        assert_eq!(band_fraction(0.95), 1.0);
        assert_eq!(band_fraction(0.90), 1.0);
        assert_eq!(band_fraction(0.89), 0.8);
        assert_eq!(band_fraction(0.80), 0.8);
        assert_eq!(band_fraction(0.70), 0.6);
        assert_eq!(band_fraction(0.55), 0.4);
        assert_eq!(band_fraction(0.40), 0.2);
        assert_eq!(band_fraction(0.34), 0.0);
    }

    #[test]
    fn keyword_fallback_full_overlap() {
        let result = keyword_fallback("mitochondria produce energy", "Mitochondria produce the energy", 10.0);
        assert_eq!(result.score, 10.0);
        assert_eq!(result.feedback, "Good answer with most key points covered.");
    }

    #[test]
    fn keyword_fallback_no_overlap_scores_zero() {
        let result = keyword_fallback("photosynthesis uses sunlight", "unrelated words entirely", 10.0);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.feedback, "Answer does not match the expected response.");
    }

    #[test]
    fn keyword_fallback_partial_overlap_rounds_to_nearest_mark() {
        // 1 of 3 keywords matched: 10 * 1/3 rounds to 3.
        let result = keyword_fallback("osmosis membrane gradient", "osmosis happens", 10.0);
        assert_eq!(result.score, 3.0);
        assert_eq!(result.feedback, "Answer partially correct but missing key points.");
    }

    #[tokio::test]
    async fn scorer_without_provider_never_fails() {
        let scorer = SimilarityScorer::fallback_only();
        let result = scorer
            .score("What is osmosis?", "movement of water across a membrane", None, "water moves across the membrane", 5.0)
            .await;
        assert!(result.score > 0.0);
        assert_eq!(result.confidence, 0.5);
    }
}
