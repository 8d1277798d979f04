use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Justification carried by a metric whose scoring call could not be completed
pub const DEGRADED_JUSTIFICATION: &str =
    "Failed to evaluate this metric due to an API or parsing error.";

/// Justification used when the scorer returned a score without one
pub const MISSING_JUSTIFICATION: &str = "No justification provided.";

/// Response from the AI model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated text response
    pub content: String,
    /// Metadata about the response (tokens used, etc.)
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A single scored and justified quality dimension (0 to 100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    score: f64,
    justification: String,
}

impl Metric {
    /// Build a metric, clamping the score into 0..=100
    pub(crate) fn new(score: f64, justification: impl Into<String>) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            score,
            justification: justification.into(),
        }
    }

    /// Sentinel for a metric the evaluator could not obtain
    pub(crate) fn degraded() -> Self {
        Self::new(0.0, DEGRADED_JUSTIFICATION)
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn justification(&self) -> &str {
        &self.justification
    }
}

/// Whether the run was compared against a reference answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReferenceCheck {
    NotSupplied,
    Compared { similarity: Metric, validity: Metric },
}

/// Outcome of one validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Text produced by the generation call
    pub ai_response: String,
    /// Factual accuracy (100 = fully factual)
    pub hallucination: Metric,
    /// Safety (100 = fully safe)
    pub toxicity: Metric,
    /// Reference-dependent metrics
    pub reference: ReferenceCheck,
}

impl ValidationResult {
    pub fn similarity(&self) -> Option<&Metric> {
        match &self.reference {
            ReferenceCheck::Compared { similarity, .. } => Some(similarity),
            ReferenceCheck::NotSupplied => None,
        }
    }

    pub fn validity(&self) -> Option<&Metric> {
        match &self.reference {
            ReferenceCheck::Compared { validity, .. } => Some(validity),
            ReferenceCheck::NotSupplied => None,
        }
    }

    /// Every present metric with its display label, in presentation order
    pub fn metrics(&self) -> Vec<(&'static str, &Metric)> {
        let mut metrics = vec![
            ("Factual Accuracy", &self.hallucination),
            ("Safety", &self.toxicity),
        ];
        if let ReferenceCheck::Compared {
            similarity,
            validity,
        } = &self.reference
        {
            metrics.push(("Similarity", similarity));
            metrics.push(("Validity", validity));
        }
        metrics
    }
}

/// What happened to prompt suggestions for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SuggestionOutcome {
    /// Scores were good enough, nothing requested
    NotNeeded,
    /// Suggestions in priority order (may be empty)
    Suggested { prompts: Vec<String> },
    /// The suggestion call failed
    Unavailable { reason: String },
}

impl SuggestionOutcome {
    pub fn prompts(&self) -> &[String] {
        match self {
            SuggestionOutcome::Suggested { prompts } => prompts,
            _ => &[],
        }
    }
}

/// Everything one completed run hands back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub prompt: String,
    pub reference: Option<String>,
    pub model: String,
    pub result: ValidationResult,
    pub suggestions: SuggestionOutcome,
    /// `None` when the run could not be recorded against the quota
    pub uses_remaining: Option<u32>,
}
