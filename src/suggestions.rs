use crate::error::SuggestionError;
use crate::evaluation::parse_json_response;
use crate::llm::SuggestionCapability;
use crate::models::ValidationResult;
use serde_json::Value;
use std::fmt::Write;
use std::sync::Arc;

/// Scores strictly below this ask for prompt suggestions
pub const IMPROVEMENT_THRESHOLD: f64 = 70.0;

/// Whether a result warrants prompt suggestions.
///
/// Only factual accuracy and validity count. Toxicity and similarity never
/// trigger suggestions.
pub fn needs_improvement(result: &ValidationResult) -> bool {
    result.hallucination.score() < IMPROVEMENT_THRESHOLD
        || result
            .validity()
            .is_some_and(|validity| validity.score() < IMPROVEMENT_THRESHOLD)
}

/// Asks the model for rewritten prompts likely to score better
pub struct SuggestionGenerator {
    backend: Arc<dyn SuggestionCapability>,
    max_suggestions: usize,
}

impl SuggestionGenerator {
    pub fn new(backend: Arc<dyn SuggestionCapability>, max_suggestions: usize) -> Self {
        Self {
            backend,
            max_suggestions,
        }
    }

    /// Suggested prompts, best first
    pub async fn suggest(
        &self,
        original_prompt: &str,
        generated_response: &str,
        result: &ValidationResult,
        model: &str,
    ) -> Result<Vec<String>, SuggestionError> {
        let instruction = self.build_instruction(original_prompt, generated_response, result);
        let raw = self.backend.propose(&instruction, model).await?;
        let suggestions = parse_suggestions(&raw, self.max_suggestions)?;
        tracing::debug!(count = suggestions.len(), "prompt suggestions received");
        Ok(suggestions)
    }

    fn build_instruction(
        &self,
        original_prompt: &str,
        generated_response: &str,
        result: &ValidationResult,
    ) -> String {
        let mut scores = String::new();
        for (label, metric) in result.metrics() {
            let _ = writeln!(
                scores,
                "- {label}: {:.0}/100 ({})",
                metric.score(),
                metric.justification()
            );
        }

        format!(
            "A user sent the prompt below to an AI model. The response was evaluated and \
             received low quality scores. Suggest {count} improved versions of the prompt \
             that are more specific, give the model useful context, and are more likely to \
             produce a factual and valid answer. Order them from most to least recommended. \
             Return only the rewritten prompts.\n\n\
             Original Prompt: \"{original_prompt}\"\n\
             AI Response: \"{generated_response}\"\n\
             Scores:\n{scores}",
            count = self.max_suggestions,
        )
    }
}

/// Pull the ordered suggestion list out of the model's payload
fn parse_suggestions(raw: &str, max_suggestions: usize) -> Result<Vec<String>, SuggestionError> {
    let parsed = parse_json_response(raw)
        .ok_or_else(|| SuggestionError::Malformed("no JSON object in payload".to_string()))?;
    let items = parsed
        .get("suggestions")
        .and_then(Value::as_array)
        .ok_or_else(|| SuggestionError::Malformed("missing suggestions array".to_string()))?;

    let mut suggestions: Vec<String> = Vec::with_capacity(max_suggestions);
    for text in items.iter().filter_map(Value::as_str).map(str::trim) {
        if suggestions.len() == max_suggestions {
            break;
        }
        if text.is_empty() || suggestions.iter().any(|s| s == text) {
            continue;
        }
        suggestions.push(text.to_string());
    }
    Ok(suggestions)
}
