use crate::error::ValidationError;
use crate::evaluation::{MetricEvaluator, MetricKind};
use crate::llm::{GenerationCapability, ScoringCapability};
use crate::models::{Metric, ReferenceCheck, ValidationResult};
use std::sync::Arc;
use tracing::Instrument;

/// Orchestrates one generate-then-score validation run
pub struct Validator {
    generator: Arc<dyn GenerationCapability>,
    evaluator: MetricEvaluator,
}

impl Validator {
    pub fn new(
        generator: Arc<dyn GenerationCapability>,
        scorer: Arc<dyn ScoringCapability>,
    ) -> Self {
        Self {
            generator,
            evaluator: MetricEvaluator::new(scorer),
        }
    }

    /// Generate a response for `prompt` and score it.
    ///
    /// Similarity and validity are only scored when `reference` has
    /// non-whitespace content. Only a failed generation call is an error; every
    /// scoring failure is already folded into a degraded metric.
    pub async fn run(
        &self,
        prompt: &str,
        reference: &str,
        model: &str,
    ) -> Result<ValidationResult, ValidationError> {
        let reference = Some(reference.trim()).filter(|r| !r.is_empty());
        let span = tracing::info_span!("validation_run", model, with_reference = reference.is_some());

        async move {
            let response = self
                .generator
                .generate(prompt, model)
                .await
                .map_err(ValidationError::Generation)?;
            let ai_response = response.content;
            tracing::debug!(chars = ai_response.len(), "response generated, scoring");

            let (hallucination, toxicity, reference) = tokio::join!(
                self.score(MetricKind::Hallucination, prompt, &ai_response, "", model),
                self.score(MetricKind::Toxicity, prompt, &ai_response, "", model),
                self.score_against_reference(prompt, &ai_response, reference, model),
            );

            Ok::<_, ValidationError>(ValidationResult {
                ai_response,
                hallucination,
                toxicity,
                reference,
            })
        }
        .instrument(span)
        .await
    }

    async fn score_against_reference(
        &self,
        prompt: &str,
        response: &str,
        reference: Option<&str>,
        model: &str,
    ) -> ReferenceCheck {
        let Some(reference) = reference else {
            return ReferenceCheck::NotSupplied;
        };

        let (similarity, validity) = tokio::join!(
            self.score(MetricKind::Similarity, prompt, response, reference, model),
            self.score(MetricKind::Validity, prompt, response, reference, model),
        );
        ReferenceCheck::Compared {
            similarity,
            validity,
        }
    }

    async fn score(
        &self,
        kind: MetricKind,
        prompt: &str,
        response: &str,
        reference: &str,
        model: &str,
    ) -> Metric {
        let instruction = kind.instruction(prompt, response, reference);
        let metric = self
            .evaluator
            .evaluate(&instruction, model)
            .instrument(tracing::debug_span!("metric", metric = kind.name()))
            .await;
        tracing::debug!(metric = kind.name(), score = metric.score(), "metric scored");
        metric
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::models::{DEGRADED_JUSTIFICATION, ModelResponse};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // Mock generator for testing
    struct MockGenerator {
        should_fail: bool,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl MockGenerator {
        fn new() -> Self {
            Self {
                should_fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_failure() -> Self {
            Self {
                should_fail: true,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationCapability for MockGenerator {
        async fn generate(&self, prompt: &str, model: &str) -> Result<ModelResponse, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), model.to_string()));
            if self.should_fail {
                return Err(LlmError::Request("model not found".to_string()));
            }
            Ok(ModelResponse {
                content: format!("Mock answer to: {prompt}"),
                metadata: HashMap::new(),
            })
        }
    }

    // Mock scorer keyed on the opening words of each instruction
    struct MockScorer {
        failing: Vec<MetricKind>,
        instructions: Mutex<Vec<String>>,
    }

    impl MockScorer {
        fn new() -> Self {
            Self::failing(&[])
        }

        fn failing(kinds: &[MetricKind]) -> Self {
            Self {
                failing: kinds.to_vec(),
                instructions: Mutex::new(Vec::new()),
            }
        }

        fn kind_of(instruction: &str) -> MetricKind {
            if instruction.starts_with("Fact-check") {
                MetricKind::Hallucination
            } else if instruction.starts_with("Analyze") {
                MetricKind::Toxicity
            } else if instruction.starts_with("Compare") {
                MetricKind::Similarity
            } else {
                MetricKind::Validity
            }
        }

        fn calls(&self) -> usize {
            self.instructions.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ScoringCapability for MockScorer {
        async fn score(&self, instruction: &str, _model: &str) -> Result<String, LlmError> {
            self.instructions
                .lock()
                .unwrap()
                .push(instruction.to_string());
            let kind = Self::kind_of(instruction);
            if self.failing.contains(&kind) {
                return Err(LlmError::EmptyCompletion);
            }
            let score = match kind {
                MetricKind::Hallucination => 92,
                MetricKind::Toxicity => 99,
                MetricKind::Similarity => 75,
                MetricKind::Validity => 81,
            };
            Ok(format!(r#"{{"score": {score}, "justification": "{kind} checked"}}"#))
        }
    }

    /// Scorer that answers only once `expected` calls are waiting at the same time
    struct RendezvousScorer {
        barrier: tokio::sync::Barrier,
    }

    #[async_trait]
    impl ScoringCapability for RendezvousScorer {
        async fn score(&self, _instruction: &str, _model: &str) -> Result<String, LlmError> {
            self.barrier.wait().await;
            Ok(r#"{"score": 88, "justification": "checked"}"#.to_string())
        }
    }

    async fn run_with_rendezvous(expected: usize, reference: &str) -> ValidationResult {
        let scorer = Arc::new(RendezvousScorer {
            barrier: tokio::sync::Barrier::new(expected),
        });
        let validator = Validator::new(Arc::new(MockGenerator::new()), scorer);
        // Scoring one metric at a time would leave the first call waiting forever
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            validator.run("Prompt", reference, "gpt-4o-mini"),
        )
        .await
        .expect("metric calls were not in flight together")
        .unwrap()
    }

    #[tokio::test]
    async fn test_all_four_metrics_are_scored_concurrently() {
        let result = run_with_rendezvous(4, "Reference answer").await;
        assert_eq!(result.metrics().len(), 4);
        assert!(result.metrics().iter().all(|(_, m)| m.score() == 88.0));
    }

    #[tokio::test]
    async fn test_both_response_metrics_are_scored_concurrently() {
        let result = run_with_rendezvous(2, "").await;
        assert_eq!(result.metrics().len(), 2);
    }

    #[tokio::test]
    async fn test_run_takes_about_one_scoring_latency() {
        struct SlowScorer;

        #[async_trait]
        impl ScoringCapability for SlowScorer {
            async fn score(&self, _instruction: &str, _model: &str) -> Result<String, LlmError> {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                Ok(r#"{"score": 90, "justification": "slow"}"#.to_string())
            }
        }

        let validator = Validator::new(Arc::new(MockGenerator::new()), Arc::new(SlowScorer));
        let started = std::time::Instant::now();
        validator
            .run("Prompt", "Reference answer", "gpt-4o-mini")
            .await
            .unwrap();
        let elapsed = started.elapsed();

        // Four sequential calls would need 800ms
        assert!(elapsed < std::time::Duration::from_millis(600), "took {elapsed:?}");
    }

    fn validator(generator: MockGenerator, scorer: Arc<MockScorer>) -> Validator {
        Validator::new(Arc::new(generator), scorer)
    }

    #[tokio::test]
    async fn test_run_without_reference() {
        let scorer = Arc::new(MockScorer::new());
        let validator = validator(MockGenerator::new(), scorer.clone());

        let result = validator
            .run("What are the main benefits of learning React?", "", "gpt-4o-mini")
            .await
            .unwrap();

        assert!(!result.ai_response.is_empty());
        assert_eq!(result.hallucination.score(), 92.0);
        assert_eq!(result.toxicity.score(), 99.0);
        assert_eq!(result.reference, ReferenceCheck::NotSupplied);
        assert_eq!(scorer.calls(), 2);
    }

    #[tokio::test]
    async fn test_run_with_whitespace_reference() {
        let scorer = Arc::new(MockScorer::new());
        let validator = validator(MockGenerator::new(), scorer.clone());

        let result = validator.run("Explain DNS", "  \n\t ", "gpt-4o-mini").await.unwrap();

        assert!(result.similarity().is_none());
        assert!(result.validity().is_none());
        assert_eq!(scorer.calls(), 2);
    }

    #[tokio::test]
    async fn test_run_with_reference_scores_all_metrics() {
        let scorer = Arc::new(MockScorer::new());
        let validator = validator(MockGenerator::new(), scorer.clone());

        let result = validator
            .run(
                "Summarize photosynthesis",
                "Photosynthesis converts light into chemical energy",
                "gpt-4o-mini",
            )
            .await
            .unwrap();

        assert_eq!(result.similarity().map(Metric::score), Some(75.0));
        assert_eq!(result.validity().map(Metric::score), Some(81.0));
        assert_eq!(result.metrics().len(), 4);
        assert_eq!(scorer.calls(), 4);

        let instructions = scorer.instructions.lock().unwrap();
        let validity = instructions
            .iter()
            .find(|i| MockScorer::kind_of(i) == MetricKind::Validity)
            .unwrap();
        assert!(validity.contains("Summarize photosynthesis"));
        assert!(validity.contains("Photosynthesis converts light into chemical energy"));
    }

    #[tokio::test]
    async fn test_scoring_failure_degrades_only_that_metric() {
        let scorer = Arc::new(MockScorer::failing(&[MetricKind::Toxicity]));
        let validator = validator(MockGenerator::new(), scorer);

        let result = validator
            .run("Summarize photosynthesis", "Light to energy", "gpt-4o-mini")
            .await
            .unwrap();

        assert_eq!(result.toxicity.score(), 0.0);
        assert_eq!(result.toxicity.justification(), DEGRADED_JUSTIFICATION);
        assert_eq!(result.hallucination.score(), 92.0);
        assert_eq!(result.similarity().map(Metric::score), Some(75.0));
        assert_eq!(result.validity().map(Metric::score), Some(81.0));
    }

    #[tokio::test]
    async fn test_every_scoring_failure_still_completes() {
        let scorer = Arc::new(MockScorer::failing(&[
            MetricKind::Hallucination,
            MetricKind::Toxicity,
            MetricKind::Similarity,
            MetricKind::Validity,
        ]));
        let validator = validator(MockGenerator::new(), scorer);

        let result = validator
            .run("Summarize photosynthesis", "Light to energy", "gpt-4o-mini")
            .await
            .unwrap();

        for (_, metric) in result.metrics() {
            assert_eq!(metric, &Metric::degraded());
        }
    }

    #[tokio::test]
    async fn test_generation_failure_skips_scoring() {
        let scorer = Arc::new(MockScorer::new());
        let validator = validator(MockGenerator::with_failure(), scorer.clone());

        let err = validator
            .run("Summarize photosynthesis", "Light to energy", "gpt-4o-mini")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("model not found"));
        assert_eq!(scorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_model_is_passed_through() {
        let generator = Arc::new(MockGenerator::new());
        let validator = Validator::new(generator.clone(), Arc::new(MockScorer::new()));

        validator.run("Hello", "", "custom-model-id").await.unwrap();

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), [("Hello".to_string(), "custom-model-id".to_string())]);
    }
}
