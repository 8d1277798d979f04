//! Language model capabilities and the OpenAI-compatible backend behind them.
//!
//! The validator only sees the three capability traits. [`OpenAiBackend`]
//! implements all of them over one chat-completions client, spacing requests
//! according to the configured rate limit.

use crate::config::Config;
use crate::error::LlmError;
use crate::models::ModelResponse;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
        ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Temperature for scoring and suggestion requests
const STRUCTURED_TEMPERATURE: f32 = 0.1;

/// Produces free text for a user prompt
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str) -> Result<ModelResponse, LlmError>;
}

/// Produces raw `{"score", "justification"}` JSON for an instruction
#[async_trait]
pub trait ScoringCapability: Send + Sync {
    async fn score(&self, instruction: &str, model: &str) -> Result<String, LlmError>;
}

/// Produces raw `{"suggestions": [...]}` JSON for an instruction
#[async_trait]
pub trait SuggestionCapability: Send + Sync {
    async fn propose(&self, instruction: &str, model: &str) -> Result<String, LlmError>;
}

fn score_schema() -> ResponseFormat {
    ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: Some("A quality score with a short justification".to_string()),
            name: "metric_score".to_string(),
            schema: Some(json!({
                "type": "object",
                "properties": {
                    "score": {
                        "type": "number",
                        "description": "A score from 0 to 100."
                    },
                    "justification": {
                        "type": "string",
                        "description": "A brief justification for the score."
                    }
                },
                "required": ["score", "justification"],
                "additionalProperties": false
            })),
            strict: Some(true),
        },
    }
}

fn suggestion_schema() -> ResponseFormat {
    ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: Some("Improved prompts, best first".to_string()),
            name: "prompt_suggestions".to_string(),
            schema: Some(json!({
                "type": "object",
                "properties": {
                    "suggestions": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["suggestions"],
                "additionalProperties": false
            })),
            strict: Some(true),
        },
    }
}

/// Chat-completions backend with request spacing
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    system_prompt: Option<String>,
    temperature: f64,
    max_tokens: u32,
    rate_limit_rps: f64,
    /// Last request time, shared by every capability
    last_request: Mutex<Option<Instant>>,
}

impl OpenAiBackend {
    /// Create a backend, reading the API key from the configured environment variable
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.env_var_api_key)
            .map_err(|_| LlmError::MissingApiKey(config.env_var_api_key.clone()))?;
        Self::new(api_key, config)
    }

    /// Create a backend with an explicit API key
    pub fn new(api_key: impl Into<String>, config: &Config) -> Result<Self, LlmError> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.api_endpoint);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            rate_limit_rps: config.rate_limit_rps,
            last_request: Mutex::new(None),
        })
    }

    /// Enforce rate limiting for API requests
    async fn enforce_rate_limit(last_request: &mut Option<Instant>, rate_limit_rps: f64) {
        if rate_limit_rps <= 0.0 {
            return;
        }

        let min_interval = Duration::from_secs_f64(1.0 / rate_limit_rps);

        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                let sleep_duration = min_interval - elapsed;
                sleep(sleep_duration).await;
            }
        }

        *last_request = Some(Instant::now());
    }

    fn user_message(content: &str) -> Result<ChatCompletionRequestMessage, LlmError> {
        Ok(ChatCompletionRequestUserMessageArgs::default()
            .content(content.to_string())
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?
            .into())
    }

    /// Build the chat completion request for a generation call
    fn build_generation_request(
        &self,
        prompt: &str,
        model: &str,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt.clone())
                    .build()
                    .map_err(|e| LlmError::Request(e.to_string()))?
                    .into(),
            );
        }
        messages.push(Self::user_message(prompt)?);

        CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(self.temperature as f32)
            .max_tokens(u16::try_from(self.max_tokens).unwrap_or(u16::MAX))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))
    }

    /// Build a request whose answer is constrained to a JSON schema
    fn build_structured_request(
        &self,
        instruction: &str,
        model: &str,
        response_format: ResponseFormat,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages([Self::user_message(instruction)?])
            .temperature(STRUCTURED_TEMPERATURE)
            .response_format(response_format)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))
    }

    async fn execute(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, LlmError> {
        {
            let mut last_request = self.last_request.lock().await;
            Self::enforce_rate_limit(&mut last_request, self.rate_limit_rps).await;
        }
        Ok(self.client.chat().create(request).await?)
    }

    /// Text of the first choice
    fn extract_content(response: &CreateChatCompletionResponse) -> Result<String, LlmError> {
        match response.choices.first().and_then(|c| c.message.content.as_deref()) {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            _ => Err(LlmError::EmptyCompletion),
        }
    }

    fn extract_metadata(response: &CreateChatCompletionResponse) -> HashMap<String, Value> {
        let mut metadata = HashMap::new();
        metadata.insert("model".to_string(), json!(response.model));
        if let Some(usage) = &response.usage {
            metadata.insert("prompt_tokens".to_string(), json!(usage.prompt_tokens));
            metadata.insert("completion_tokens".to_string(), json!(usage.completion_tokens));
            metadata.insert("total_tokens".to_string(), json!(usage.total_tokens));
        }
        metadata
    }
}

#[async_trait]
impl GenerationCapability for OpenAiBackend {
    async fn generate(&self, prompt: &str, model: &str) -> Result<ModelResponse, LlmError> {
        tracing::debug!(model, "requesting generation");
        let request = self.build_generation_request(prompt, model)?;
        let response = self.execute(request).await?;
        let content = Self::extract_content(&response)?;

        Ok(ModelResponse {
            content,
            metadata: Self::extract_metadata(&response),
        })
    }
}

#[async_trait]
impl ScoringCapability for OpenAiBackend {
    async fn score(&self, instruction: &str, model: &str) -> Result<String, LlmError> {
        tracing::debug!(model, "requesting score");
        let request = self.build_structured_request(instruction, model, score_schema())?;
        let response = self.execute(request).await?;
        Self::extract_content(&response)
    }
}

#[async_trait]
impl SuggestionCapability for OpenAiBackend {
    async fn propose(&self, instruction: &str, model: &str) -> Result<String, LlmError> {
        tracing::debug!(model, "requesting prompt suggestions");
        let request = self.build_structured_request(instruction, model, suggestion_schema())?;
        let response = self.execute(request).await?;
        Self::extract_content(&response)
    }
}
