//! Error types for the validator.
//!
//! Only [`ValidationError`] can abort a validation run. Scoring failures never
//! reach this module: the metric evaluator turns them into degraded metrics.

use thiserror::Error;

/// Failure talking to the language model backend
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Environment variable {0} not found")]
    MissingApiKey(String),

    #[error(transparent)]
    Api(#[from] async_openai::error::OpenAIError),

    #[error("Failed to build request: {0}")]
    Request(String),

    #[error("Model returned an empty completion")]
    EmptyCompletion,
}

/// The one failure that aborts a validation run
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Failed to generate response: {0}")]
    Generation(#[source] LlmError),
}

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("suggestion request failed: {0}")]
    Transport(#[from] LlmError),

    #[error("malformed suggestion payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("User with this email already exists.")]
    UserExists,

    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("You need to log in first.")]
    NotSignedIn,

    #[error("Please enter {0}.")]
    MissingField(&'static str),

    #[error("No account found for {0}.")]
    UnknownAccount(String),

    #[error("account store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("account store at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize account store: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
}

/// Failures surfaced to the person driving a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("You need to log in first.")]
    NotSignedIn,

    #[error("You are out of uses. Please upgrade your plan.")]
    OutOfUses,

    #[error("Please enter a prompt to validate.")]
    EmptyPrompt,

    #[error("Please enter a model name.")]
    EmptyModel,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Account(#[from] AccountError),
}

impl SessionError {
    /// Whether the caller should point the user at the plans
    pub fn suggests_upgrade(&self) -> bool {
        matches!(self, SessionError::OutOfUses)
    }
}
