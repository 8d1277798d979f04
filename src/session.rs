use crate::account::AccountStore;
use crate::error::SessionError;
use crate::llm::{GenerationCapability, ScoringCapability, SuggestionCapability};
use crate::models::{RunReport, SuggestionOutcome};
use crate::suggestions::{SuggestionGenerator, needs_improvement};
use crate::validator::Validator;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Drives validation runs on behalf of the signed-in user
pub struct Session {
    accounts: Arc<dyn AccountStore>,
    validator: Validator,
    suggestions: SuggestionGenerator,
    storage_path: Option<PathBuf>,
}

impl Session {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        generator: Arc<dyn GenerationCapability>,
        scorer: Arc<dyn ScoringCapability>,
        suggester: Arc<dyn SuggestionCapability>,
        max_suggestions: usize,
    ) -> Self {
        Self {
            accounts,
            validator: Validator::new(generator, scorer),
            suggestions: SuggestionGenerator::new(suggester, max_suggestions),
            storage_path: None,
        }
    }

    /// Write every completed report to `path` as JSON
    pub fn with_storage_path(mut self, path: Option<PathBuf>) -> Self {
        self.storage_path = path;
        self
    }

    /// Run one validation, spend one use, and fetch suggestions when scores are low
    pub async fn validate(
        &self,
        prompt: &str,
        reference: &str,
        model: &str,
    ) -> Result<RunReport, SessionError> {
        let user = self
            .accounts
            .current_user()?
            .ok_or(SessionError::NotSignedIn)?;
        if user.uses_remaining == 0 {
            return Err(SessionError::OutOfUses);
        }
        if prompt.trim().is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        if model.trim().is_empty() {
            return Err(SessionError::EmptyModel);
        }

        let result = self.validator.run(prompt, reference, model).await?;

        let uses_remaining = match self.accounts.decrement_usage(&user.email) {
            Ok(charged) => Some(charged.uses_remaining),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    email = %user.email,
                    uses_before_run = user.uses_remaining,
                    "failed to record usage for a completed run"
                );
                None
            }
        };

        let suggestions = if needs_improvement(&result) {
            match self
                .suggestions
                .suggest(prompt, &result.ai_response, &result, model)
                .await
            {
                Ok(prompts) => SuggestionOutcome::Suggested { prompts },
                Err(e) => {
                    tracing::warn!(error = %e, "failed to get prompt suggestions");
                    SuggestionOutcome::Unavailable {
                        reason: e.to_string(),
                    }
                }
            }
        } else {
            SuggestionOutcome::NotNeeded
        };

        let reference = Some(reference.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        let report = RunReport {
            prompt: prompt.to_string(),
            reference,
            model: model.to_string(),
            result,
            suggestions,
            uses_remaining,
        };

        if let Err(e) = self.store_report_if_configured(&report) {
            tracing::warn!(error = %format!("{e:#}"), "failed to store run report");
        }
        Ok(report)
    }

    /// Store the report if a storage path is configured
    fn store_report_if_configured(&self, report: &RunReport) -> Result<()> {
        if let Some(storage_path) = &self.storage_path {
            tracing::debug!(path = %storage_path.display(), "storing run report");
            store_report(report, storage_path)?;
        }
        Ok(())
    }
}

/// Store a run report to a JSON file
fn store_report(report: &RunReport, path: &Path) -> Result<()> {
    let json_content =
        serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;
    ensure_directory_exists(path)?;
    std::fs::write(path, json_content)
        .with_context(|| format!("Failed to write report to: {}", path.display()))?;
    tracing::info!(path = %path.display(), "run report stored");
    Ok(())
}

/// Ensure the directory for the report file exists
fn ensure_directory_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
