//! Synthetic survey data generation.
//!
//! The [`DataGenerator`] asks an LLM for a workspace with members, surveys,
//! questions and responses, then turns the answer into a [`GeneratedRecord`]
//! with provisional ids. Model output is untrusted: unparseable answers are
//! retried with a clarifying re-prompt, and structural checks are left to
//! the schema validator.
//!
//! ```ignore
//! use formseed::generator::DataGenerator;
//! use formseed::model::GenerationRequest;
//!
//! let generator = DataGenerator::new(provider, GeneratorConfig::default());
//! let record = generator.generate(&GenerationRequest::default()).await?;
//! ```

pub mod draft;
pub mod prompts;

pub use draft::DraftPayload;

use std::sync::Arc;

use crate::config::GeneratorConfig;
use crate::error::GenerationError;
use crate::llm::{CompletionRequest, FormatHint, LlmProvider, Message};
use crate::model::{GeneratedRecord, GenerationRequest};
use crate::utils::extract_json_object;
use uuid::Uuid;

/// LLM-backed generator of survey trees.
pub struct DataGenerator {
    llm_client: Arc<dyn LlmProvider>,
    config: GeneratorConfig,
}

impl std::fmt::Debug for DataGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataGenerator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DataGenerator {
    pub fn new(llm_client: Arc<dyn LlmProvider>, config: GeneratorConfig) -> Self {
        Self { llm_client, config }
    }

    pub fn with_defaults(llm_client: Arc<dyn LlmProvider>) -> Self {
        Self::new(llm_client, GeneratorConfig::default())
    }

    /// Generate a record tree for `request`.
    ///
    /// Issues one completion, plus up to `max_parse_retries` clarifying
    /// re-prompts when the answer cannot be parsed. Provider errors are not
    /// retried here; the provider already retries transient ones.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedRecord, GenerationError> {
        check_request(request)?;

        let prompt = prompts::render_generation_prompt(request);
        let max_attempts = self.config.max_parse_retries + 1;
        let mut failed_output: Option<(String, String)> = None;

        for attempt in 1..=max_attempts {
            let mut messages = vec![
                Message::system(prompts::GENERATION_SYSTEM_PROMPT),
                Message::user(prompt.clone()),
            ];
            if let Some((output, error)) = &failed_output {
                messages.push(Message::assistant(output.clone()));
                messages.push(Message::user(prompts::render_clarification(error)));
            }

            let completion = CompletionRequest::new(self.config.model.clone(), messages)
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_tokens)
                .with_format_hint(FormatHint::JsonObject);

            let response = self.llm_client.complete(completion).await?;
            let content = response.first_content().unwrap_or_default().to_string();

            match parse_output(&content) {
                Ok(record) => {
                    tracing::info!(
                        attempt,
                        surveys = record.workspace.surveys.len(),
                        members = record.workspace.members.len(),
                        entities = record.entity_count(),
                        "Generated survey data"
                    );
                    if record.workspace.surveys.len() != request.surveys {
                        tracing::warn!(
                            requested = request.surveys,
                            generated = record.workspace.surveys.len(),
                            "Model returned a different number of surveys than requested"
                        );
                    }
                    return Ok(record);
                }
                Err(error) => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %error,
                        "Model output could not be parsed, re-prompting"
                    );
                    failed_output = Some((content, error));
                }
            }
        }

        Err(GenerationError::Unparseable {
            attempts: max_attempts,
            last_error: failed_output.map(|(_, e)| e).unwrap_or_default(),
        })
    }
}

fn check_request(request: &GenerationRequest) -> Result<(), GenerationError> {
    if request.surveys == 0 {
        return Err(GenerationError::InvalidRequest(
            "at least one survey must be requested".to_string(),
        ));
    }
    if request.questions_per_survey == 0 {
        return Err(GenerationError::InvalidRequest(
            "surveys need at least one question".to_string(),
        ));
    }
    Ok(())
}

/// Parse one model answer; the error string is fed back to the model.
fn parse_output(content: &str) -> Result<GeneratedRecord, String> {
    if content.trim().is_empty() {
        return Err("the response was empty".to_string());
    }
    let json = extract_json_object(content).map_err(|e| e.to_string())?;
    let draft = DraftPayload::parse(&json).map_err(|e| format!("invalid structure: {e}"))?;
    Ok(draft.into_record(Uuid::new_v4().to_string()))
}
