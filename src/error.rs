//! Error types for formseed operations.
//!
//! Defines error types for every subsystem of the generate-and-seed pipeline:
//! - LLM provider calls and data generation
//! - Schema validation of generated records
//! - Platform REST API calls
//! - Seeding state persistence and orchestration
//! - Platform lifecycle (container start/stop/readiness)

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur while generating survey data.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Model output unusable after {attempts} attempts: {last_error}")]
    Unparseable { attempts: u32, last_error: String },

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),
}

/// A single structural defect found in a generated record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Path of the offending node (e.g. `surveys[0].questions[2].headline`).
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors that can occur during validation operations.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Generated data has {} structural violation(s): {}", .0.len(), format_violations(.0))]
    Violations(Vec<Violation>),
}

impl ValidationError {
    /// The violations carried by this error.
    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationError::Violations(v) => v,
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by the platform API client.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// Non-retryable response, or retryable one after the budget ran out.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// 401/403: the credential is rejected, every later call would fail too.
    #[error("Authentication rejected ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected API response: {0}")]
    InvalidResponse(String),

    /// 2xx whose body carries no readable id. The entity most likely exists
    /// on the platform, so it must not be submitted again.
    #[error("Request accepted ({status}) but no id could be read: {body}")]
    Unconfirmed { status: u16, body: String },
}

impl PlatformError {
    /// Whether this error must abort the whole seeding run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlatformError::Auth { .. })
    }
}

/// Errors that can occur in the seeding state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt state entry '{id}': {reason}")]
    Corrupt { id: String, reason: String },
}

/// Errors that abort a seeding run.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Seeding aborted, platform rejected credentials: {0}")]
    Auth(PlatformError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Seeding state store failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised by the container runtime collaborator.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during platform lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Platform did not become ready within {}s", .waited.as_secs())]
    StartupTimeout { waited: Duration },

    #[error("Teardown failed: {0}")]
    Teardown(RuntimeError),

    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Cannot {action} while platform is {from}")]
    InvalidTransition { from: String, action: String },
}
