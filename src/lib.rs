//! formseed: synthetic survey data for a local Formbricks instance.
//!
//! This library brings a local platform up, generates survey data with an
//! LLM, validates it, and seeds it through the platform's management API in
//! dependency order with durable, resumable progress.

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod llm;
pub mod model;
pub mod platform;
pub mod seeding;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use config::SeederConfig;
pub use error::{
    GenerationError, LifecycleError, LlmError, PlatformError, SeedError, StoreError,
    ValidationError,
};
pub use model::{GeneratedRecord, GenerationRequest};
