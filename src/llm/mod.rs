//! LLM integration for formseed.
//!
//! The generator talks to a model through the [`LlmProvider`] trait; the
//! OpenAI-compatible provider is the production implementation.
//!
//! ```ignore
//! use formseed::llm::{CompletionRequest, LlmProvider, Message, OpenAiProvider};
//!
//! let provider = OpenAiProvider::with_model(api_key, "gpt-4".to_string());
//! let request = CompletionRequest::new("", vec![Message::user("Hello")]);
//! let response = provider.complete(request).await?;
//! ```

pub mod completion;
pub mod providers;

pub use completion::{
    Choice, CompletionRequest, CompletionResponse, FormatHint, LlmProvider, Message, Usage,
};
pub use providers::OpenAiProvider;
