//! Integration tests against a live OpenAI-compatible endpoint.
//!
//! These tests make real API calls.
//! Run with: OPENAI_API_KEY=your_key cargo test --test llm_integration -- --ignored

use std::sync::Arc;

use formseed::generator::DataGenerator;
use formseed::llm::{CompletionRequest, LlmProvider, Message, OpenAiProvider};
use formseed::model::GenerationRequest;
use formseed::validation::SchemaValidator;

fn create_test_provider() -> OpenAiProvider {
    let key = std::env::var("OPENAI_API_KEY")
        .expect("OPENAI_API_KEY environment variable must be set for integration tests");
    let model = std::env::var("FORMSEED_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    OpenAiProvider::with_model(key, model).expect("provider should build")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_completion() {
    let provider = create_test_provider();

    let request = CompletionRequest::new(
        "",
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_max_tokens(10)
    .with_temperature(0.0);

    let response = provider
        .complete(request)
        .await
        .expect("completion should succeed");
    let content = response.first_content().expect("Should have content");
    assert!(content.contains('4'), "Response should contain '4', got: {content}");
    assert!(response.usage.total_tokens > 0, "Should have token usage");
}

#[tokio::test]
#[ignore]
async fn test_generate_small_record() {
    let provider = Arc::new(create_test_provider());
    let generator = DataGenerator::with_defaults(provider);

    let request = GenerationRequest {
        surveys: 1,
        questions_per_survey: 2,
        responses_per_question: 2,
        members: 2,
        topics: vec!["employee onboarding".to_string()],
    };

    let record = generator
        .generate(&request)
        .await
        .expect("generation should succeed");

    assert!(!record.workspace.surveys.is_empty());
    let report = SchemaValidator::validate(&record);
    assert!(report.valid, "violations: {:?}", report.errors);
}
