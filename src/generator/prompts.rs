//! Prompt templates for survey data generation.

use crate::model::GenerationRequest;

/// System prompt for the generation conversation.
pub const GENERATION_SYSTEM_PROMPT: &str =
    "You generate realistic seed data for a survey platform. Output only valid JSON, no prose.";

/// User prompt template; placeholders are filled by [`render_generation_prompt`].
const GENERATION_PROMPT: &str = r#"
Generate realistic data for seeding a survey platform so it looks like an actively used system.
Topics to draw from: {topics}.

Return one JSON object with exactly these keys:
- "workspace": {"name": string}
- "members": an array of {members} unique team members, each {"name": string, "email": unique string, "role": "owner" | "manager" | "member"}
- "surveys": an array of {surveys} unique surveys, each with:
  - "name": string title
  - "description": short string
  - "questions": an array of {questions} questions, each with:
    - "type": one of "openText", "multipleChoiceSingle", "multipleChoiceMulti", "rating"
    - "headline": the question text
    - "choices": array of at least 2 strings (multipleChoice types only)
    - "range": maximum rating, 3 to 10 (rating type only)
    - "required": boolean
    - "responses": an array of {responses} answers. openText answers are strings,
      multipleChoiceSingle answers are one of the choices, multipleChoiceMulti answers are
      arrays of choices, rating answers are integers between 1 and range.

Vary tone and content across surveys and answers. Ensure the JSON is parseable.
"#;

/// Follow-up sent when the previous answer could not be used.
const CLARIFICATION_PROMPT: &str = r#"
Your previous answer could not be used: {error}.
Reply again with the complete JSON object only, following the requested keys and types exactly.
Do not wrap it in explanations.
"#;

/// Fill the generation template for `request`.
pub fn render_generation_prompt(request: &GenerationRequest) -> String {
    let topics = if request.topics.is_empty() {
        "customer feedback, product research".to_string()
    } else {
        request.topics.join(", ")
    };

    GENERATION_PROMPT
        .replace("{topics}", &topics)
        .replace("{members}", &request.members.to_string())
        .replace("{surveys}", &request.surveys.to_string())
        .replace("{questions}", &request.questions_per_survey.to_string())
        .replace("{responses}", &request.responses_per_question.to_string())
}

/// Fill the clarification template with the parse error.
pub fn render_clarification(error: &str) -> String {
    CLARIFICATION_PROMPT.replace("{error}", error)
}
