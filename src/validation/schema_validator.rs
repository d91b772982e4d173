//! Schema validation for generated survey data.
//!
//! Checks a [`GeneratedRecord`] against the shapes the platform requires
//! before any seeding request is issued. Validation is pure: it never
//! mutates the record and performs no I/O.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::{ValidationError, Violation};
use crate::model::{GeneratedRecord, ProvisionalId, Question, QuestionKind, Response};

/// Rating scale used when a rating question declares none.
pub const DEFAULT_RATING_RANGE: u8 = 5;

/// Result of validating a record against the schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidationResult {
    /// Whether the record passes all required validations.
    pub valid: bool,
    /// Defects that block seeding.
    pub errors: Vec<Violation>,
    /// Non-blocking observations.
    pub warnings: Vec<String>,
}

impl SchemaValidationResult {
    /// Create a new valid result with no errors or warnings.
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(Violation {
            field: field.into(),
            message: message.into(),
        });
        self.valid = false;
    }

    /// Add a warning to the result.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Validator for generated records.
pub struct SchemaValidator;

impl SchemaValidator {
    /// Gate used before seeding: the record itself on success, every
    /// violation otherwise.
    pub fn check(record: &GeneratedRecord) -> Result<&GeneratedRecord, ValidationError> {
        let result = Self::validate(record);
        for warning in &result.warnings {
            tracing::warn!(warning = %warning, "Generated data warning");
        }
        if result.valid {
            Ok(record)
        } else {
            Err(ValidationError::Violations(result.errors))
        }
    }

    /// Validate a record against the schema.
    ///
    /// Performs the following validations:
    /// - required names, headlines and emails are present
    /// - provisional ids are unique and every parent reference matches the
    ///   node the entity is nested under
    /// - every survey has questions; multiple-choice questions have choices
    /// - every response references a known question and its answer fits
    ///   the question type
    pub fn validate(record: &GeneratedRecord) -> SchemaValidationResult {
        let mut result = SchemaValidationResult::valid();
        let ws = &record.workspace;

        if record.record_id.trim().is_empty() {
            result.add_error(
                "record_id",
                "Record id is missing; regenerate the data with `formseed generate`",
            );
        }
        if ws.id.as_str().is_empty() {
            result.add_error("workspace.id", "Workspace id cannot be empty");
        }
        if ws.name.trim().is_empty() {
            result.add_error("workspace.name", "Workspace name cannot be empty");
        }

        Self::check_unique_ids(record, &mut result);

        // Members
        let mut emails = HashSet::new();
        for (i, member) in ws.members.iter().enumerate() {
            let field = format!("members[{i}]");
            if member.workspace_id != ws.id {
                result.add_error(
                    format!("{field}.workspace_id"),
                    format!("References unknown workspace '{}'", member.workspace_id),
                );
            }
            if member.name.trim().is_empty() {
                result.add_error(format!("{field}.name"), "Member name cannot be empty");
            }
            if !is_plausible_email(&member.email) {
                result.add_error(
                    format!("{field}.email"),
                    format!("'{}' is not a valid email address", member.email),
                );
            } else if !emails.insert(member.email.to_lowercase()) {
                result.add_error(
                    format!("{field}.email"),
                    format!("Duplicate email '{}'", member.email),
                );
            }
        }
        if !ws.members.is_empty()
            && !ws
                .members
                .iter()
                .any(|m| m.role == crate::model::MemberRole::Owner)
        {
            result.add_warning("No member has the owner role");
        }

        // Surveys
        if ws.surveys.is_empty() {
            result.add_error("surveys", "Workspace has no surveys");
        }

        let question_owner: HashMap<&ProvisionalId, &ProvisionalId> = ws
            .surveys
            .iter()
            .flat_map(|s| s.questions.iter().map(move |q| (&q.id, &s.id)))
            .collect();

        let mut survey_names = HashSet::new();
        for (i, survey) in ws.surveys.iter().enumerate() {
            let field = format!("surveys[{i}]");
            if survey.workspace_id != ws.id {
                result.add_error(
                    format!("{field}.workspace_id"),
                    format!("References unknown workspace '{}'", survey.workspace_id),
                );
            }
            if survey.name.trim().is_empty() {
                result.add_error(format!("{field}.name"), "Survey name cannot be empty");
            } else if !survey_names.insert(survey.name.trim().to_lowercase()) {
                result.add_warning(format!("Survey name '{}' is used twice", survey.name));
            }
            if survey.questions.is_empty() {
                result.add_error(format!("{field}.questions"), "Survey has no questions");
            }

            for (j, question) in survey.questions.iter().enumerate() {
                let qfield = format!("{field}.questions[{j}]");
                if question.survey_id != survey.id {
                    result.add_error(
                        format!("{qfield}.survey_id"),
                        format!(
                            "References survey '{}' but is nested under '{}'",
                            question.survey_id, survey.id
                        ),
                    );
                }
                Self::check_question(question, &qfield, &mut result);

                if question.responses.is_empty() {
                    result.add_warning(format!("Question '{}' has no responses", question.id));
                }
                for (k, response) in question.responses.iter().enumerate() {
                    let rfield = format!("{qfield}.responses[{k}]");
                    if response.question_id != question.id {
                        let message = if question_owner.contains_key(&response.question_id) {
                            format!(
                                "References question '{}' but is nested under '{}'",
                                response.question_id, question.id
                            )
                        } else {
                            format!("References unknown question '{}'", response.question_id)
                        };
                        result.add_error(format!("{rfield}.question_id"), message);
                        continue;
                    }
                    Self::check_answer(question, response, &rfield, &mut result);
                }
            }
        }

        result
    }

    fn check_unique_ids(record: &GeneratedRecord, result: &mut SchemaValidationResult) {
        let ws = &record.workspace;
        let ids = std::iter::once(&ws.id)
            .chain(ws.members.iter().map(|m| &m.id))
            .chain(ws.surveys.iter().flat_map(|s| {
                std::iter::once(&s.id).chain(
                    s.questions
                        .iter()
                        .flat_map(|q| std::iter::once(&q.id).chain(q.responses.iter().map(|r| &r.id))),
                )
            }));

        let mut seen = HashSet::new();
        for id in ids {
            if id.as_str().is_empty() {
                result.add_error("id", "Provisional id cannot be empty");
            } else if !seen.insert(id) {
                result.add_error("id", format!("Duplicate provisional id '{id}'"));
            }
        }
    }

    fn check_question(question: &Question, field: &str, result: &mut SchemaValidationResult) {
        if question.headline.trim().is_empty() {
            result.add_error(format!("{field}.headline"), "Question headline cannot be empty");
        }

        if question.kind.is_multiple_choice() {
            if question.choices.len() < 2 {
                result.add_error(
                    format!("{field}.choices"),
                    "Multiple-choice questions need at least 2 choices",
                );
            }
            let mut seen = HashSet::new();
            for choice in &question.choices {
                if choice.trim().is_empty() {
                    result.add_error(format!("{field}.choices"), "Choices cannot be empty");
                } else if !seen.insert(choice.as_str()) {
                    result.add_error(
                        format!("{field}.choices"),
                        format!("Duplicate choice '{choice}'"),
                    );
                }
            }
        } else if !question.choices.is_empty() {
            result.add_warning(format!(
                "Question '{}' has choices but is not multiple-choice; they will be ignored",
                question.id
            ));
        }

        if question.kind == QuestionKind::Rating {
            let range = question.range.unwrap_or(DEFAULT_RATING_RANGE);
            if !(2..=10).contains(&range) {
                result.add_error(
                    format!("{field}.range"),
                    format!("Rating range must be between 2 and 10, got {range}"),
                );
            }
        }
    }

    fn check_answer(
        question: &Question,
        response: &Response,
        field: &str,
        result: &mut SchemaValidationResult,
    ) {
        let field = format!("{field}.answer");
        match (question.kind, &response.answer) {
            (_, Value::Null) => result.add_error(field, "Answer cannot be null"),
            (QuestionKind::OpenText, Value::String(s)) => {
                if s.trim().is_empty() {
                    result.add_error(field, "Open text answer cannot be empty");
                }
            }
            (QuestionKind::OpenText, _) => {
                result.add_error(field, "Open text answer must be a string")
            }
            (QuestionKind::MultipleChoiceSingle, Value::String(s)) => {
                if !question.choices.contains(s) {
                    result.add_error(field, format!("'{s}' is not one of the choices"));
                }
            }
            (QuestionKind::MultipleChoiceSingle, _) => {
                result.add_error(field, "Single-choice answer must be a string")
            }
            (QuestionKind::MultipleChoiceMulti, Value::Array(items)) => {
                if items.is_empty() {
                    result.add_error(field.clone(), "Multi-choice answer cannot be empty");
                }
                for item in items {
                    match item.as_str() {
                        Some(s) if question.choices.iter().any(|c| c == s) => {}
                        Some(s) => {
                            result.add_error(field.clone(), format!("'{s}' is not one of the choices"))
                        }
                        None => result.add_error(field.clone(), "Multi-choice items must be strings"),
                    }
                }
            }
            (QuestionKind::MultipleChoiceMulti, _) => {
                result.add_error(field, "Multi-choice answer must be an array")
            }
            (QuestionKind::Rating, value) => {
                let range = u64::from(question.range.unwrap_or(DEFAULT_RATING_RANGE));
                match value.as_u64() {
                    Some(n) if (1..=range).contains(&n) => {}
                    _ => result.add_error(
                        field,
                        format!("Rating answer must be an integer between 1 and {range}"),
                    ),
                }
            }
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
