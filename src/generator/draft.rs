//! Shape of the model's answer and its conversion into a [`GeneratedRecord`].
//!
//! The model never invents identifiers: it nests members, questions and
//! responses under their parents, and provisional ids are derived from the
//! nesting path here. That keeps every child link internally consistent no
//! matter what the model writes.

use serde::Deserialize;

use crate::model::{
    GeneratedRecord, Member, MemberRole, ProvisionalId, Question, QuestionKind, Response,
    Survey, Workspace,
};

/// Provisional id of the workspace root.
pub const WORKSPACE_ID: &str = "ws";

#[derive(Debug, Clone, Deserialize)]
pub struct DraftPayload {
    pub workspace: DraftWorkspace,
    #[serde(default, alias = "users")]
    pub members: Vec<DraftMember>,
    pub surveys: Vec<DraftSurvey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftWorkspace {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftMember {
    pub name: String,
    pub email: String,
    pub role: DraftRole,
}

/// Member role as written by the model; capitalization varies.
#[derive(Debug, Clone, Copy, Deserialize)]
pub enum DraftRole {
    #[serde(alias = "Owner", alias = "OWNER")]
    #[serde(rename = "owner")]
    Owner,
    #[serde(alias = "Manager", alias = "MANAGER")]
    #[serde(rename = "manager")]
    Manager,
    #[serde(alias = "Member", alias = "MEMBER")]
    #[serde(rename = "member")]
    Member,
}

impl From<DraftRole> for MemberRole {
    fn from(role: DraftRole) -> Self {
        match role {
            DraftRole::Owner => MemberRole::Owner,
            DraftRole::Manager => MemberRole::Manager,
            DraftRole::Member => MemberRole::Member,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftSurvey {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub questions: Vec<DraftQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftQuestion {
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub headline: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub range: Option<u8>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub responses: Vec<serde_json::Value>,
}

impl DraftPayload {
    /// Parse the model's JSON answer.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Assign provisional ids and build the record tree identified by
    /// `record_id`.
    pub fn into_record(self, record_id: impl Into<String>) -> GeneratedRecord {
        let ws_id = ProvisionalId::new(WORKSPACE_ID);

        let members = self
            .members
            .into_iter()
            .enumerate()
            .map(|(i, m)| Member {
                id: ws_id.child(format!("member-{i}")),
                workspace_id: ws_id.clone(),
                name: m.name.trim().to_string(),
                email: m.email.trim().to_string(),
                role: m.role.into(),
            })
            .collect();

        let surveys = self
            .surveys
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let survey_id = ws_id.child(format!("survey-{i}"));
                let questions = s
                    .questions
                    .into_iter()
                    .enumerate()
                    .map(|(j, q)| {
                        let question_id = survey_id.child(format!("q{}", j + 1));
                        let responses = q
                            .responses
                            .into_iter()
                            .enumerate()
                            .map(|(k, answer)| Response {
                                id: question_id.child(format!("r{k}")),
                                question_id: question_id.clone(),
                                answer,
                            })
                            .collect();
                        Question {
                            id: question_id,
                            survey_id: survey_id.clone(),
                            kind: q.kind,
                            headline: q.headline.trim().to_string(),
                            choices: q.choices,
                            range: q.range,
                            required: q.required,
                            responses,
                        }
                    })
                    .collect();
                Survey {
                    id: survey_id,
                    workspace_id: ws_id.clone(),
                    name: s.name.trim().to_string(),
                    description: s.description,
                    questions,
                }
            })
            .collect();

        GeneratedRecord {
            record_id: record_id.into(),
            workspace: Workspace {
                id: ws_id,
                name: self.workspace.name.trim().to_string(),
                members,
                surveys,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DRAFT: &str = r#"{
        "workspace": {"name": "Northwind Feedback"},
        "users": [
            {"name": "Ada", "email": "ada@northwind.test", "role": "Owner"},
            {"name": "Bo", "email": "bo@northwind.test", "role": "manager"}
        ],
        "surveys": [{
            "name": "Checkout experience",
            "questions": [
                {"type": "openText", "headline": "Anything to add?", "responses": ["No", "Faster shipping"]},
                {"type": "multipleChoiceSingle", "headline": "Did you finish?", "choices": ["Yes", "No"], "responses": ["Yes"]}
            ]
        }]
    }"#;

    #[test]
    fn test_parse_accepts_users_alias_and_role_case() {
        let draft = DraftPayload::parse(DRAFT).unwrap();
        assert_eq!(draft.members.len(), 2);
        assert!(matches!(draft.members[0].role, DraftRole::Owner));
        assert!(matches!(draft.members[1].role, DraftRole::Manager));
    }

    #[test]
    fn test_unknown_question_type_is_parse_error() {
        let bad = DRAFT.replace("openText", "freeform");
        assert!(DraftPayload::parse(&bad).is_err());
    }

    #[test]
    fn test_into_record_assigns_consistent_ids() {
        let record = DraftPayload::parse(DRAFT).unwrap().into_record("rec-1");
        let ws = &record.workspace;
        assert_eq!(ws.id.as_str(), "ws");
        assert_eq!(ws.members[1].id.as_str(), "ws/member-1");

        let survey = &ws.surveys[0];
        assert_eq!(survey.id.as_str(), "ws/survey-0");
        assert_eq!(survey.workspace_id, ws.id);

        let q1 = &survey.questions[0];
        assert_eq!(q1.id.as_str(), "ws/survey-0/q1");
        assert_eq!(q1.survey_id, survey.id);
        assert_eq!(q1.responses[1].id.as_str(), "ws/survey-0/q1/r1");
        assert_eq!(q1.responses[1].question_id, q1.id);
        assert_eq!(q1.responses[1].answer, json!("Faster shipping"));

        assert_eq!(record.entity_count(), 1 + 2 + 1 + 2 + 3);
    }
}
