//! Data model of the generated survey tree.
//!
//! A [`GeneratedRecord`] is produced once by the data generator and never
//! mutated afterwards. Every node carries a [`ProvisionalId`], a locally
//! unique identifier used to link children to parents before anything
//! exists on the platform.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameters of one data generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Number of surveys to generate.
    pub surveys: usize,
    /// Questions per survey.
    pub questions_per_survey: usize,
    /// Responses per question.
    pub responses_per_question: usize,
    /// Workspace members to generate.
    pub members: usize,
    /// Topic or domain hints (e.g. "customer feedback").
    pub topics: Vec<String>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            surveys: 5,
            questions_per_survey: 4,
            responses_per_question: 3,
            members: 10,
            topics: vec![
                "customer feedback".to_string(),
                "product research".to_string(),
            ],
        }
    }
}

/// Locally assigned identifier of a generated entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvisionalId(pub String);

impl ProvisionalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a child id nested under this one.
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        Self(format!("{}/{}", self.0, segment))
    }
}

impl fmt::Display for ProvisionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned by the platform on successful creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformId(pub String);

impl PlatformId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of entity materialized by one platform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Workspace,
    Member,
    Survey,
    Question,
    Response,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Workspace => "workspace",
            EntityKind::Member => "member",
            EntityKind::Survey => "survey",
            EntityKind::Question => "question",
            EntityKind::Response => "response",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "workspace" => Some(EntityKind::Workspace),
            "member" => Some(EntityKind::Member),
            "survey" => Some(EntityKind::Survey),
            "question" => Some(EntityKind::Question),
            "response" => Some(EntityKind::Response),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root of the generated tree.
///
/// `record_id` is assigned once per generation run. Seeding state is kept
/// per record id, so regenerating data never reuses another record's
/// progress even though provisional ids repeat between records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRecord {
    #[serde(default)]
    pub record_id: String,
    pub workspace: Workspace,
}

impl GeneratedRecord {
    /// Total number of entities that seeding has to create.
    pub fn entity_count(&self) -> usize {
        let ws = &self.workspace;
        1 + ws.members.len()
            + ws
                .surveys
                .iter()
                .map(|s| {
                    1 + s.questions.len()
                        + s.questions.iter().map(|q| q.responses.len()).sum::<usize>()
                })
                .sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: ProvisionalId,
    pub name: String,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub surveys: Vec<Survey>,
}

/// Role of a workspace member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Manager,
    Member,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: ProvisionalId,
    pub workspace_id: ProvisionalId,
    pub name: String,
    pub email: String,
    pub role: MemberRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub id: ProvisionalId,
    pub workspace_id: ProvisionalId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Question types understood by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionKind {
    OpenText,
    MultipleChoiceSingle,
    MultipleChoiceMulti,
    Rating,
}

impl QuestionKind {
    pub fn is_multiple_choice(&self) -> bool {
        matches!(
            self,
            QuestionKind::MultipleChoiceSingle | QuestionKind::MultipleChoiceMulti
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: ProvisionalId,
    pub survey_id: ProvisionalId,
    pub kind: QuestionKind,
    pub headline: String,
    #[serde(default)]
    pub choices: Vec<String>,
    /// Upper bound of a rating scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<u8>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub responses: Vec<Response>,
}

/// One answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: ProvisionalId,
    pub question_id: ProvisionalId,
    pub answer: serde_json::Value,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use serde_json::json;

    /// Small, valid tree: one member, two surveys, two questions each,
    /// one response per question.
    pub fn sample_record() -> GeneratedRecord {
        let ws = ProvisionalId::new("ws");
        let mut surveys = Vec::new();
        for s in 0..2 {
            let sid = ws.child(format!("survey-{s}"));
            let q_open = sid.child("q1");
            let q_choice = sid.child("q2");
            surveys.push(Survey {
                id: sid.clone(),
                workspace_id: ws.clone(),
                name: format!("Survey {s}"),
                description: None,
                questions: vec![
                    Question {
                        id: q_open.clone(),
                        survey_id: sid.clone(),
                        kind: QuestionKind::OpenText,
                        headline: "What could we improve?".to_string(),
                        choices: vec![],
                        range: None,
                        required: false,
                        responses: vec![Response {
                            id: q_open.child("r0"),
                            question_id: q_open.clone(),
                            answer: json!("Faster onboarding"),
                        }],
                    },
                    Question {
                        id: q_choice.clone(),
                        survey_id: sid.clone(),
                        kind: QuestionKind::MultipleChoiceSingle,
                        headline: "How did you hear about us?".to_string(),
                        choices: vec!["Search".to_string(), "Friend".to_string()],
                        range: None,
                        required: true,
                        responses: vec![Response {
                            id: q_choice.child("r0"),
                            question_id: q_choice.clone(),
                            answer: json!("Friend"),
                        }],
                    },
                ],
            });
        }

        GeneratedRecord {
            record_id: "sample-record".to_string(),
            workspace: Workspace {
                id: ws.clone(),
                name: "Acme Research".to_string(),
                members: vec![Member {
                    id: ws.child("member-0"),
                    workspace_id: ws.clone(),
                    name: "Dana Smith".to_string(),
                    email: "dana@acme.test".to_string(),
                    role: MemberRole::Owner,
                }],
                surveys,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_record;
    use super::*;

    #[test]
    fn test_provisional_id_child() {
        let ws = ProvisionalId::new("ws");
        assert_eq!(ws.child("survey-0").as_str(), "ws/survey-0");
        assert_eq!(ws.child(3).child("q1").to_string(), "ws/3/q1");
    }

    #[test]
    fn test_entity_count() {
        // 1 workspace + 1 member + 2 * (1 survey + 2 questions + 2 responses)
        assert_eq!(sample_record().entity_count(), 12);
    }

    #[test]
    fn test_entity_kind_parse() {
        for kind in [
            EntityKind::Workspace,
            EntityKind::Member,
            EntityKind::Survey,
            EntityKind::Question,
            EntityKind::Response,
        ] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("user"), None);
    }

    #[test]
    fn test_question_kind_serde() {
        let json = serde_json::to_string(&QuestionKind::MultipleChoiceSingle).unwrap();
        assert_eq!(json, "\"multipleChoiceSingle\"");
        let kind: QuestionKind = serde_json::from_str("\"openText\"").unwrap();
        assert_eq!(kind, QuestionKind::OpenText);
    }
}
