//! Dependency-ordered seeding plan.
//!
//! The plan is computed once from a validated record. Entities are grouped
//! in levels: the workspace, then its members and surveys, then questions,
//! then responses. Every node lists its ancestors so the seeder can check
//! that all of them exist on the platform before dispatching it.

use crate::model::{
    EntityKind, GeneratedRecord, Member, ProvisionalId, Question, Response, Survey, Workspace,
};

/// Entity data carried by a plan node, stripped of its children.
#[derive(Debug, Clone, PartialEq)]
pub enum NodePayload {
    Workspace(Workspace),
    Member(Member),
    Survey(Survey),
    Question(Question),
    Response(Response),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedNode {
    pub id: ProvisionalId,
    pub kind: EntityKind,
    /// Root first, direct parent last.
    pub ancestors: Vec<ProvisionalId>,
    pub payload: NodePayload,
}

impl SeedNode {
    pub fn parent(&self) -> Option<&ProvisionalId> {
        self.ancestors.last()
    }

    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeedPlan {
    record_id: String,
    levels: Vec<Vec<SeedNode>>,
}

impl SeedPlan {
    pub fn from_record(record: &GeneratedRecord) -> Self {
        let ws = &record.workspace;
        let ws_id = ws.id.clone();

        let root = SeedNode {
            id: ws_id.clone(),
            kind: EntityKind::Workspace,
            ancestors: vec![],
            payload: NodePayload::Workspace(Workspace {
                members: vec![],
                surveys: vec![],
                ..ws.clone()
            }),
        };

        let mut second = Vec::new();
        let mut questions = Vec::new();
        let mut responses = Vec::new();

        for member in &ws.members {
            second.push(SeedNode {
                id: member.id.clone(),
                kind: EntityKind::Member,
                ancestors: vec![ws_id.clone()],
                payload: NodePayload::Member(member.clone()),
            });
        }

        for survey in &ws.surveys {
            second.push(SeedNode {
                id: survey.id.clone(),
                kind: EntityKind::Survey,
                ancestors: vec![ws_id.clone()],
                payload: NodePayload::Survey(Survey {
                    questions: vec![],
                    ..survey.clone()
                }),
            });

            for question in &survey.questions {
                questions.push(SeedNode {
                    id: question.id.clone(),
                    kind: EntityKind::Question,
                    ancestors: vec![ws_id.clone(), survey.id.clone()],
                    payload: NodePayload::Question(Question {
                        responses: vec![],
                        ..question.clone()
                    }),
                });

                for response in &question.responses {
                    responses.push(SeedNode {
                        id: response.id.clone(),
                        kind: EntityKind::Response,
                        ancestors: vec![ws_id.clone(), survey.id.clone(), question.id.clone()],
                        payload: NodePayload::Response(response.clone()),
                    });
                }
            }
        }

        let levels = [vec![root], second, questions, responses]
            .into_iter()
            .filter(|level| !level.is_empty())
            .collect();

        Self {
            record_id: record.record_id.clone(),
            levels,
        }
    }

    /// Id of the record this plan was built from.
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn levels(&self) -> &[Vec<SeedNode>] {
        &self.levels
    }

    /// All nodes in topological order.
    pub fn nodes(&self) -> impl Iterator<Item = &SeedNode> {
        self.levels.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::sample_record;
    use std::collections::HashSet;

    #[test]
    fn test_plan_covers_every_entity() {
        let record = sample_record();
        let plan = SeedPlan::from_record(&record);

        assert_eq!(plan.len(), record.entity_count());
        assert_eq!(plan.levels().len(), 4);
        assert_eq!(plan.levels()[0][0].kind, EntityKind::Workspace);
        assert_eq!(plan.levels()[1].len(), 3);
        assert_eq!(plan.levels()[2].len(), 4);
        assert_eq!(plan.levels()[3].len(), 4);
    }

    #[test]
    fn test_parents_precede_children() {
        let plan = SeedPlan::from_record(&sample_record());
        let mut seen = HashSet::new();

        for node in plan.nodes() {
            for ancestor in &node.ancestors {
                assert!(seen.contains(ancestor), "{} before {}", node.id, ancestor);
            }
            seen.insert(node.id.clone());
        }
    }

    #[test]
    fn test_response_ancestry() {
        let plan = SeedPlan::from_record(&sample_record());
        let response = plan
            .nodes()
            .find(|n| n.kind == EntityKind::Response)
            .unwrap();

        assert_eq!(response.depth(), 3);
        assert_eq!(response.ancestors[0].as_str(), "ws");
        assert_eq!(response.ancestors[1].as_str(), "ws/survey-0");
        assert_eq!(response.parent().unwrap().as_str(), "ws/survey-0/q1");
    }

    #[test]
    fn test_payloads_are_stripped_of_children() {
        let plan = SeedPlan::from_record(&sample_record());
        for node in plan.nodes() {
            match &node.payload {
                NodePayload::Workspace(ws) => assert!(ws.surveys.is_empty() && ws.members.is_empty()),
                NodePayload::Survey(s) => assert!(s.questions.is_empty()),
                NodePayload::Question(q) => assert!(q.responses.is_empty()),
                NodePayload::Member(_) | NodePayload::Response(_) => {}
            }
        }
    }
}
