//! Retrying client for the platform's management API.
//!
//! One method per entity kind, each returning the platform-assigned id.
//! Transient failures (5xx, 429, network) are retried under the
//! [`RetryPolicy`]; 401/403 map to [`PlatformError::Auth`]; any other 4xx is
//! returned at once. A 2xx without a readable id is
//! [`PlatformError::Unconfirmed`] and is never retried.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngExt;
use serde_json::{json, Value};

use super::transport::{PlatformRequest, PlatformTransport, RawResponse};
use crate::config::RetryPolicy;
use crate::error::PlatformError;
use crate::model::{Member, PlatformId, Question, QuestionKind, Response, Survey, Workspace};
use crate::validation::DEFAULT_RATING_RANGE;

/// Longest response body kept in an error.
const MAX_ERROR_BODY: usize = 512;

/// How a non-success status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Auth,
    Transient,
    Permanent,
}

fn classify(status: u16) -> StatusClass {
    match status {
        401 | 403 => StatusClass::Auth,
        429 | 500..=599 => StatusClass::Transient,
        _ => StatusClass::Permanent,
    }
}

pub struct PlatformClient {
    transport: Arc<dyn PlatformTransport>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PlatformClient {
    pub fn new(transport: Arc<dyn PlatformTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub async fn create_workspace(
        &self,
        workspace: &Workspace,
    ) -> Result<PlatformId, PlatformError> {
        let body = json!({ "name": workspace.name });
        self.create("/workspaces", body).await
    }

    pub async fn create_member(
        &self,
        workspace_id: &PlatformId,
        member: &Member,
    ) -> Result<PlatformId, PlatformError> {
        let body = json!({
            "workspaceId": workspace_id.as_str(),
            "name": member.name,
            "email": member.email,
            "role": member.role,
        });
        self.create("/users", body).await
    }

    pub async fn create_survey(
        &self,
        workspace_id: &PlatformId,
        survey: &Survey,
    ) -> Result<PlatformId, PlatformError> {
        let mut body = json!({
            "workspaceId": workspace_id.as_str(),
            "name": survey.name,
            "type": "link",
            "status": "inProgress",
        });
        if let Some(description) = &survey.description {
            body["description"] = json!(description);
        }
        self.create("/surveys", body).await
    }

    pub async fn create_question(
        &self,
        survey_id: &PlatformId,
        question: &Question,
    ) -> Result<PlatformId, PlatformError> {
        let mut body = json!({
            "surveyId": survey_id.as_str(),
            "type": question.kind,
            "headline": question.headline,
            "required": question.required,
        });
        if question.kind.is_multiple_choice() {
            body["choices"] = question
                .choices
                .iter()
                .map(|label| json!({ "label": label }))
                .collect();
        }
        if question.kind == QuestionKind::Rating {
            body["range"] = json!(question.range.unwrap_or(DEFAULT_RATING_RANGE));
            body["scale"] = json!("number");
        }
        self.create("/questions", body).await
    }

    pub async fn submit_response(
        &self,
        survey_id: &PlatformId,
        question_id: &PlatformId,
        response: &Response,
    ) -> Result<PlatformId, PlatformError> {
        let mut data = serde_json::Map::new();
        data.insert(question_id.as_str().to_string(), response.answer.clone());
        let body = json!({
            "surveyId": survey_id.as_str(),
            "questionId": question_id.as_str(),
            "finished": true,
            "data": data,
        });
        self.create("/responses", body).await
    }

    /// POST `body` to `path`, retrying transient failures.
    async fn create(&self, path: &str, body: Value) -> Result<PlatformId, PlatformError> {
        let request = PlatformRequest::new(path, body);
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let (error, hint) = match self.transport.send(&request).await {
                Ok(response) if response.is_success() => return parse_created_id(&response),
                Ok(response) => {
                    let error = response_error(&response);
                    match classify(response.status) {
                        StatusClass::Transient => {
                            let hint =
                                response.retry_after.as_deref().and_then(parse_retry_after);
                            (error, hint)
                        }
                        StatusClass::Auth | StatusClass::Permanent => return Err(error),
                    }
                }
                Err(error) => (error, None),
            };

            if attempt == max_attempts {
                tracing::warn!(
                    path,
                    attempts = max_attempts,
                    error = %error,
                    "Retry budget exhausted"
                );
                return Err(error);
            }

            let delay = self.retry_delay(attempt, hint);
            tracing::debug!(
                path,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient platform error, will retry"
            );
            tokio::time::sleep(delay).await;
        }

        Err(PlatformError::InvalidResponse(
            "retry loop ended without a result".to_string(),
        ))
    }

    /// Delay before retry number `retry`: the server's hint when present,
    /// otherwise jittered exponential backoff. Both are capped.
    fn retry_delay(&self, retry: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.retry.max_delay);
        }
        let delay = self.retry.backoff(retry);
        if !self.retry.jitter || delay.is_zero() {
            return delay;
        }
        let mut rng = rand::rng();
        let millis = rng.random_range(0..=delay.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

fn response_error(response: &RawResponse) -> PlatformError {
    let body = truncate_body(&response.body);
    match classify(response.status) {
        StatusClass::Auth => PlatformError::Auth {
            status: response.status,
            body,
        },
        _ => PlatformError::Api {
            status: response.status,
            body,
        },
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Extract the created id from `{"id": ..}` or `{"data": {"id": ..}}`.
fn parse_created_id(response: &RawResponse) -> Result<PlatformId, PlatformError> {
    let unconfirmed = || PlatformError::Unconfirmed {
        status: response.status,
        body: truncate_body(&response.body),
    };

    let value: Value = serde_json::from_str(&response.body).map_err(|_| unconfirmed())?;

    let id = value
        .get("id")
        .or_else(|| value.get("data").and_then(|d| d.get("id")))
        .and_then(|id| match id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    id.map(PlatformId).ok_or_else(unconfirmed)
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP-date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = date.with_timezone(&Utc) - Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemberRole, ProvisionalId};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport answering from a script; repeats the last entry when it runs out.
    struct ScriptedTransport {
        script: Mutex<Vec<Result<RawResponse, PlatformError>>>,
        requests: Mutex<Vec<PlatformRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<RawResponse, PlatformError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PlatformTransport for ScriptedTransport {
        async fn send(&self, request: &PlatformRequest) -> Result<RawResponse, PlatformError> {
            self.requests.lock().unwrap().push(request.clone());
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop().unwrap()
            } else {
                script.last().cloned().unwrap()
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(20),
            jitter: true,
        }
    }

    fn workspace() -> Workspace {
        Workspace {
            id: ProvisionalId::new("ws"),
            name: "Acme".to_string(),
            members: vec![],
            surveys: vec![],
        }
    }

    #[tokio::test]
    async fn test_retries_503_then_succeeds() {
        let transport = ScriptedTransport::new(vec![
            Ok(RawResponse::new(503, "unavailable")),
            Ok(RawResponse::new(503, "unavailable")),
            Ok(RawResponse::new(201, r#"{"id": "ws_123"}"#)),
        ]);
        let client = PlatformClient::new(transport.clone(), fast_policy());

        let id = client.create_workspace(&workspace()).await.unwrap();

        assert_eq!(id.as_str(), "ws_123");
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_budget_exhausted_surfaces_api_error() {
        let transport = ScriptedTransport::new(vec![Ok(RawResponse::new(503, "down"))]);
        let client = PlatformClient::new(transport.clone(), fast_policy());

        let err = client.create_workspace(&workspace()).await.unwrap_err();

        assert!(matches!(err, PlatformError::Api { status: 503, .. }));
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_validation_error_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(RawResponse::new(
            400,
            r#"{"message": "name required"}"#,
        ))]);
        let client = PlatformClient::new(transport.clone(), fast_policy());

        let err = client.create_workspace(&workspace()).await.unwrap_err();

        match err {
            PlatformError::Api { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("name required"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal_and_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(RawResponse::new(401, "bad key"))]);
        let client = PlatformClient::new(transport.clone(), fast_policy());

        let err = client.create_workspace(&workspace()).await.unwrap_err();

        assert!(matches!(err, PlatformError::Auth { status: 401, .. }));
        assert!(err.is_fatal());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_network_errors_are_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(PlatformError::Network("connection reset".to_string())),
            Ok(RawResponse::new(200, r#"{"data": {"id": "ws_9"}}"#)),
        ]);
        let client = PlatformClient::new(transport.clone(), fast_policy());

        let id = client.create_workspace(&workspace()).await.unwrap();

        assert_eq!(id.as_str(), "ws_9");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_honors_capped_retry_after() {
        let transport = ScriptedTransport::new(vec![
            Ok(RawResponse::new(429, "slow down").with_retry_after("3600")),
            Ok(RawResponse::new(201, r#"{"id": "ws_1"}"#)),
        ]);
        let client = PlatformClient::new(transport.clone(), fast_policy());

        let started = std::time::Instant::now();
        client.create_workspace(&workspace()).await.unwrap();

        assert_eq!(transport.calls(), 2);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_accepted_without_id_is_unconfirmed() {
        let transport = ScriptedTransport::new(vec![
            Ok(RawResponse::new(201, r#"{"ok": true}"#)),
            Ok(RawResponse::new(201, "<html>created</html>")),
        ]);
        let client = PlatformClient::new(transport.clone(), fast_policy());

        let err = client.create_workspace(&workspace()).await.unwrap_err();
        assert!(matches!(err, PlatformError::Unconfirmed { status: 201, .. }));

        let err = client.create_workspace(&workspace()).await.unwrap_err();
        match err {
            PlatformError::Unconfirmed { body, .. } => assert_eq!(body, "<html>created</html>"),
            other => panic!("unexpected error: {other:?}"),
        }
        // Never retried: the platform already accepted each request.
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_request_bodies_carry_parent_ids() {
        let transport = ScriptedTransport::new(vec![Ok(RawResponse::new(201, r#"{"id": "x"}"#))]);
        let client = PlatformClient::new(transport.clone(), fast_policy());
        let ws = PlatformId("ws_1".to_string());

        let member = Member {
            id: ProvisionalId::new("ws/member-0"),
            workspace_id: ProvisionalId::new("ws"),
            name: "Ada".to_string(),
            email: "ada@acme.test".to_string(),
            role: MemberRole::Manager,
        };
        client.create_member(&ws, &member).await.unwrap();

        let question = Question {
            id: ProvisionalId::new("ws/survey-0/q1"),
            survey_id: ProvisionalId::new("ws/survey-0"),
            kind: QuestionKind::MultipleChoiceSingle,
            headline: "Pick one".to_string(),
            choices: vec!["A".to_string(), "B".to_string()],
            range: None,
            required: true,
            responses: vec![],
        };
        client
            .create_question(&PlatformId("sv_1".to_string()), &question)
            .await
            .unwrap();

        let response = Response {
            id: ProvisionalId::new("ws/survey-0/q1/r0"),
            question_id: question.id.clone(),
            answer: json!("A"),
        };
        client
            .submit_response(
                &PlatformId("sv_1".to_string()),
                &PlatformId("q_1".to_string()),
                &response,
            )
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].path, "/users");
        assert_eq!(requests[0].body["workspaceId"], "ws_1");
        assert_eq!(requests[0].body["role"], "manager");
        assert_eq!(requests[1].path, "/questions");
        assert_eq!(requests[1].body["surveyId"], "sv_1");
        assert_eq!(requests[1].body["type"], "multipleChoiceSingle");
        assert_eq!(requests[1].body["choices"][1]["label"], "B");
        assert_eq!(requests[2].path, "/responses");
        assert_eq!(requests[2].body["data"]["q_1"], "A");
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(403), StatusClass::Auth);
        assert_eq!(classify(429), StatusClass::Transient);
        assert_eq!(classify(502), StatusClass::Transient);
        assert_eq!(classify(404), StatusClass::Permanent);
        assert_eq!(classify(422), StatusClass::Permanent);
    }

    #[test]
    fn test_backoff_without_jitter_is_capped() {
        let client = PlatformClient::new(
            ScriptedTransport::new(vec![Ok(RawResponse::new(201, "{}"))]),
            RetryPolicy {
                max_attempts: 10,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_millis(300),
                jitter: false,
            },
        );
        assert_eq!(client.retry_delay(1, None), Duration::from_millis(100));
        assert_eq!(client.retry_delay(2, None), Duration::from_millis(200));
        assert_eq!(client.retry_delay(5, None), Duration::from_millis(300));
        assert_eq!(
            client.retry_delay(1, Some(Duration::from_secs(9))),
            Duration::from_millis(300)
        );
    }
}
