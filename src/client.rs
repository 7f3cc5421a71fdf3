//! HTTP client for the token and message endpoints.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::Value;

use crate::config::{ApiConfig, MESSAGE_TIMEOUT, TOKEN_TIMEOUT};
use crate::error::{AuthAttempt, PipelineError};
use crate::token::{TokenPayload, candidate_shapes, extract_token};
use crate::types::{MessageRequest, MessageResponse, TokenResult};

/// The two calls the batch pipeline makes against the remote API.
///
/// The pipeline only talks to this trait, so tests can drive the row loop
/// with a stub instead of a live endpoint.
#[async_trait]
pub trait AnswerApi {
    /// Obtain one bearer token for the whole run.
    async fn acquire_token(&self) -> Result<TokenResult, PipelineError>;

    /// Submit one question. `Err` means the request never completed;
    /// an HTTP error status comes back as `Ok` with that status.
    async fn submit_message(
        &self,
        token: &str,
        request: &MessageRequest,
    ) -> Result<MessageResponse, PipelineError>;
}

/// Client against the real remote API.
#[derive(Debug, Clone)]
pub struct QaApiClient {
    http: Client,
    config: ApiConfig,
}

impl QaApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, PipelineError> {
        let http = Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}

#[async_trait]
impl AnswerApi for QaApiClient {
    /// Try every candidate payload shape in priority order, stopping at the
    /// first 200/201 response with an extractable token. Each shape is sent
    /// exactly once; a transport error on one shape is recorded and the loop
    /// moves on to the next.
    async fn acquire_token(&self) -> Result<TokenResult, PipelineError> {
        let url = self.config.token_url();
        let mut attempts: Vec<AuthAttempt> = Vec::new();

        for shape in candidate_shapes(&self.config.credentials) {
            let request = match &shape.payload {
                TokenPayload::Form(pairs) => self.http.post(&url).form(pairs),
                TokenPayload::Json(body) => self.http.post(&url).json(body),
            };

            let response = request
                .header(header::ACCEPT, "application/json")
                .timeout(TOKEN_TIMEOUT)
                .send()
                .await;

            let response = match response {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(shape = shape.name, error = %e, "token attempt failed");
                    attempts.push(AuthAttempt {
                        shape: shape.name,
                        status: None,
                        detail: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let status = response.status().as_u16();
            tracing::debug!(shape = shape.name, status, "token attempt");

            if status != 200 && status != 201 {
                attempts.push(AuthAttempt {
                    shape: shape.name,
                    status: Some(status),
                    detail: None,
                });
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            match serde_json::from_str::<Value>(&text) {
                Ok(body) => {
                    if let Some(token) = extract_token(&body) {
                        tracing::info!(shape = shape.name, "token obtained");
                        return Ok(TokenResult { token, raw: body });
                    }
                    attempts.push(AuthAttempt {
                        shape: shape.name,
                        status: Some(status),
                        detail: Some("no token in response body".to_string()),
                    });
                }
                Err(_) => {
                    attempts.push(AuthAttempt {
                        shape: shape.name,
                        status: Some(status),
                        detail: Some("response is not JSON".to_string()),
                    });
                }
            }
        }

        Err(PipelineError::Auth { attempts })
    }

    async fn submit_message(
        &self,
        token: &str,
        request: &MessageRequest,
    ) -> Result<MessageResponse, PipelineError> {
        let response = self
            .http
            .post(self.config.message_url())
            .header(header::ACCEPT, "application/json")
            .bearer_auth(token)
            .form(&request.form_pairs())
            .timeout(MESSAGE_TIMEOUT)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok(MessageResponse { status, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;

    use crate::config::Credentials;

    struct StubState {
        token_requests: AtomicUsize,
        /// Reject every attempt when set; otherwise the first JSON-encoded
        /// attempt succeeds.
        always_reject: bool,
    }

    async fn stub_token(
        State(state): State<Arc<StubState>>,
        headers: HeaderMap,
        _body: String,
    ) -> impl IntoResponse {
        state.token_requests.fetch_add(1, Ordering::SeqCst);

        let is_json = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        if !state.always_reject && is_json {
            (
                StatusCode::OK,
                r#"{"access_token": "stub.jwt.token"}"#.to_string(),
            )
        } else {
            (StatusCode::UNAUTHORIZED, r#"{"detail": "nope"}"#.to_string())
        }
    }

    async fn stub_message(headers: HeaderMap, body: String) -> impl IntoResponse {
        if headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "Bearer stub.jwt.token")
            .unwrap_or(false)
            && body.contains("message=")
        {
            (
                StatusCode::OK,
                r#"{"message": "An answer.<br>Relevant URLs:<br><a href='http://x'>x</a>"}"#
                    .to_string(),
            )
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string())
        }
    }

    async fn spawn_stub(always_reject: bool) -> (String, Arc<StubState>) {
        let state = Arc::new(StubState {
            token_requests: AtomicUsize::new(0),
            always_reject,
        });
        let app = Router::new()
            .route("/auth/token", post(stub_token))
            .route("/message", post(stub_message))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    fn test_client(base_url: &str) -> QaApiClient {
        let config = ApiConfig::with_credentials(
            base_url,
            Credentials {
                username: "user@example.com".to_string(),
                password: "hunter2".to_string(),
                client_id: "Bearer".to_string(),
            },
        );
        QaApiClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn first_successful_shape_stops_the_trial() {
        let (base, state) = spawn_stub(false).await;
        let client = test_client(&base);

        let result = client.acquire_token().await.unwrap();
        assert_eq!(result.token, "stub.jwt.token");

        // Three rejected form shapes plus the first JSON shape; the four
        // wrapped JSON shapes are never sent.
        assert_eq!(state.token_requests.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausted_shapes_fail_with_full_attempt_list() {
        let (base, state) = spawn_stub(true).await;
        let client = test_client(&base);

        let err = client.acquire_token().await.unwrap_err();
        assert_eq!(state.token_requests.load(Ordering::SeqCst), 8);

        let PipelineError::Auth { attempts } = err else {
            panic!("expected auth error, got {err:?}");
        };
        assert_eq!(attempts.len(), 8);
        assert_eq!(attempts[0].shape, "form:oauth-password");
        assert_eq!(attempts[0].status, Some(401));
        assert_eq!(attempts[7].shape, "json:credentials");
    }

    #[tokio::test]
    async fn submit_message_passes_status_and_body_through() {
        let (base, _state) = spawn_stub(false).await;
        let client = test_client(&base);

        let request = MessageRequest {
            message: "How do I reset?".to_string(),
            product: "NX".to_string(),
            version: "2306".to_string(),
            app_id: 7,
            session_id: None,
        };

        let ok = client
            .submit_message("stub.jwt.token", &request)
            .await
            .unwrap();
        assert_eq!(ok.status, 200);
        assert!(
            ok.body_json()["message"]
                .as_str()
                .unwrap()
                .contains("Relevant URLs:")
        );

        let bad = client.submit_message("wrong-token", &request).await.unwrap();
        assert_eq!(bad.status, 500);
        assert!(!bad.is_success());
    }
}
