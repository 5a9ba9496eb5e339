//! Conversation Relay Server
//!
//! Single authenticated endpoint that forwards a chat message history to
//! the completion provider and returns the first generated reply.
//!
//! Endpoints:
//! - `GET /health` - health check with uptime
//! - `POST /api/v1/conversation` - forward messages, return the reply
//!
//! Request checks run in a fixed order: caller identity, provider key,
//! message shape. Each failure maps to an explicit status and body via
//! [`ApiError`]; provider errors are never reflected raw to the caller.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{bearer_token, AuthManager};
use crate::openai::{ChatMessage, OpenAiClient, OpenAiError};

// ============================================================================
// SERVER STATE
// ============================================================================

pub struct AppState {
    pub auth: AuthManager,
    pub client: OpenAiClient,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(auth: AuthManager, client: OpenAiClient) -> Self {
        Self {
            auth,
            client,
            started_at: Instant::now(),
        }
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// Request failures, mapped to explicit HTTP responses
#[derive(Debug)]
pub enum ApiError {
    /// No caller identity, or an unknown token
    Unauthenticated,
    /// Provider API key is not configured
    MissingApiKey,
    /// `messages` missing, not an array, or elements malformed
    BadMessages,
    /// Provider call failed after retry policy was applied
    Upstream(OpenAiError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            Self::MissingApiKey => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "OpenAI API Key not configured.",
            )
                .into_response(),
            Self::BadMessages => {
                (StatusCode::BAD_REQUEST, "Messages must be an array.").into_response()
            }
            Self::Upstream(e) => {
                warn!("Completion failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": e.to_string()})),
                )
                    .into_response()
            }
        }
    }
}

// ============================================================================
// /api/v1/conversation ENDPOINT
// ============================================================================

async fn conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<ChatMessage>, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthenticated)?;
    if !state.auth.is_authorized(token).await {
        return Err(ApiError::Unauthenticated);
    }

    if !state.client.has_api_key() {
        return Err(ApiError::MissingApiKey);
    }

    let messages = body
        .get("messages")
        .and_then(Value::as_array)
        .ok_or(ApiError::BadMessages)?;
    let messages: Vec<ChatMessage> = serde_json::from_value(Value::Array(messages.clone()))
        .map_err(|_| ApiError::BadMessages)?;

    let reply = state
        .client
        .complete(&messages)
        .await
        .map_err(ApiError::Upstream)?;

    Ok(Json(reply))
}

// ============================================================================
// /health ENDPOINT
// ============================================================================

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

// ============================================================================
// SERVER STARTUP
// ============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/conversation", post(conversation))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn run_server(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Conversation relay listening on {}", addr);
    info!("  GET  /health              - Health check");
    info!("  POST /api/v1/conversation - Chat completion relay");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenAiConfig;
    use reqwest::Client;
    use serde_json::json;

    fn provider_config(api_base: String, api_key: &str) -> OpenAiConfig {
        OpenAiConfig {
            api_base,
            api_key: api_key.to_string(),
            model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 5,
            max_retries: 3,
            base_delay_ms: 5,
        }
    }

    /// Spawn the relay on an ephemeral port, returning its base URL.
    async fn spawn_app(config: OpenAiConfig) -> String {
        let auth = AuthManager::with_tokens(vec!["secret-1".to_string()]);
        let client = OpenAiClient::new(config).unwrap();
        let state = Arc::new(AppState::new(auth, client));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_missing_identity_is_401() {
        let base = spawn_app(provider_config("http://localhost:1".to_string(), "key")).await;

        let resp = Client::new()
            .post(format!("{}/api/v1/conversation", base))
            .json(&json!({"messages": []}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED.as_u16());
        assert_eq!(resp.text().await.unwrap(), "Unauthorized");
    }

    #[tokio::test]
    async fn test_unknown_token_is_401() {
        let base = spawn_app(provider_config("http://localhost:1".to_string(), "key")).await;

        let resp = Client::new()
            .post(format!("{}/api/v1/conversation", base))
            .bearer_auth("not-a-real-token")
            .json(&json!({"messages": []}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED.as_u16());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_500() {
        let base = spawn_app(provider_config("http://localhost:1".to_string(), "")).await;

        let resp = Client::new()
            .post(format!("{}/api/v1/conversation", base))
            .bearer_auth("secret-1")
            .json(&json!({"messages": []}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR.as_u16());
        assert_eq!(resp.text().await.unwrap(), "OpenAI API Key not configured.");
    }

    #[tokio::test]
    async fn test_non_array_messages_is_400() {
        let base = spawn_app(provider_config("http://localhost:1".to_string(), "key")).await;
        let client = Client::new();

        for body in [
            json!({}),
            json!({"messages": null}),
            json!({"messages": "hello"}),
            json!({"messages": {"role": "user", "content": "hi"}}),
            json!({"messages": [{"role": "wizard", "content": "hi"}]}),
        ] {
            let resp = client
                .post(format!("{}/api/v1/conversation", base))
                .bearer_auth("secret-1")
                .json(&body)
                .send()
                .await
                .unwrap();

            assert_eq!(
                resp.status(),
                StatusCode::BAD_REQUEST.as_u16(),
                "body: {}",
                body
            );
            assert_eq!(resp.text().await.unwrap(), "Messages must be an array.");
        }
    }

    #[tokio::test]
    async fn test_successful_relay_returns_first_choice() {
        use httpmock::prelude::*;

        let provider = MockServer::start();
        provider.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"choices":[
                        {"message":{"role":"assistant","content":"first"}},
                        {"message":{"role":"assistant","content":"second"}}
                    ]}"#,
                );
        });

        let base = spawn_app(provider_config(provider.base_url(), "key")).await;

        let resp = Client::new()
            .post(format!("{}/api/v1/conversation", base))
            .bearer_auth("secret-1")
            .json(&json!({"messages": [{"role": "user", "content": "hi"}]}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK.as_u16());
        let reply: ChatMessage = resp.json().await.unwrap();
        assert_eq!(reply, ChatMessage::assistant("first"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_as_500() {
        use httpmock::prelude::*;

        let provider = MockServer::start();
        let mock = provider.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("rate limited");
        });

        let base = spawn_app(provider_config(provider.base_url(), "key")).await;

        let resp = Client::new()
            .post(format!("{}/api/v1/conversation", base))
            .bearer_auth("secret-1")
            .json(&json!({"messages": [{"role": "user", "content": "hi"}]}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR.as_u16());
        let body: Value = resp.json().await.unwrap();
        assert!(body.get("error").is_some());
        // 1 initial call + 3 retries
        mock.assert_hits(4);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let base = spawn_app(provider_config("http://localhost:1".to_string(), "key")).await;

        let resp = Client::new()
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK.as_u16());
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn test_error_mapping() {
        let resp = ApiError::Unauthenticated.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = ApiError::MissingApiKey.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = ApiError::BadMessages.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ApiError::Upstream(OpenAiError::EmptyResponse).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
