mod routes;
pub mod session;

pub use routes::create_router;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pitlane_core::{AgentCache, ChatBackend, PitlaneError, Resolution, SessionAgent, Workspaces};
use serde::Serialize;
use session::CookieSettings;
use std::sync::Arc;

/// The process-wide agent cache, one per server.
pub type SessionAgents = AgentCache<SessionAgent, PitlaneError>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agents: SessionAgents,
    pub workspaces: Workspaces,
    pub backend: Arc<dyn ChatBackend>,
    pub cookies: CookieSettings,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Cached agent for `session_id`, built on first use.
    pub async fn agent(&self, session_id: &str) -> Resolution<SessionAgent, PitlaneError> {
        let workspaces = self.workspaces.clone();
        let backend = self.backend.clone();

        self.agents
            .get_or_create(session_id, move |id| async move {
                tokio::task::spawn_blocking(move || SessionAgent::open(&workspaces, &id, backend))
                    .await
                    .map_err(|e| PitlaneError::Task(e.to_string()))?
            })
            .await
    }
}

/// JSON response wrapper
#[derive(Serialize)]
pub struct JsonResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Short-circuit response with an explicit status.
pub fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(JsonResponse::<()>::err(msg))).into_response()
}

/// Custom error type for HTTP handlers
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string())
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;
