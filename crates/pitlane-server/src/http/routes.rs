use super::session::{self, session_cookie, validate_session};
use super::{error_response, AppResult, AppState, JsonResponse};
use axum::{
    extract::{Form, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use pitlane_core::filters::rewrite_workspace_paths;
use pitlane_core::security::{chart_media_type, is_safe_filename, is_valid_session_id, validate_file_path};
use pitlane_core::CacheStats;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

const EMPTY_ANSWER: &str = "I wasn't able to process your question. Please try again.";

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/session", delete(end_session))
        .route("/api/cache/stats", get(cache_stats))
        .route("/charts/:session_id/:filename", get(serve_chart))
        .with_state(state)
}

/// Attach a `Set-Cookie` header when the session was minted for this request.
fn with_session_cookie(state: &AppState, session: &session::ResolvedSession, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    if session.is_new {
        info!("Setting session cookie: {}", session.id);
        state.cookies.apply(response.headers_mut(), &session.id);
    }
    response
}

#[derive(Serialize)]
struct IndexData {
    session_id: String,
    new_session: bool,
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let session = session::resolve(&state.workspaces, &headers)?;

    let body = Json(JsonResponse::ok(IndexData {
        session_id: session.id.clone(),
        new_session: session.is_new,
    }));
    Ok(with_session_cookie(&state, &session, body))
}

#[derive(Serialize)]
struct HealthData {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> Json<JsonResponse<HealthData>> {
    Json(JsonResponse::ok(HealthData {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    }))
}

#[derive(Deserialize)]
struct ChatForm {
    question: String,
}

#[derive(Serialize)]
struct ChatData {
    session_id: String,
    question: String,
    answer: String,
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> AppResult<Response> {
    let session = session::resolve(&state.workspaces, &headers)?;

    // Failures are shown to the user as the answer rather than as an HTTP error
    let answer = match state.agent(&session.id).await {
        Ok(agent) => {
            let reply = agent.chat(&form.question).await;
            info!("Chat turn {} for session {}", agent.turns(), session.id);
            match reply {
                Ok(text) if text.trim().is_empty() => EMPTY_ANSWER.to_string(),
                Ok(text) => rewrite_workspace_paths(&text, &session.id, state.workspaces.base()),
                Err(e) => {
                    error!("Error processing chat for session {}: {}", session.id, e);
                    format!("An error occurred: {}", e)
                }
            }
        }
        Err(e) => {
            error!("Could not create agent for session {}: {}", session.id, e);
            format!("An error occurred: {}", e)
        }
    };

    let body = Json(JsonResponse::ok(ChatData {
        session_id: session.id.clone(),
        question: form.question,
        answer,
    }));
    Ok(with_session_cookie(&state, &session, body))
}

#[derive(Serialize)]
struct EndSessionData {
    evicted: bool,
}

async fn end_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match validate_session(&state.workspaces, session_cookie(&headers).as_deref()) {
        Some(id) => {
            let evicted = state.agents.evict(&id);
            Json(JsonResponse::ok(EndSessionData { evicted })).into_response()
        }
        None => error_response(StatusCode::BAD_REQUEST, "No valid session"),
    }
}

async fn cache_stats(State(state): State<AppState>) -> Json<JsonResponse<CacheStats>> {
    Json(JsonResponse::ok(state.agents.stats()))
}

/// Serve a chart image from the caller's own workspace.
async fn serve_chart(
    State(state): State<AppState>,
    Path((session_id, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    info!("Chart request: {} for session {}", filename, session_id);

    if !is_valid_session_id(&session_id) {
        warn!("Invalid session ID format: {}", session_id);
        return error_response(StatusCode::BAD_REQUEST, "Invalid session ID");
    }

    let current = session_cookie(&headers);
    if current.as_deref() != Some(session_id.as_str()) {
        warn!("Session ownership mismatch - URL: {}, Cookie: {:?}", session_id, current);
        return error_response(
            StatusCode::FORBIDDEN,
            "Access denied: You can only access your own session's charts",
        );
    }

    if !state.workspaces.exists(&session_id) {
        warn!("Workspace not found for session: {}", session_id);
        return error_response(StatusCode::NOT_FOUND, "Session not found");
    }

    if !is_safe_filename(&filename) {
        warn!("Unsafe chart filename rejected: {}", filename);
        return error_response(StatusCode::BAD_REQUEST, "Invalid filename");
    }

    let (workspace_path, charts_dir) = match (
        state.workspaces.path(&session_id),
        state.workspaces.charts_dir(&session_id),
    ) {
        (Ok(w), Ok(c)) => (w, c),
        _ => return error_response(StatusCode::BAD_REQUEST, "Invalid session ID"),
    };
    let chart_path = charts_dir.join(&filename);

    if !chart_path.is_file() {
        warn!("Chart not found: {:?}", chart_path);
        return error_response(StatusCode::NOT_FOUND, "Chart not found");
    }

    if !validate_file_path(&chart_path, &workspace_path) {
        warn!("Path outside workspace detected: {:?}", chart_path);
        return error_response(StatusCode::FORBIDDEN, "Access denied");
    }

    let media_type = match chart_media_type(&chart_path) {
        Some(m) => m,
        None => {
            warn!("Invalid file type requested: {:?}", chart_path.extension());
            return error_response(StatusCode::BAD_REQUEST, "Invalid file type");
        }
    };

    let bytes = match tokio::fs::read(&chart_path).await {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to read chart {:?}: {}", chart_path, e);
            return error_response(StatusCode::NOT_FOUND, "Chart not found");
        }
    };

    info!("Serving chart: {} ({}) for session {}", filename, media_type, session_id);

    let mut response = bytes.into_response();
    let h = response.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static(media_type));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=3600"));
    if let Ok(v) = HeaderValue::from_str(&session_id) {
        h.insert("x-session-id", v);
    }
    response
}
