use crate::error::{PitlaneError, Result};
use crate::workspace::Workspaces;
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One question routed to a chat backend.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub session_id: &'a str,
    pub workspace_dir: &'a Path,
    pub message: &'a str,
}

/// Something that answers questions on behalf of a session.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<String>;

    fn name(&self) -> &str;
}

/// Backend used when no endpoint is configured. Every chat fails.
#[derive(Debug, Default, Clone)]
pub struct UnconfiguredBackend;

#[async_trait]
impl ChatBackend for UnconfiguredBackend {
    async fn chat(&self, _request: ChatRequest<'_>) -> Result<String> {
        Err(PitlaneError::Backend(
            "no chat backend configured (set [agent].endpoint or PITLANE_AGENT_ENDPOINT)".into(),
        ))
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    response: String,
}

/// Posts `ChatRequest` as JSON to an HTTP endpoint and expects `{"response": "..."}`.
#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpChatBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<String> {
        let resp = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PitlaneError::Backend(format!(
                "{} returned {}: {}",
                self.endpoint, status, body
            )));
        }

        let reply: ChatReply = resp.json().await?;
        Ok(reply.response)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// The per-session value held by the agent cache.
pub struct SessionAgent {
    session_id: String,
    workspace_dir: PathBuf,
    backend: Arc<dyn ChatBackend>,
    turns: AtomicU64,
}

impl std::fmt::Debug for SessionAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAgent")
            .field("session_id", &self.session_id)
            .field("workspace_dir", &self.workspace_dir)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl SessionAgent {
    /// Bind an agent to `session_id`, creating its workspace or bumping
    /// `last_accessed` if it already exists. Performs blocking file I/O.
    pub fn open(workspaces: &Workspaces, session_id: &str, backend: Arc<dyn ChatBackend>) -> Result<Self> {
        let workspace_dir = workspaces.open(session_id)?;
        info!(
            "Agent ready for session {} (backend: {})",
            session_id,
            backend.name()
        );

        Ok(Self {
            session_id: session_id.to_string(),
            workspace_dir,
            backend,
            turns: AtomicU64::new(0),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Number of chat calls made through this agent.
    pub fn turns(&self) -> u64 {
        self.turns.load(Ordering::Relaxed)
    }

    pub async fn chat(&self, message: &str) -> Result<String> {
        let turn = self.turns.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Session {} turn {}", self.session_id, turn);

        self.backend
            .chat(ChatRequest {
                session_id: &self.session_id,
                workspace_dir: &self.workspace_dir,
                message,
            })
            .await
    }
}
