use thiserror::Error;

pub type Result<T> = std::result::Result<T, PitlaneError>;

#[derive(Debug, Error)]
pub enum PitlaneError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Workspace already exists for session: {0}")]
    WorkspaceExists(String),

    #[error("Workspace not found for session: {0}")]
    WorkspaceNotFound(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Failed to generate unique session id after {attempts} attempts")]
    SessionIdExhausted { attempts: u32 },

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Chat backend error: {0}")]
    Backend(String),
}

impl From<reqwest::Error> for PitlaneError {
    fn from(err: reqwest::Error) -> Self {
        PitlaneError::Backend(err.to_string())
    }
}
