pub mod agent;
pub mod cache;
pub mod error;
pub mod filters;
pub mod security;
pub mod workspace;

pub use agent::{ChatBackend, ChatRequest, HttpChatBackend, SessionAgent, UnconfiguredBackend};
pub use cache::{AgentCache, CacheStats, Resolution, DEFAULT_CAPACITY};
pub use error::{PitlaneError, Result};
pub use workspace::{generate_session_id, CleanReport, WorkspaceInfo, WorkspaceMetadata, Workspaces};
