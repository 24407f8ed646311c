use anyhow::Context;
use clap::ValueEnum;
use pitlane_core::{Workspaces, DEFAULT_CAPACITY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deployment environment. Controls cookie security defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
    Test,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "development" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

const LOG_LEVELS: &[&str] = &["critical", "error", "warning", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub env: Environment,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            env: Environment::Production,
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie lifetime. Default 7 days.
    pub max_age_secs: u64,
    /// Forces the cookie `Secure` flag on or off. Unset: on unless in development.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https_enabled: Option<bool>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 86_400 * 7,
            https_enabled: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of live session agents.
    pub max_agents: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_agents: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Defaults to `~/.pitlane/workspaces`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Chat backend URL. Without one, chats report that no backend is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 300,
        }
    }
}

/// Contents of `pitlane.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PitlaneConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub cache: CacheConfig,
    pub workspace: WorkspaceConfig,
    pub agent: AgentConfig,
}

impl PitlaneConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Defaults when `path` does not exist; parse errors are still errors.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `PITLANE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(env) = lookup("PITLANE_ENV").and_then(|v| v.parse().ok()) {
            self.server.env = env;
        }
        if let Some(v) = lookup("PITLANE_HTTPS_ENABLED") {
            self.session.https_enabled = Some(v.eq_ignore_ascii_case("true"));
        }
        if let Some(v) = lookup("PITLANE_SESSION_MAX_AGE").and_then(|v| v.parse().ok()) {
            self.session.max_age_secs = v;
        }
        if let Some(v) = lookup("PITLANE_CACHE_MAX_AGENTS").and_then(|v| v.parse().ok()) {
            self.cache.max_agents = v;
        }
        if let Some(v) = lookup("PITLANE_WORKSPACE_DIR") {
            self.workspace.base_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PITLANE_AGENT_ENDPOINT").filter(|v| !v.is_empty()) {
            self.agent.endpoint = Some(v);
        }
    }

    /// All problems found, empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("[server] port must be non-zero".to_string());
        }
        if self.server.host.trim().is_empty() {
            errors.push("[server] host must not be empty".to_string());
        }
        if !LOG_LEVELS.contains(&self.server.log_level.to_ascii_lowercase().as_str()) {
            errors.push(format!(
                "[server] log_level '{}' must be one of {}",
                self.server.log_level,
                LOG_LEVELS.join(", ")
            ));
        }
        if self.cache.max_agents == 0 {
            errors.push("[cache] max_agents must be at least 1".to_string());
        }
        if self.session.max_age_secs == 0 {
            errors.push("[session] max_age_secs must be non-zero".to_string());
        }
        if self.agent.timeout_secs == 0 {
            errors.push("[agent] timeout_secs must be non-zero".to_string());
        }
        if let Some(endpoint) = &self.agent.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                errors.push(format!("[agent] endpoint '{}' must be an http(s) URL", endpoint));
            }
        }

        errors
    }

    pub fn cookie_secure(&self) -> bool {
        self.session
            .https_enabled
            .unwrap_or(self.server.env != Environment::Development)
    }

    pub fn workspace_base(&self) -> PathBuf {
        self.workspace
            .base_dir
            .clone()
            .unwrap_or_else(Workspaces::default_base)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_secs)
    }

    /// `tracing` filter directive for `server.log_level`.
    pub fn log_filter(&self) -> &'static str {
        match self.server.log_level.to_ascii_lowercase().as_str() {
            "critical" | "error" => "error",
            "warning" | "warn" => "warn",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}
