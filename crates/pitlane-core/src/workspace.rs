use crate::error::{PitlaneError, Result};
use crate::security::is_safe_filename;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const METADATA_FILE: &str = ".metadata.json";
const CHARTS_DIR: &str = "charts";
const DATA_DIR: &str = "data";
const CREATE_RETRIES: u32 = 3;
/// `list` without `show_all` returns at most this many workspaces.
const RECENT_LIMIT: usize = 10;

/// Contents of `.metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl WorkspaceMetadata {
    fn fresh(session_id: &str, description: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            created_at: now,
            last_accessed: now,
            description: description.map(str::to_string),
        }
    }
}

/// Metadata plus what the workspace currently holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    #[serde(flatten)]
    pub metadata: WorkspaceMetadata,
    pub workspace_path: PathBuf,
    pub data_files: Vec<String>,
    pub chart_files: Vec<String>,
}

/// Result of a `clean` pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanReport {
    pub removed_count: usize,
    pub removed_sessions: Vec<String>,
}

/// Per-session workspace directories under one base directory.
///
/// Layout: `<base>/<session_id>/{charts,data,.metadata.json}`.
#[derive(Debug, Clone)]
pub struct Workspaces {
    base: PathBuf,
}

impl Workspaces {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `~/.pitlane/workspaces`, or `./.pitlane/workspaces` without a home directory.
    pub fn default_base() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pitlane")
            .join("workspaces")
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Workspace directory for `session_id`. Rejects ids that are not a single safe path component.
    pub fn path(&self, session_id: &str) -> Result<PathBuf> {
        if !is_safe_filename(session_id) {
            return Err(PitlaneError::InvalidSessionId(session_id.to_string()));
        }
        Ok(self.base.join(session_id))
    }

    pub fn charts_dir(&self, session_id: &str) -> Result<PathBuf> {
        Ok(self.path(session_id)?.join(CHARTS_DIR))
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.path(session_id).map(|p| p.is_dir()).unwrap_or(false)
    }

    /// Create a workspace. With no `session_id`, a fresh UUID is generated,
    /// retrying a few times on collision.
    pub fn create(&self, session_id: Option<&str>, description: Option<&str>) -> Result<WorkspaceInfo> {
        if let Some(id) = session_id {
            if self.exists(id) {
                return Err(PitlaneError::WorkspaceExists(id.to_string()));
            }
            return self.create_at(id, description);
        }

        for _ in 0..CREATE_RETRIES {
            let id = generate_session_id();
            if !self.exists(&id) {
                return self.create_at(&id, description);
            }
        }

        Err(PitlaneError::SessionIdExhausted {
            attempts: CREATE_RETRIES,
        })
    }

    fn create_at(&self, session_id: &str, description: Option<&str>) -> Result<WorkspaceInfo> {
        let path = self.path(session_id)?;
        fs::create_dir_all(&self.base)?;
        fs::create_dir(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => PitlaneError::WorkspaceExists(session_id.to_string()),
            _ => PitlaneError::Io(e),
        })?;
        fs::create_dir_all(path.join(DATA_DIR))?;
        fs::create_dir_all(path.join(CHARTS_DIR))?;

        let metadata = WorkspaceMetadata::fresh(session_id, description);
        write_metadata(&path, &metadata)?;
        info!("Created workspace for session: {}", session_id);

        Ok(WorkspaceInfo {
            metadata,
            workspace_path: path,
            data_files: Vec::new(),
            chart_files: Vec::new(),
        })
    }

    /// Create the workspace if missing, otherwise bump its `last_accessed`.
    pub fn open(&self, session_id: &str) -> Result<PathBuf> {
        if self.exists(session_id) {
            self.touch(session_id)?;
        } else {
            self.create(Some(session_id), None)?;
        }
        self.path(session_id)
    }

    /// Update `last_accessed`, recreating missing metadata.
    pub fn touch(&self, session_id: &str) -> Result<()> {
        if !self.exists(session_id) {
            return Err(PitlaneError::WorkspaceNotFound(session_id.to_string()));
        }
        let path = self.path(session_id)?;

        let metadata = match read_metadata(&path) {
            Ok(mut m) => {
                m.last_accessed = Utc::now();
                m
            }
            Err(PitlaneError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Metadata missing for session {}, recreating", session_id);
                WorkspaceMetadata::fresh(session_id, None)
            }
            Err(e) => return Err(e),
        };

        write_metadata(&path, &metadata)?;
        debug!("Touched workspace for session: {}", session_id);
        Ok(())
    }

    pub fn info(&self, session_id: &str) -> Result<WorkspaceInfo> {
        if !self.exists(session_id) {
            return Err(PitlaneError::WorkspaceNotFound(session_id.to_string()));
        }
        let path = self.path(session_id)?;
        let metadata = read_metadata(&path)?;

        Ok(WorkspaceInfo {
            metadata,
            data_files: list_files(&path.join(DATA_DIR))?,
            chart_files: list_files(&path.join(CHARTS_DIR))?,
            workspace_path: path,
        })
    }

    /// Workspaces newest-accessed first. Unreadable workspaces are skipped.
    pub fn list(&self, show_all: bool) -> Result<Vec<WorkspaceInfo>> {
        let mut workspaces: Vec<WorkspaceInfo> = self
            .session_dirs()?
            .into_iter()
            .filter_map(|id| self.info(&id).ok())
            .collect();

        workspaces.sort_by(|a, b| b.metadata.last_accessed.cmp(&a.metadata.last_accessed));

        if !show_all {
            workspaces.truncate(RECENT_LIMIT);
        }
        Ok(workspaces)
    }

    pub fn remove(&self, session_id: &str) -> Result<()> {
        if !self.exists(session_id) {
            return Err(PitlaneError::WorkspaceNotFound(session_id.to_string()));
        }
        fs::remove_dir_all(self.path(session_id)?)?;
        info!("Removed workspace for session: {}", session_id);
        Ok(())
    }

    /// Remove workspaces idle for more than `older_than_days`, or all of them.
    ///
    /// Workspaces whose metadata cannot be read are kept.
    pub fn clean(&self, older_than_days: Option<u32>, remove_all: bool) -> Result<CleanReport> {
        let mut report = CleanReport::default();
        let now = Utc::now();

        for id in self.session_dirs()? {
            let expired = remove_all
                || match older_than_days {
                    Some(days) => match self.info(&id) {
                        Ok(info) => now - info.metadata.last_accessed > Duration::days(days.into()),
                        Err(_) => false,
                    },
                    None => false,
                };

            if !expired {
                continue;
            }

            match self.remove(&id) {
                Ok(()) => report.removed_sessions.push(id),
                Err(e) => warn!("Failed to remove workspace {}: {}", id, e),
            }
        }

        report.removed_count = report.removed_sessions.len();
        Ok(report)
    }

    fn session_dirs(&self) -> Result<Vec<String>> {
        if !self.base.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        Ok(ids)
    }
}

/// Fresh UUID v4 session id.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

fn read_metadata(workspace: &Path) -> Result<WorkspaceMetadata> {
    let raw = fs::read_to_string(workspace.join(METADATA_FILE))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write via a sibling temp file and rename so readers never see a partial file.
fn write_metadata(workspace: &Path, metadata: &WorkspaceMetadata) -> Result<()> {
    let tmp = workspace.join(format!(".metadata.tmp.{}.json", Uuid::new_v4().simple()));
    let json = serde_json::to_string_pretty(metadata)?;

    if let Err(e) = fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, workspace.join(METADATA_FILE))) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn list_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}
