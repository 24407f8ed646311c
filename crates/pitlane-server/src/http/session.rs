use axum::http::{header, HeaderMap, HeaderValue};
use pitlane_core::security::is_valid_session_id;
use pitlane_core::{PitlaneError, Workspaces};
use tracing::{error, info, warn};

pub const SESSION_COOKIE_NAME: &str = "pitlane_session";

/// Attributes for the session cookie.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub max_age_secs: u64,
    pub secure: bool,
}

impl CookieSettings {
    /// `Set-Cookie` value binding the browser to `session_id`.
    pub fn header_value(&self, session_id: &str) -> String {
        let mut cookie = format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE_NAME, session_id, self.max_age_secs
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    pub fn apply(&self, headers: &mut HeaderMap, session_id: &str) {
        match HeaderValue::from_str(&self.header_value(session_id)) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => error!("Unencodable session cookie for {}: {}", session_id, e),
        }
    }
}

/// Value of the session cookie, if the request carries one.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
}

/// Returns the session id when it is a UUID with an existing workspace.
///
/// Both checks always run, whichever one fails.
pub fn validate_session(workspaces: &Workspaces, session: Option<&str>) -> Option<String> {
    let candidate = session.unwrap_or("");
    let well_formed = is_valid_session_id(candidate);
    let exists = workspaces.exists(candidate);

    if well_formed && exists {
        Some(candidate.to_string())
    } else {
        None
    }
}

/// Session bound to the current request.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub id: String,
    /// True when the id was minted for this request and needs a cookie.
    pub is_new: bool,
}

/// Reuse the cookie's session when valid, otherwise start a new one.
pub fn resolve(workspaces: &Workspaces, headers: &HeaderMap) -> Result<ResolvedSession, PitlaneError> {
    let cookie = session_cookie(headers);

    if let Some(id) = validate_session(workspaces, cookie.as_deref()) {
        touch_safely(workspaces, &id);
        info!("Using existing session: {}", id);
        return Ok(ResolvedSession { id, is_new: false });
    }

    let created = workspaces.create(None, None)?;
    let id = created.metadata.session_id;
    info!("Creating new session: {}", id);
    Ok(ResolvedSession { id, is_new: true })
}

/// Bump `last_accessed`; failures are logged, never surfaced.
pub fn touch_safely(workspaces: &Workspaces, session_id: &str) {
    match workspaces.touch(session_id) {
        Ok(()) => {}
        Err(PitlaneError::WorkspaceNotFound(_)) => {
            warn!("Workspace vanished before touch for session {}", session_id)
        }
        Err(PitlaneError::Io(e)) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            error!("Permission denied updating workspace metadata for session {}: {}", session_id, e)
        }
        Err(e) => error!("Unexpected error updating workspace metadata for session {}: {}", session_id, e),
    }
}
