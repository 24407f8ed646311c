use std::path::Path;
use uuid::Uuid;

/// Image types the chart endpoint will serve, with their media types.
pub const CHART_MEDIA_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
];

/// Whether `session_id` parses as a UUID.
pub fn is_valid_session_id(session_id: &str) -> bool {
    Uuid::parse_str(session_id).is_ok()
}

/// Whitelist check for a single path component.
///
/// Allows ASCII letters, digits, `_`, `-` and `.`; rejects leading or trailing
/// dots and any `..`.
pub fn is_safe_filename(filename: &str) -> bool {
    if filename.is_empty() {
        return false;
    }

    let allowed = filename
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !allowed {
        return false;
    }

    if filename.starts_with('.') || filename.ends_with('.') {
        return false;
    }

    !filename.contains("..")
}

/// Whether `file_path` resolves to a location inside `workspace_path`.
///
/// Symlinks are followed. Broken symlinks and paths that cannot be resolved
/// are rejected.
pub fn validate_file_path(file_path: &Path, workspace_path: &Path) -> bool {
    if file_path.is_symlink() && !file_path.exists() {
        return false;
    }

    let resolved_file = match file_path.canonicalize() {
        Ok(p) => p,
        Err(_) => return false,
    };
    let resolved_workspace = match workspace_path.canonicalize() {
        Ok(p) => p,
        Err(_) => return false,
    };

    resolved_file.starts_with(&resolved_workspace)
}

/// Media type for a chart file, if its extension is servable.
pub fn chart_media_type(file_path: &Path) -> Option<&'static str> {
    let ext = file_path.extension()?.to_str()?.to_ascii_lowercase();
    CHART_MEDIA_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, media)| *media)
}
