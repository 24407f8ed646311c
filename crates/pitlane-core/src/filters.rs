use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::{Captures, Regex};
use std::path::Path;

/// Rewrite absolute workspace paths in agent output to web-relative URLs.
///
/// `<base>/<session>/charts/lap_times.png` becomes `/charts/<session>/lap_times.png`
/// (likewise for `data/`). Only paths belonging to `session_id` are rewritten;
/// the session comparison ignores case.
pub fn rewrite_workspace_paths(text: &str, session_id: &str, workspace_base: &Path) -> String {
    let base = workspace_base.to_string_lossy();
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return text.to_string();
    }

    let pattern = format!(
        r#"{}/([a-fA-F0-9\-]+)/(charts|data)/([^\s\)"'>]+)"#,
        regex::escape(base)
    );
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!("Invalid workspace path pattern: {}", e);
            return text.to_string();
        }
    };

    let mut rewrites = 0usize;
    let result = re.replace_all(text, |caps: &Captures| {
        let matched_session = &caps[1];
        if matched_session.eq_ignore_ascii_case(session_id) {
            rewrites += 1;
            format!("/{}/{}/{}", &caps[2], matched_session, &caps[3])
        } else {
            debug!("Skipping path (session mismatch): {} != {}", matched_session, session_id);
            caps[0].to_string()
        }
    });

    if rewrites > 0 {
        info!("Rewrote {} workspace path(s) for session {}", rewrites, session_id);
    } else if text.contains(base) {
        warn!("Found workspace paths but none matched for session {}", session_id);
    }

    result.into_owned()
}

/// Human-readable age of `then` relative to `now` ("just now", "3 hours ago", ...).
///
/// Anything older than 30 days is shown as a date.
pub fn timeago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();

    fn plural(n: i64, unit: &str) -> String {
        format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
    }

    match seconds {
        s if s < 60 => "just now".to_string(),
        s if s < 3_600 => plural(s / 60, "minute"),
        s if s < 86_400 => plural(s / 3_600, "hour"),
        s if s < 172_800 => "yesterday".to_string(),
        s if s < 604_800 => plural(s / 86_400, "day"),
        s if s < 2_592_000 => plural(s / 604_800, "week"),
        _ => then.format("%b %d, %Y").to_string(),
    }
}
