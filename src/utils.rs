// src/utils.rs
use sha2::{Digest, Sha256};

/// Stable identifier for a path string. Projects, files and imports are all
/// keyed by this; it must not change across process restarts because the ids
/// are persisted with the rest of the state.
pub fn identity(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Reduces a project display name to the characters allowed in a server URL
/// slug. Whitespace becomes `-`, everything outside `[A-Za-z0-9_-]` is
/// dropped. May return an empty string (e.g. a fully non-ASCII name).
pub fn sanitize_server_url(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
