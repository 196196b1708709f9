// src/events.rs
// The manager talks to the outside world (UI, persistence triggers, toasts)
// only through these traits, so the emission points stay fixed while the
// delivery mechanism remains pluggable.

use crate::types::Snapshot;

/// Receives the full-state broadcast fired after every mutating operation,
/// plus the focus request fired once when a project is added. Broadcasts are
/// per mutation, not batched; a refresh emits several intermediate snapshots
/// before the final one.
pub trait ChangeListener {
    fn data_changed(&self, snapshot: &Snapshot);

    /// Fired after a newly added project has been refreshed, so the UI can
    /// navigate to it.
    fn focus_project(&self, project_id: &str) {
        let _ = project_id;
    }
}

/// Sink for user-facing error notifications. The scanner is the only caller;
/// everything else operates on the in-memory state and cannot hit the
/// filesystem.
pub trait Notifier: Send + Sync {
    fn error(&self, title: &str, message: &str, detail: &str);
}

/// Default notifier: logs to stderr.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn error(&self, title: &str, message: &str, detail: &str) {
        eprintln!("[NOTIFY] {} {} ({})", title, message, detail);
    }
}
