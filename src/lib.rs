// src/lib.rs
// Project/file/import tracking core for a source preprocessing app: keeps an
// in-memory model of tracked projects, their standalone source files and the
// imports between files, reconciled on demand against the filesystem.

pub mod config;
pub mod events;
pub mod file_types;
pub mod filters;
pub mod manager;
pub mod scanner;
pub mod storage;
pub mod types;
pub mod utils;

pub use config::UserOptions;
pub use events::{ChangeListener, ConsoleNotifier, Notifier};
pub use file_types::{DefaultFileTypes, FileTypes};
pub use manager::ProjectsManager;
pub use storage::Storage;
pub use types::{Import, Project, ProjectConfig, Snapshot, SourceFile};
