// src/types.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// Per-project settings. Output paths are seeded from the global UserOptions
// when the project is created so later changes to the defaults don't touch
// existing projects.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProjectConfig {
    pub live_refresh: bool,
    pub server_url: String,
    #[serde(default)] // Older saved projects may not carry filter patterns
    pub filter_patterns: String,
    #[serde(default)]
    pub use_custom_server: bool,
    #[serde(default)]
    pub custom_server_url: String,
    pub css_path: String,
    pub js_path: String,
    pub html_path: String,
    pub js_min_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: String,
    pub config: ProjectConfig,
    pub updated_at: Option<String>,
}

// A standalone tracked input, eligible for compilation on its own.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourceFile {
    pub id: String,
    pub pid: String,
    pub input: String,
    pub output: String,
    pub file_type: String,
    pub name: String,
}

// A path pulled in by one or more SourceFiles. `parents` holds the ids of
// the referencing files and must never be empty while the record exists.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Import {
    pub id: String,
    pub pid: String,
    pub path: String,
    pub parents: HashSet<String>,
}

// Payload of the data-change broadcast: the full current state.
#[derive(Debug, Serialize, Clone)]
pub struct Snapshot {
    pub projects: Vec<Project>,
    pub files: Vec<SourceFile>,
    pub imports: Vec<Import>,
}
