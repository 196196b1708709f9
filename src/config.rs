// src/config.rs
use crate::storage::Storage;
use serde::{Deserialize, Serialize};

const USER_OPTIONS_KEY: &str = "user_options";

// Global user options: default output directories handed to new projects,
// plus the global filter pattern string applied on top of every project's
// own patterns.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UserOptions {
    pub css_path: String,
    pub js_path: String,
    pub html_path: String,
    pub js_min_path: String,
    pub filter_patterns: String,
}

impl Default for UserOptions {
    fn default() -> Self {
        UserOptions {
            css_path: "css".to_string(),
            js_path: "js".to_string(),
            html_path: "html".to_string(),
            js_min_path: "js/min".to_string(),
            filter_patterns: String::new(),
        }
    }
}

impl UserOptions {
    /// Loads the stored options, falling back to defaults when nothing has
    /// been saved yet.
    pub fn load(storage: &Storage) -> Result<UserOptions, String> {
        match storage.get_setting(USER_OPTIONS_KEY)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| format!("Failed to parse stored user options: {}", e)),
            None => Ok(UserOptions::default()),
        }
    }

    pub fn save(&self, storage: &Storage) -> Result<(), String> {
        let json = serde_json::to_string(self)
            .map_err(|e| format!("Failed to serialize user options: {}", e))?;
        storage.set_setting(USER_OPTIONS_KEY, &json)
    }
}
