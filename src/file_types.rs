// src/file_types.rs
// Type resolution: which files are trackable, what they import, and what
// their compiled output looks like. The manager only ever talks to the
// `FileTypes` trait; `DefaultFileTypes` is the implementation the
// application ships with.

use crate::types::SourceFile;
use crate::utils::identity;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

pub trait FileTypes: Send + Sync {
    /// Whether this path is a trackable input type.
    fn is_supported(&self, path: &str) -> bool;

    /// Declared import paths of `path`, resolved to absolute-ish paths in
    /// the same form the scanner produces. Unreadable files yield an empty
    /// list; only the scanner reports filesystem problems.
    fn get_imports(&self, path: &str) -> Vec<String>;

    /// Builds the record for a newly tracked file.
    fn format(&self, file_path: &str, project_path: &str) -> Result<SourceFile, String>;

    /// Extension (dot included) of the compiled output for this input type.
    fn compiled_extension(&self, path: &str) -> String;
}

const SUPPORTED_EXTENSIONS: &[&str] = &["less", "sass", "scss", "styl", "css", "js"];
const CSS_FAMILY: &[&str] = &["less", "sass", "scss", "styl", "css"];

// Matches `@import "x"`, `@import 'x'` and `@import url(x)` forms.
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"'()\s;]+)"#).unwrap());

fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub struct DefaultFileTypes;

impl FileTypes for DefaultFileTypes {
    fn is_supported(&self, path: &str) -> bool {
        match extension_of(path) {
            Some(ext) => SUPPORTED_EXTENSIONS.contains(&ext.as_str()),
            None => false,
        }
    }

    fn get_imports(&self, path: &str) -> Vec<String> {
        let ext = match extension_of(path) {
            Some(e) if CSS_FAMILY.contains(&e.as_str()) => e,
            _ => return Vec::new(),
        };

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        let dir = Path::new(path).parent().unwrap_or_else(|| Path::new(""));
        let mut imports = Vec::new();

        for cap in IMPORT_RE.captures_iter(&content) {
            let target = &cap[1];
            if target.starts_with("http://") || target.starts_with("https://") || target.starts_with("//") {
                continue;
            }

            let mut resolved = dir.join(target);
            if resolved.extension().is_none() {
                // `@import "partials/base"` in a .scss file means base.scss
                resolved.set_extension(&ext);
            }

            if resolved.is_file() {
                let resolved = resolved.to_string_lossy().to_string();
                if !imports.contains(&resolved) {
                    imports.push(resolved);
                }
            }
        }

        imports
    }

    fn format(&self, file_path: &str, project_path: &str) -> Result<SourceFile, String> {
        let ext = extension_of(file_path)
            .filter(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
            .ok_or_else(|| format!("Unsupported file type: {}", file_path))?;

        let path = Path::new(file_path);
        let name = path
            .file_name()
            .map(|os| os.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.to_string());

        let stem = file_path
            .strip_suffix(&format!(".{}", ext))
            .unwrap_or(file_path);
        let output = format!("{}{}", stem, self.compiled_extension(file_path));

        Ok(SourceFile {
            id: identity(file_path),
            pid: identity(project_path),
            input: file_path.to_string(),
            output,
            file_type: ext,
            name,
        })
    }

    fn compiled_extension(&self, path: &str) -> String {
        match extension_of(path).as_deref() {
            Some("less") | Some("sass") | Some("scss") | Some("styl") => ".css".to_string(),
            Some("css") => ".min.css".to_string(),
            Some("js") => ".min.js".to_string(),
            _ => String::new(),
        }
    }
}
