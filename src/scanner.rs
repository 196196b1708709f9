// src/scanner.rs
// Recursive enumeration of supported files under a project root. This is
// the only component allowed to hit filesystem errors: the first error
// aborts the walk, is reported through the notifier, and whatever was
// collected so far is returned as a partial result.

use crate::events::Notifier;
use crate::file_types::FileTypes;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const MAX_DEPTH: usize = 30;

pub fn scan_supported_files(
    root: &Path,
    file_types: &dyn FileTypes,
    notifier: &dyn Notifier,
) -> Vec<PathBuf> {
    let mut collected = Vec::new();
    if let Err(e) = walk(root, file_types, &mut collected, 0) {
        eprintln!("[SCANNER] Walk aborted under {}: {}", root.display(), e);
        notifier.error(
            "Error !",
            "An error occurred while scanning files",
            &e.to_string(),
        );
    }
    collected
}

fn walk(
    dir: &Path,
    file_types: &dyn FileTypes,
    collected: &mut Vec<PathBuf>,
    depth: usize,
) -> io::Result<()> {
    if depth > MAX_DEPTH {
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(&path, file_types, collected, depth + 1)?;
        } else if file_types.is_supported(&path.to_string_lossy()) {
            collected.push(path);
        }
    }
    Ok(())
}
