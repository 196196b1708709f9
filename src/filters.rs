// src/filters.rs
// Plain substring exclusion filters. Both the project-level and the global
// pattern lists are comma-joined strings edited by the user; there is no
// glob or regex interpretation.

/// Returns true when `path` is excluded by the combined filter set.
/// Tokens are trimmed, empties dropped and the union deduplicated, so
/// `"test, ,test"` behaves the same as `"test"`. An empty combined set
/// excludes nothing.
pub fn matches_filters(project_patterns: &str, global_patterns: &str, path: &str) -> bool {
    let mut patterns: Vec<&str> = global_patterns
        .split(',')
        .chain(project_patterns.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    patterns.sort_unstable();
    patterns.dedup();

    patterns.iter().any(|pattern| path.contains(pattern))
}
