// src/watch/path_utils.rs

//! Utility functions for workspace-relative path handling.

use std::path::Path;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again.
///
/// Returns `None` if the path cannot be reasonably related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slash(rel));
    }

    // macOS reports events under /private/var for paths opened as /var.
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(to_slash(rel));
        }
    }

    None
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Lexically normalise a forward-slash relative path: drop empty and `.`
/// segments and resolve `..` against earlier segments.
///
/// `"myapp/../relative/path"` becomes `"relative/path"`; a path that
/// collapses to nothing becomes `"."`.
pub fn normalize_relative(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Join a project root and a project-relative path, treating `"."` as the
/// workspace root.
pub fn join_root(root: &str, rel: &str) -> String {
    if root == "." || root.is_empty() {
        normalize_relative(rel)
    } else {
        normalize_relative(&format!("{root}/{rel}"))
    }
}

/// True when `path` is `root` itself or lies underneath it.
pub fn is_within(root: &str, path: &str) -> bool {
    root == "." || path == root || path.starts_with(&format!("{root}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_parent_segments() {
        assert_eq!(normalize_relative("myapp/../relative/path"), "relative/path");
        assert_eq!(normalize_relative("./dist/./a/"), "dist/a");
        assert_eq!(normalize_relative("a/.."), ".");
        assert_eq!(normalize_relative("apps\\web\\..\\ui"), "apps/ui");
    }

    #[test]
    fn containment_respects_segment_boundaries() {
        assert!(is_within("libs/a", "libs/a/src/x.ts"));
        assert!(!is_within("libs/a", "libs/ab/src/x.ts"));
        assert!(is_within(".", "anything"));
    }
}
