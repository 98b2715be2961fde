//! Path utilities for the file registry and the resolvers.
//!
//! Normalization is purely lexical: the registry must agree with in-memory
//! file systems, so nothing here touches the disk or follows symlinks.

use std::path::{Component, Path, PathBuf};

/// Make `path` absolute against `root` and fold `.` and `..` components.
///
/// `..` at the filesystem root is dropped, the same way `/..` is `/`.
pub fn normalize_path(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_relative() {
        root.join(path)
    } else {
        path.to_path_buf()
    };
    clean(&joined)
}

/// Fold `.` and `..` components without anchoring to a root.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    _ => false,
                };
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Extension of `path` without the dot, lowercased.
pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether `path` ends in one of `extensions` (given WITHOUT dots, e.g. `["go"]`).
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    file_extension(path).is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
}

/// Strip file extension from a path string.
///
/// Extensions do NOT include the dot. Tries each in order, returns the first match.
pub fn strip_extension<'a>(path_str: &'a str, extensions: &[&str]) -> &'a str {
    for ext in extensions {
        let suffix = format!(".{ext}");
        if let Some(stripped) = path_str.strip_suffix(&suffix) {
            return stripped;
        }
    }
    path_str
}

/// `path` relative to `root` for display, or `path` itself when outside it.
pub fn display_relative<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
