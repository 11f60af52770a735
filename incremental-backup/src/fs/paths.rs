//! Canonical relative-path keys.
//!
//! Snapshot keys are POSIX-style paths relative to the scanned root: `/`
//! separators, no leading separator, no `.` segments, no empty segments.
//! Keys coming from disk and keys coming from an older metadata file both go
//! through [`normalize_key`] before they are compared.

use std::path::{Component, Path};

/// Normalize a relative path string into its canonical key form.
pub fn normalize_key(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    parts.join("/")
}

/// Build the key for `path` relative to `root`.
///
/// Returns `None` when `path` is not under `root` or is the root itself.
pub fn relative_key(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;

    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if segments.is_empty() {
        return None;
    }

    Some(normalize_key(&segments.join("/")))
}
