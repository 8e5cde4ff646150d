//! Helpers for keeping server-side details out of span attributes and
//! caller-visible messages.
//!
//! Neither traces nor error bodies may reveal the configured base path or
//! share tokens.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks the token segment of a public share URL.
///
/// - `https://uni.sciebo.de/s/AbCdEf` → `https://uni.sciebo.de/s/****`
/// - `https://uni.sciebo.de/index.php/s/AbCdEf/download` → `https://uni.sciebo.de/index.php/s/****/download`
/// - `https://zenodo.org/record/123` → unchanged
pub fn redact_share_url(url: &str) -> String {
    let Some(pos) = url.find("/s/") else {
        return url.to_string();
    };
    let (head, tail) = url.split_at(pos + 3);
    match tail.find(['/', '?', '#']) {
        Some(end) => format!("{}****{}", head, &tail[end..]),
        None if tail.is_empty() => url.to_string(),
        None => format!("{}****", head),
    }
}

/// Removes every occurrence of `base` from `message`.
pub fn strip_base(message: &str, base: &Path) -> String {
    let base = base.to_string_lossy();
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return message.to_string();
    }
    message.replace(&format!("{}/", base), "").replace(base, "")
}

/// Path of `path` relative to `root`, with forward slashes.
///
/// Falls back to the file name when `path` is outside `root`.
pub fn relative_path(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => redact_path(path),
    }
}
