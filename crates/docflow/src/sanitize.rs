//! Helpers for object keys: safety checks before a key is mapped onto the
//! filesystem, and redaction before a key enters tracing span attributes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Returns `true` for a non-empty single path segment (no separators, not
/// `.` or `..`).
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains('/')
        && !segment.contains('\\')
        && !segment.contains('\0')
}

/// Checks an object key, returning the reason it is unsafe.
///
/// Keys are `/`-separated relative paths. Empty keys, absolute keys,
/// backslashes, empty segments and `.`/`..` segments are rejected.
pub fn check_key(key: &str) -> Result<(), &'static str> {
    if key.is_empty() {
        return Err("key is empty");
    }
    if key.starts_with('/') {
        return Err("key is absolute");
    }
    if key.contains('\\') {
        return Err("key contains a backslash");
    }
    if key.split('/').any(|segment| !is_safe_segment(segment)) {
        return Err("key contains an empty, '.' or '..' segment");
    }
    Ok(())
}

pub fn is_safe_key(key: &str) -> bool {
    check_key(key).is_ok()
}

/// Returns only the last segment of a key.
///
/// Safe for span fields: reveals the object name without its prefix.
pub fn redact_key(key: &str) -> String {
    key.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns a short deterministic hash of a key for correlation without
/// exposing the key.
pub fn hash_key(key: &str) -> String {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
