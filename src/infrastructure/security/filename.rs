// ============================================================
// FILENAME SANITIZATION
// ============================================================
// Rewrite client-declared filenames into safe display and storage names

/// Longest filename (in bytes) handed to downstream consumers.
pub const MAX_FILENAME_BYTES: usize = 255;

/// Rewrite a client-declared filename into one that is safe to display or to
/// use as a storage key.
///
/// Only the last path component survives; control characters are dropped,
/// `..` runs collapse to a single `.`, anything outside `[A-Za-z0-9 ._()-]`
/// becomes `_`. When nothing usable is left, `fallback` is returned.
pub fn sanitize_filename(declared: &str, fallback: &str) -> String {
    let last_component = declared
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("");

    let mut cleaned = String::with_capacity(last_component.len());
    for c in last_component.chars().filter(|c| !c.is_control()) {
        let c = if c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-' | '(' | ')') {
            c
        } else {
            '_'
        };
        match (cleaned.chars().last(), c) {
            (Some('.'), '.') | (Some('_'), '_') => continue,
            _ => cleaned.push(c),
        }
    }

    let trimmed = cleaned
        .trim_start_matches(|c| c == '.' || c == ' ')
        .trim_end_matches(|c| c == '.' || c == ' ');

    // A name without both a stem and an extension is not worth keeping.
    let unusable = match trimmed.rsplit_once('.') {
        Some((stem, ext)) => {
            stem.trim_matches(|c| c == '_' || c == ' ').is_empty() || ext.is_empty()
        }
        None => true,
    };
    if unusable {
        return fallback.to_string();
    }

    truncate_preserving_extension(trimmed, MAX_FILENAME_BYTES)
}

fn truncate_preserving_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }
    // Everything here is ASCII, so byte offsets are char boundaries.
    match name.rsplit_once('.') {
        Some((stem, ext)) if ext.len() + 1 < max_bytes => {
            let keep = max_bytes - ext.len() - 1;
            format!("{}.{}", &stem[..keep.min(stem.len())], ext)
        }
        _ => name[..max_bytes].to_string(),
    }
}
