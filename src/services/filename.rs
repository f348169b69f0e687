//! Filenames destined for `Content-Disposition`.

/// Used when nothing printable survives sanitizing.
pub const FALLBACK_FILENAME: &str = "download";

/// Make a display filename safe to place inside a quoted header parameter.
///
/// Drops NUL, CR, LF, double quotes, backslashes and every other ASCII
/// control character. Non-ASCII text is kept.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_ascii_control() && !matches!(c, '"' | '\\'))
        .collect();
    let trimmed = cleaned.trim();

    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `inline` or `attachment` disposition with a sanitized filename.
pub fn content_disposition(name: &str, attachment: bool) -> String {
    let kind = if attachment { "attachment" } else { "inline" };
    format!("{}; filename=\"{}\"", kind, sanitize(name))
}
