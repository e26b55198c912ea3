//! Utility functions.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Cuts on character boundaries, so multi-byte UTF-8 input is safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Format a byte count as whole mebibytes, e.g. `52428800` → `"50MB"`.
pub fn format_megabytes(bytes: usize) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    format!("{:.0}MB", bytes as f64 / MB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("hello", 10), "hello");
        assert_eq!(truncate_with_ellipsis("hello world", 5), "hello...");
        assert_eq!(truncate_with_ellipsis("😀😀😀😀", 2), "😀😀...");
        assert_eq!(truncate_with_ellipsis("", 10), "");
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(50 * 1024 * 1024), "50MB");
        assert_eq!(format_megabytes(1024 * 1024), "1MB");
        assert_eq!(format_megabytes(0), "0MB");
    }
}
