//! Output truncation for tools that echo command stdout/stderr.

/// Default cap on combined command output embedded in a tool result.
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 20_000;
/// Hard ceiling a tool may raise the cap to.
pub const MAX_OUTPUT_CHARS_CEILING: usize = 200_000;

/// Result of a truncation pass.
pub struct TruncatedOutput {
    pub text: String,
    pub was_truncated: bool,
}

impl TruncatedOutput {
    /// Notice appended to the tool's `message` when output was cut.
    pub fn notice(&self, limit: usize) -> Option<String> {
        self.was_truncated
            .then(|| format!("output truncated to {} chars", limit))
    }
}

/// Clamp a requested cap into the allowed range.
pub fn clamp_output_chars(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_MAX_OUTPUT_CHARS)
        .min(MAX_OUTPUT_CHARS_CEILING)
}

/// Cap `text` at `max_chars`, cutting on a char boundary and appending the
/// truncation marker.
pub fn truncate_output(text: &str, max_chars: usize) -> TruncatedOutput {
    if text.chars().count() <= max_chars {
        return TruncatedOutput {
            text: text.to_string(),
            was_truncated: false,
        };
    }

    let mut kept: String = text.chars().take(max_chars).collect();
    kept.push_str(&format!("…(truncated to {} chars)", max_chars));
    TruncatedOutput {
        text: kept,
        was_truncated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_passes_through() {
        let out = truncate_output("hello", 100);
        assert!(!out.was_truncated);
        assert_eq!(out.text, "hello");
    }

    #[test]
    fn long_output_is_cut_with_marker() {
        let text = "x".repeat(50);
        let out = truncate_output(&text, 10);
        assert!(out.was_truncated);
        assert!(out.text.starts_with("xxxxxxxxxx…"));
        assert!(out.text.contains("truncated to 10 chars"));
    }

    #[test]
    fn multibyte_boundary_is_respected() {
        let text = "é".repeat(30);
        let out = truncate_output(&text, 10);
        assert!(out.was_truncated);
        assert!(out.text.starts_with(&"é".repeat(10)));
    }

    #[test]
    fn cap_is_clamped_to_ceiling() {
        assert_eq!(clamp_output_chars(None), DEFAULT_MAX_OUTPUT_CHARS);
        assert_eq!(clamp_output_chars(Some(500)), 500);
        assert_eq!(clamp_output_chars(Some(900_000)), MAX_OUTPUT_CHARS_CEILING);
    }
}
