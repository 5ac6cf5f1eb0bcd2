//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Display Name Normalisation
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of Unicode code points retained in a display name.
pub const MAX_DISPLAY_NAME_CODEPOINTS: usize = 32;

/// Trims leading/trailing whitespace and truncates to [`MAX_DISPLAY_NAME_CODEPOINTS`]
/// Unicode code points.
#[must_use]
pub fn normalize_display_name(name: &str) -> String {
    name.trim()
        .chars()
        .take(MAX_DISPLAY_NAME_CODEPOINTS)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Archive Filename Derivation
// ─────────────────────────────────────────────────────────────────────────────

/// Derives a filesystem-safe stem from a display name, keeping only
/// `[A-Za-z0-9_-]`. Falls back to `agent_<id>` if nothing survives.
#[must_use]
pub fn safe_archive_stem(display_name: &str, slot_id: u8) -> String {
    let filtered: String = display_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if filtered.is_empty() {
        format!("agent_{}", slot_id)
    } else {
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_nonzero() {
        assert!(now_millis() > 0);
    }

    #[test]
    fn normalize_display_name_trims_whitespace() {
        assert_eq!(normalize_display_name("  Foo  "), "Foo");
    }

    #[test]
    fn normalize_display_name_truncates_to_32_codepoints() {
        let long_name = "a".repeat(50);
        assert_eq!(normalize_display_name(&long_name).chars().count(), 32);
    }

    #[test]
    fn normalize_display_name_counts_codepoints_not_bytes() {
        // Each of these is a multi-byte UTF-8 scalar but a single code point.
        let name: String = std::iter::repeat('é').take(40).collect();
        assert_eq!(normalize_display_name(&name).chars().count(), 32);
    }

    #[test]
    fn safe_archive_stem_keeps_allowed_chars() {
        assert_eq!(safe_archive_stem("Foo Bar-42_baz!", 3), "FooBar-42_baz");
    }

    #[test]
    fn safe_archive_stem_falls_back_when_empty() {
        assert_eq!(safe_archive_stem("   ", 5), "agent_5");
        assert_eq!(safe_archive_stem("", 5), "agent_5");
    }
}
