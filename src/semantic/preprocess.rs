//! Title preprocessing for embedding generation.
//!
//! 1. Trim and collapse whitespace
//! 2. Truncate to max length with ellipsis

/// Maximum content length for embedding input (characters, not tokens)
const MAX_CONTENT_LENGTH: usize = 512;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Prepare a bookmark title for the embedding model.
pub fn preprocess_title(title: &str) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_content(&collapsed)
}

/// Truncate content to MAX_CONTENT_LENGTH characters, adding ellipsis if truncated.
fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_LENGTH {
        return content.to_string();
    }

    let max_chars = MAX_CONTENT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

/// Hash of the text that gets embedded. Rows with an unchanged hash keep
/// their stored vector on refresh.
pub fn content_hash(title: &str) -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    preprocess_title(title).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_collapses_whitespace() {
        assert_eq!(preprocess_title("  Rust \n  Book\t"), "Rust Book");
    }

    #[test]
    fn test_truncation() {
        let long_title = "x".repeat(600);
        let content = preprocess_title(&long_title);

        assert_eq!(content.chars().count(), MAX_CONTENT_LENGTH);
        assert!(content.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let long_title = "日本語".repeat(300);
        let content = preprocess_title(&long_title);
        assert_eq!(content.chars().count(), MAX_CONTENT_LENGTH);
    }

    #[test]
    fn test_no_truncation_for_short_content() {
        assert_eq!(preprocess_title("Short title"), "Short title");
    }

    #[test]
    fn test_content_hash_consistency() {
        assert_eq!(content_hash("Title"), content_hash("Title"));
        assert_eq!(content_hash("  Title  "), content_hash("Title"));
        assert_ne!(content_hash("Title A"), content_hash("Title B"));
    }
}
