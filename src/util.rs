//! Shared utility functions for the wreckit crate.

/// Turn arbitrary title text into a URL-safe, lowercase slug.
///
/// Runs of non-alphanumeric characters collapse to a single `-`; leading and
/// trailing `-` are trimmed.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash && !slug.is_empty() {
            slug.push('-');
            last_was_dash = true;
        }
    }
    if slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Format an item id from an ordinal and title: `NNN-slug`.
///
/// The ordinal is zero-padded to three digits, but widens naturally past
/// 999 rather than truncating.
pub fn format_item_id(ordinal: u32, title: &str) -> String {
    format!("{:03}-{}", ordinal, slugify(title))
}

/// Parse the zero-padded ordinal prefix out of an item id (`NNN-slug`).
pub fn parse_ordinal(id: &str) -> Option<u32> {
    id.split('-').next()?.parse().ok()
}
