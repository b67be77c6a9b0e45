//! Slug generation for output filenames/directories.

/// Maximum length for generated slugs.
const MAX_SLUG_LENGTH: usize = 30;

/// Convert a string to a URL-friendly slug (basic conversion).
///
/// Does NOT truncate - use `slugify_truncate` for length-limited slugs.
pub fn slugify(title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();

    // Collapse consecutive dashes and trim leading/trailing dashes
    let mut result = String::new();
    let mut prev_dash = true;
    for c in slug.chars() {
        if c == '-' {
            if !prev_dash {
                result.push(c);
            }
            prev_dash = true;
        } else {
            result.push(c);
            prev_dash = false;
        }
    }

    if result.ends_with('-') {
        result.pop();
    }

    result
}

/// Convert a string to a URL-friendly slug with truncation, preferring to
/// break at word boundaries to stay under `MAX_SLUG_LENGTH`.
pub fn slugify_truncate(task: &str) -> String {
    let mut result = slugify(task);

    if result.len() > MAX_SLUG_LENGTH {
        if let Some(pos) = result[..MAX_SLUG_LENGTH].rfind('-') {
            result.truncate(pos);
        } else {
            result.truncate(MAX_SLUG_LENGTH);
        }
    }

    if result.ends_with('-') {
        result.pop();
    }

    result
}
