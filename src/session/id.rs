//! Session id generation: `<date>-<slug>-<hex>`.

use chrono::Utc;
use std::path::Path;
use uuid::Uuid;

/// Maximum slug length before the random suffix is appended.
pub const MAX_SLUG_LEN: usize = 72;

/// Slug used when a description has no usable characters.
pub const FALLBACK_SLUG: &str = "session";

const SUFFIX_LEN: usize = 6;

/// Lower-case the description, drop anything that is not ASCII alphanumeric or
/// whitespace, and join the remaining words with hyphens.
pub fn slugify(description: &str) -> String {
    let cleaned: String = description
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();

    let mut slug = cleaned.split_whitespace().collect::<Vec<_>>().join("-");
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string()
}

/// Generate an id, regenerating the random suffix until `is_taken` rejects none.
pub fn generate_id_with<F>(description: &str, is_taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    let prefix = format!("{}-{}", Utc::now().format("%Y-%m-%d"), slugify(description));
    loop {
        let id = format!("{}-{}", prefix, random_suffix());
        if !is_taken(&id) {
            return id;
        }
        tracing::debug!(id = %id, "session id collision, regenerating");
    }
}

/// Generate an id that does not collide with an existing directory under `sessions_dir`.
pub fn generate_id(description: &str, sessions_dir: &Path) -> String {
    generate_id_with(description, |id| sessions_dir.join(id).exists())
}

/// Split an id back into its slug portion (date and suffix removed).
pub fn slug_of(id: &str) -> Option<&str> {
    // date is YYYY-MM-DD (10 chars) followed by '-'
    let rest = id.get(11..)?;
    let cut = rest.rfind('-')?;
    Some(&rest[..cut])
}
