use sha2::{Digest, Sha256};

/// Normalize a name into a URL-safe slug: lowercase, strip non-alphanumeric
/// (keeping spaces), collapse whitespace, replace spaces with hyphens.
///
/// ```
/// assert_eq!(ingestlake_common::slugify("Payments DB"), "payments-db");
/// assert_eq!(ingestlake_common::slugify("  Multiple   Spaces  "), "multiple-spaces");
/// ```
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<&str>>().join("-")
}

/// Stable content hash used to dedupe staged payload bytes and to derive
/// idempotent identity components where a natural key is unavailable.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Join non-empty identity components with `:`, used by both the catalog
/// store's dataset identity derivation and the CDM mapper's deterministic
/// ID builder.
pub fn join_identity<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_strips_punctuation_and_collapses_spaces() {
        assert_eq!(slugify("Lake St. Church!!!"), "lake-st-church");
    }

    #[test]
    fn content_hash_is_stable_and_distinguishes_inputs() {
        let a = content_hash(b"hello");
        let b = content_hash(b"hello");
        let c = content_hash(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn join_identity_skips_empty_parts() {
        assert_eq!(join_identity(["tenant-1", "", "postgres", "public", "orders"]),
            "tenant-1:postgres:public:orders");
    }
}
