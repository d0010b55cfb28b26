//! Deterministic content fingerprint for a normalized text fragment.
//!
//! 16 hex characters (64 bits) is the identity carried in every downstream
//! table. The collision risk at that width is accepted for compactness; this
//! is a deliberate tradeoff, not an oversight.

use sha2::{Digest, Sha256};

/// Collapse all whitespace runs to a single space and trim the ends.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// First 16 lowercase hex characters of SHA-256 over the UTF-8 bytes of `s`.
///
/// Callers must pass already-normalized text; this function does not
/// normalize on your behalf so that callers can hash the exact string they
/// intend to persist.
pub fn hash(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        assert_eq!(hash("hello world"), hash("hello world"));
    }

    #[test]
    fn hash_is_16_hex_chars() {
        let h = hash("hello world");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_differs_for_different_text() {
        assert_ne!(hash("hello"), hash("world"));
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  Hello\n\t world  "), "Hello world");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("a   b\n\nc");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn whitespace_equivalent_fragments_hash_equal() {
        let a = normalize("Hello   world");
        let b = normalize("Hello\nworld");
        assert_eq!(hash(&a), hash(&b));
    }
}
