//! Novel and chapter data model.
//!
//! A [`Novel`] is identified by a hash of its canonical URL (see [`novel_id`]),
//! and its chapters by the pair `(novel_id, index)` with a 1-based index.

mod types;

pub use types::*;

use sha2::{Digest, Sha256};

/// Derive the canonical id of a novel from its URL.
///
/// Surrounding whitespace and trailing slashes are ignored so that
/// `https://site/novel/` and `https://site/novel` map to the same id.
/// The id is the hex encoding of the first 16 bytes of the SHA-256 digest.
pub fn novel_id(canonical_url: &str) -> String {
    let canonical = canonical_url.trim().trim_end_matches('/');
    let digest = Sha256::digest(canonical.as_bytes());
    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_novel_id_is_stable() {
        let a = novel_id("https://novelfire.net/book/shadow-slave");
        let b = novel_id("https://novelfire.net/book/shadow-slave");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_novel_id_ignores_trailing_slash_and_whitespace() {
        assert_eq!(
            novel_id("https://www.royalroad.com/fiction/21220/mother-of-learning"),
            novel_id("  https://www.royalroad.com/fiction/21220/mother-of-learning/ ")
        );
    }

    #[test]
    fn test_novel_id_differs_per_url() {
        assert_ne!(
            novel_id("https://novelfire.net/book/a"),
            novel_id("https://novelfire.net/book/b")
        );
    }
}
