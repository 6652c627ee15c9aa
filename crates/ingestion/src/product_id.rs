//! Product identifiers
//!
//! `<slug(name), at most 48 chars>-<first 8 hex chars of SHA-1(name)>`. The
//! same name always yields the same id; distinct names colliding on both slug
//! and hash prefix is an accepted risk.

use deunicode::deunicode;
use regex_lite::Regex;
use sha1::{Digest, Sha1};
use std::fmt;
use std::sync::OnceLock;

/// Maximum slug length before the hash suffix
pub const SLUG_MAX_LEN: usize = 48;

/// Hex characters of the name digest kept in the id
pub const HASH_LEN: usize = 8;

/// Name used when a record carries none
pub const DEFAULT_PRODUCT_NAME: &str = "Unnamed";

fn separator_run() -> &'static Regex {
    static SEPARATOR_RUN: OnceLock<Regex> = OnceLock::new();
    SEPARATOR_RUN.get_or_init(|| Regex::new("[^a-z0-9]+").expect("separator pattern is valid"))
}

/// Remove commas sitting between two digits: `1,5` becomes `15`
fn drop_digit_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .filter(|&(i, &c)| {
            !(c == ','
                && i > 0
                && chars[i - 1].is_ascii_digit()
                && chars.get(i + 1).is_some_and(|next| next.is_ascii_digit()))
        })
        .map(|(_, &c)| c)
        .collect()
}

/// ASCII-fold, lowercase and hyphenate a display name
pub fn slugify(name: &str) -> String {
    let folded = drop_digit_commas(&deunicode(name).to_lowercase());
    separator_run()
        .replace_all(&folded, "-")
        .trim_matches('-')
        .to_string()
}

/// First `HASH_LEN` lowercase hex characters of SHA-1 over the raw name bytes
pub fn name_digest(name: &str) -> String {
    let mut digest = hex::encode(Sha1::digest(name.as_bytes()));
    digest.truncate(HASH_LEN);
    digest
}

/// Deterministic identifier derived from a product display name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductId(String);

impl ProductId {
    pub fn from_name(name: &str) -> Self {
        let mut slug = slugify(name);
        // slug is pure ASCII, any byte index is a char boundary
        slug.truncate(SLUG_MAX_LEN);
        Self(format!("{}-{}", slug, name_digest(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Slug portion (may be empty for names with no ASCII-foldable characters)
    pub fn slug(&self) -> &str {
        self.0.rsplit_once('-').map(|(slug, _)| slug).unwrap_or("")
    }

    /// Hash portion
    pub fn hash(&self) -> &str {
        self.0.rsplit_once('-').map(|(_, hash)| hash).unwrap_or(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_lower_hex(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    #[test]
    fn test_deterministic() {
        let a = ProductId::from_name("Havredryck Vanilj");
        let b = ProductId::from_name("Havredryck Vanilj");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("havredryck-vanilj-"));
    }

    #[test]
    fn test_known_digests() {
        // SHA-1("abc") = a9993e36...
        assert_eq!(ProductId::from_name("abc").as_str(), "abc-a9993e36");
        // SHA-1("") = da39a3ee...
        assert_eq!(ProductId::from_name("").as_str(), "-da39a3ee");
    }

    #[test]
    fn test_shape_for_assorted_names() {
        let names = [
            "Havredryck Vanilj",
            "Äppeljuice – Ekologisk 1L",
            "  --Crème brûlée!!  ",
            "ÖÖÖ",
            "Laktosfri mjölk 1,5% fett, 1 liter, extra lång hållbarhet, Arla Ko",
            "日本茶",
        ];

        for name in names {
            let id = ProductId::from_name(name);
            assert!(id.slug().len() <= SLUG_MAX_LEN, "{id}");
            assert_eq!(id.hash().len(), HASH_LEN, "{id}");
            assert!(is_lower_hex(id.hash()), "{id}");
            assert!(id
                .slug()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }

    #[test]
    fn test_slug_folding() {
        assert_eq!(slugify("Äppeljuice Öl"), "appeljuice-ol");
        assert_eq!(slugify("  --Crème brûlée!!  "), "creme-brulee");
        assert_eq!(slugify("A  &  B"), "a-b");
    }

    #[test]
    fn test_decimal_comma_dropped() {
        assert_eq!(slugify("Laktosfri mjölk 1,5% fett"), "laktosfri-mjolk-15-fett");
        assert_eq!(slugify("1,2,3"), "123");
        // Only between digits
        assert_eq!(slugify("Salt, peppar"), "salt-peppar");
        assert_eq!(slugify("3, 4"), "3-4");
    }

    #[test]
    fn test_long_name_truncated() {
        let name = "x".repeat(100);
        let id = ProductId::from_name(&name);
        assert_eq!(id.slug(), "x".repeat(SLUG_MAX_LEN));
    }

    #[test]
    fn test_hash_uses_raw_name() {
        // Same slug, different raw bytes
        let a = ProductId::from_name("Kaffe");
        let b = ProductId::from_name("kaffe");
        assert_eq!(a.slug(), b.slug());
        assert_ne!(a.hash(), b.hash());
    }
}
