//! Cache key construction and transposition variants.
//!
//! A key is `context:base64(normalized-query | sorted-params)`. A key longer
//! than the bound keeps a prefix and ends in `~` plus a SHA-256 digest of the
//! whole untruncated key, so distinct queries never share a key. `~` is
//! outside the base64url alphabet, so digested keys cannot collide with
//! plain ones. Paging options are excluded: the full result set is cached
//! once and paged per request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::types::SearchContext;

/// Default upper bound on key length, in bytes.
pub const DEFAULT_KEY_MAX_LEN: usize = 200;

/// Hex digits of the digest appended to an over-long key.
const DIGEST_LEN: usize = 32;

/// Smallest usable bound: the digest, its marker and a short prefix.
pub const MIN_KEY_MAX_LEN: usize = 64;

/// A primary cache key plus the alternates checked on a primary miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    primary: String,
    variants: Vec<String>,
}

impl CacheKey {
    /// Build the key for an already-normalised query.
    ///
    /// Two-token queries also get a word-swapped and a concatenated variant,
    /// so "weir andy" finds an entry written for "andy weir".
    pub fn new(
        context: SearchContext,
        normalized_query: &str,
        params: &BTreeMap<String, String>,
        max_len: usize,
    ) -> Self {
        let primary = encode(context, normalized_query, params, max_len);
        let tokens: Vec<&str> = normalized_query.split_whitespace().collect();
        let variants = match tokens.as_slice() {
            [first, second] => {
                let swapped = format!("{second} {first}");
                let joined = format!("{first}{second}");
                [swapped, joined]
                    .iter()
                    .map(|q| encode(context, q, params, max_len))
                    .filter(|k| *k != primary)
                    .collect()
            }
            _ => Vec::new(),
        };
        Self { primary, variants }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }
}

/// Encode one key. Params are emitted in sorted order (the map is ordered),
/// with keys lowercased and values trimmed.
fn encode(
    context: SearchContext,
    normalized_query: &str,
    params: &BTreeMap<String, String>,
    max_len: usize,
) -> String {
    let mut material = normalized_query.to_owned();
    let param_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", k.trim().to_ascii_lowercase(), v.trim()))
        .collect::<Vec<_>>()
        .join("&");
    if !param_string.is_empty() {
        material.push('|');
        material.push_str(&param_string);
    }
    let mut key = format!("{}:{}", context.as_str(), URL_SAFE_NO_PAD.encode(material));
    if key.len() <= max_len {
        return key;
    }
    let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
    // Base64 output is ASCII, so any byte index is a char boundary.
    key.truncate(max_len.saturating_sub(DIGEST_LEN + 1));
    key.push('~');
    key.push_str(&digest[..DIGEST_LEN]);
    key.truncate(max_len);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_params() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn key_is_prefixed_with_context() {
        let key = CacheKey::new(SearchContext::Author, "stephen king", &no_params(), 200);
        assert!(key.primary().starts_with("author:"));
    }

    #[test]
    fn key_is_deterministic() {
        let a = CacheKey::new(SearchContext::Title, "dune", &no_params(), 200);
        let b = CacheKey::new(SearchContext::Title, "dune", &no_params(), 200);
        assert_eq!(a, b);
    }

    #[test]
    fn context_separates_keys() {
        let a = CacheKey::new(SearchContext::Title, "dune", &no_params(), 200);
        let b = CacheKey::new(SearchContext::Subject, "dune", &no_params(), 200);
        assert_ne!(a.primary(), b.primary());
    }

    #[test]
    fn params_change_key_regardless_of_insertion_order() {
        let mut p1 = BTreeMap::new();
        p1.insert("lang".to_string(), "en".to_string());
        p1.insert("format".to_string(), "ebook".to_string());
        let mut p2 = BTreeMap::new();
        p2.insert("format".to_string(), "ebook".to_string());
        p2.insert("lang".to_string(), "en".to_string());

        let plain = CacheKey::new(SearchContext::Title, "dune", &no_params(), 200);
        let k1 = CacheKey::new(SearchContext::Title, "dune", &p1, 200);
        let k2 = CacheKey::new(SearchContext::Title, "dune", &p2, 200);
        assert_eq!(k1, k2);
        assert_ne!(k1.primary(), plain.primary());
    }

    #[test]
    fn key_is_bounded_by_max_len() {
        let long = "word ".repeat(200);
        let key = CacheKey::new(SearchContext::Title, long.trim(), &no_params(), 64);
        assert_eq!(key.primary().len(), 64);
        assert!(key.primary().starts_with("title:"));
        assert_eq!(key.primary().as_bytes()[64 - DIGEST_LEN - 1], b'~');
    }

    #[test]
    fn short_keys_carry_no_digest() {
        let key = CacheKey::new(SearchContext::Title, "dune", &no_params(), DEFAULT_KEY_MAX_LEN);
        assert!(!key.primary().contains('~'));
    }

    #[test]
    fn long_queries_differing_only_at_the_end_get_distinct_keys() {
        let stem = "chronicles ".repeat(15);
        let alpha = format!("{stem}volume alpha");
        let omega = format!("{stem}volume omega");
        let a = CacheKey::new(SearchContext::Title, &alpha, &no_params(), DEFAULT_KEY_MAX_LEN);
        let b = CacheKey::new(SearchContext::Title, &omega, &no_params(), DEFAULT_KEY_MAX_LEN);
        assert_eq!(a.primary().len(), DEFAULT_KEY_MAX_LEN);
        assert_eq!(b.primary().len(), DEFAULT_KEY_MAX_LEN);
        assert_ne!(a.primary(), b.primary());
        assert_eq!(
            a,
            CacheKey::new(SearchContext::Title, &alpha, &no_params(), DEFAULT_KEY_MAX_LEN)
        );
    }

    #[test]
    fn two_token_query_gets_swapped_and_joined_variants() {
        let key = CacheKey::new(SearchContext::Author, "weir andy", &no_params(), 200);
        let swapped = CacheKey::new(SearchContext::Author, "andy weir", &no_params(), 200);
        let joined = CacheKey::new(SearchContext::Author, "weirandy", &no_params(), 200);
        assert_eq!(key.variants().len(), 2);
        assert!(key.variants().contains(&swapped.primary().to_string()));
        assert!(key.variants().contains(&joined.primary().to_string()));
    }

    #[test]
    fn other_token_counts_have_no_variants() {
        assert!(CacheKey::new(SearchContext::Title, "dune", &no_params(), 200)
            .variants()
            .is_empty());
        assert!(CacheKey::new(SearchContext::Title, "lord rings fellowship", &no_params(), 200)
            .variants()
            .is_empty());
    }

    #[test]
    fn palindromic_pair_does_not_repeat_primary() {
        let key = CacheKey::new(SearchContext::Author, "bo bo", &no_params(), 200);
        assert!(!key.variants().iter().any(|v| v == key.primary()));
        assert_eq!(key.variants().len(), 1);
    }
}
