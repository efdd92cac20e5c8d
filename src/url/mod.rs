//! URL handling module for Aisle-Sweep
//!
//! This module provides product URL canonicalization and the per-job
//! deduplicating URL set.

mod normalize;

use std::collections::HashSet;
use url::Url;

// Re-export main functions
pub use normalize::{canonicalize, last_path_segment};

/// Deduplicating collection of canonical product URLs for one job
///
/// Membership is decided by the canonical form. Iteration follows insertion
/// order, so the fetcher sees a stable materialization of the set.
#[derive(Debug, Clone, Default)]
pub struct ProductUrlSet {
    seen: HashSet<String>,
    ordered: Vec<Url>,
}

impl ProductUrlSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a URL, canonicalizing it first
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The canonical form was not yet present
    /// * `Ok(false)` - A URL with the same canonical form is already stored
    /// * `Err(UrlError)` - The URL could not be canonicalized
    pub fn insert(&mut self, raw: &str) -> crate::UrlResult<bool> {
        let canonical = canonicalize(raw, None)?;
        Ok(self.push(canonical))
    }

    /// Inserts a parsed URL, canonicalizing it first
    ///
    /// Same results as [`insert`](Self::insert).
    pub fn insert_url(&mut self, url: &Url) -> crate::UrlResult<bool> {
        self.insert(url.as_str())
    }

    fn push(&mut self, url: Url) -> bool {
        if self.seen.insert(url.as_str().to_string()) {
            self.ordered.push(url);
            true
        } else {
            false
        }
    }

    /// Returns true if a URL with the same canonical form is present
    pub fn contains(&self, raw: &str) -> bool {
        canonicalize(raw, None)
            .map(|url| self.seen.contains(url.as_str()))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Iterates the URLs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.ordered.iter()
    }

    /// Returns a snapshot of the URLs in insertion order
    pub fn to_vec(&self) -> Vec<Url> {
        self.ordered.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_variants_dedupe() {
        let mut set = ProductUrlSet::new();
        assert!(set.insert("https://www.homedepot.com/p/x?ref=1").unwrap());
        assert!(!set.insert("https://www.homedepot.com/p/x?ref=2").unwrap());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_size_matches_distinct_canonical_forms() {
        let inputs = [
            "https://www.homedepot.com/p/a/1",
            "https://www.homedepot.com/p/a/1?x=1",
            "https://www.homedepot.com/p/b/2#top",
            "https://www.homedepot.com/p/b/2",
            "https://WWW.HOMEDEPOT.COM/p/c/3",
            "https://www.homedepot.com/p/c/3?store=1&x=2",
            "https://www.homedepot.com/p/d/4",
        ];

        let mut set = ProductUrlSet::new();
        for input in inputs {
            set.insert(input).unwrap();
        }

        let distinct: HashSet<String> = inputs
            .iter()
            .map(|u| canonicalize(u, None).unwrap().to_string())
            .collect();
        assert_eq!(set.len(), distinct.len());
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut set = ProductUrlSet::new();
        set.insert("https://www.lowes.com/pd/c/3").unwrap();
        set.insert("https://www.lowes.com/pd/a/1").unwrap();
        set.insert("https://www.lowes.com/pd/b/2").unwrap();

        let order: Vec<&str> = set.iter().map(|u| u.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "https://www.lowes.com/pd/c/3",
                "https://www.lowes.com/pd/a/1",
                "https://www.lowes.com/pd/b/2",
            ]
        );
    }

    #[test]
    fn test_contains_uses_canonical_form() {
        let mut set = ProductUrlSet::new();
        set.insert("https://www.homedepot.com/p/x/1").unwrap();
        assert!(set.contains("https://www.homedepot.com/p/x/1?utm_source=mail"));
        assert!(!set.contains("https://www.homedepot.com/p/y/2"));
        assert!(!set.contains("not a url"));
    }

    #[test]
    fn test_parsed_urls_are_canonicalized() {
        let mut set = ProductUrlSet::new();
        let first = Url::parse("https://www.homedepot.com/p/x/1?ref=1").unwrap();
        let second = Url::parse("https://www.homedepot.com/p/x/1?ref=2#reviews").unwrap();

        assert!(set.insert_url(&first).unwrap());
        assert!(!set.insert_url(&second).unwrap());
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.iter().next().map(Url::as_str),
            Some("https://www.homedepot.com/p/x/1")
        );

        let ftp = Url::parse("ftp://www.homedepot.com/p/x/1").unwrap();
        assert!(set.insert_url(&ftp).is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut set = ProductUrlSet::new();
        assert!(set.insert("not a url").is_err());
        assert!(set.is_empty());
    }
}
