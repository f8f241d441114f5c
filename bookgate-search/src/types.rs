//! Core types: search contexts, provider identities, works, editions and the
//! response shapes returned at the edge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::isbn;
use crate::query::normalize::normalize_text;

/// The semantic category of a search, which selects routing and cache TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchContext {
    /// Works by a named author.
    Author,
    /// Works matching a title.
    Title,
    /// Works filed under a subject.
    Subject,
    /// A single edition looked up by ISBN-10 or ISBN-13.
    Isbn,
}

impl SearchContext {
    /// Lowercase identifier used in paths and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Title => "title",
            Self::Subject => "subject",
            Self::Isbn => "isbn",
        }
    }

    /// Returns all context variants.
    pub fn all() -> &'static [SearchContext] {
        &[Self::Author, Self::Title, Self::Subject, Self::Isbn]
    }
}

impl fmt::Display for SearchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "author" => Ok(Self::Author),
            "title" => Ok(Self::Title),
            "subject" => Ok(Self::Subject),
            "isbn" => Ok(Self::Isbn),
            other => Err(format!("unknown search context: {other}")),
        }
    }
}

/// Upstream metadata providers the engine knows how to route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Open Library: free, canonical bibliography and subject taxonomy.
    OpenLibrary,
    /// Google Books: general catalogue, keyed and rate-limited.
    GoogleBooks,
    /// ISBNdb: paid ISBN specialist.
    Isbndb,
}

impl ProviderId {
    /// Stable snake_case identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenLibrary => "open_library",
            Self::GoogleBooks => "google_books",
            Self::Isbndb => "isbndb",
        }
    }

    /// Whether calls to this provider cost money or quota.
    pub fn is_metered(&self) -> bool {
        !matches!(self, Self::OpenLibrary)
    }

    /// Returns all provider variants.
    pub fn all() -> &'static [ProviderId] {
        &[Self::OpenLibrary, Self::GoogleBooks, Self::Isbndb]
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contributor to a work.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Display name as supplied by the provider.
    pub name: String,
    /// Provider identifier → provider's id for this author.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_ids: BTreeMap<String, String>,
}

impl Author {
    /// An author with no external ids.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            external_ids: BTreeMap::new(),
        }
    }
}

/// A concrete published instance of a [`Work`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edition {
    /// ISBN-13, derived from the ISBN-10 when only that was supplied.
    pub isbn13: Option<String>,
    /// ISBN-10, derived from a 978-prefixed ISBN-13 when possible.
    pub isbn10: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub format: Option<String>,
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_ids: BTreeMap<String, String>,
}

impl Edition {
    /// Build an edition from either ISBN form, deriving the other.
    ///
    /// Returns `None` when `raw` is not a valid ISBN.
    pub fn from_isbn(raw: &str) -> Option<Self> {
        let isbn13 = isbn::canonical_isbn13(raw)?;
        let isbn10 = isbn::isbn13_to_isbn10(&isbn13);
        Some(Self {
            isbn13: Some(isbn13),
            isbn10,
            ..Default::default()
        })
    }
}

/// An abstract creative work, as merged from one or more providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Work {
    pub title: String,
    /// Lowercased, punctuation-free title used for identity.
    pub normalized_title: String,
    pub authors: Vec<Author>,
    pub first_publication_year: Option<i32>,
    /// Provider identifier → provider's id for this work.
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
    /// Subjects or categories reported by the provider.
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub editions: Vec<Edition>,
    /// Provider that supplied this record.
    pub source: ProviderId,
}

impl Work {
    /// A work with the given title, authors and source; other fields empty.
    pub fn new(title: impl Into<String>, authors: Vec<Author>, source: ProviderId) -> Self {
        let title = title.into();
        Self {
            normalized_title: normalize_text(&title),
            title,
            authors,
            first_publication_year: None,
            external_ids: BTreeMap::new(),
            categories: Vec::new(),
            editions: Vec::new(),
            source,
        }
    }

    /// Name of the first listed author, if any.
    pub fn primary_author(&self) -> Option<&str> {
        self.authors.first().map(|a| a.name.as_str())
    }

    /// Stable identity for this work.
    ///
    /// Prefers the `(normalized-title, primary-author)` composite, which is
    /// the same whichever provider supplied the record; falls back to the
    /// first external id when title or author is missing.
    pub fn identity_key(&self) -> Option<String> {
        let author = self.primary_author().map(normalize_text).unwrap_or_default();
        if !self.normalized_title.is_empty() && !author.is_empty() {
            return Some(format!("{}|{}", self.normalized_title, author));
        }
        self.external_ids
            .iter()
            .next()
            .map(|(provider, id)| format!("{provider}:{id}"))
    }

    /// Number of populated descriptive fields, used to break dedup ties.
    pub fn populated_fields(&self) -> usize {
        let mut count = 0;
        if !self.title.is_empty() {
            count += 1;
        }
        count += usize::from(!self.authors.is_empty());
        count += usize::from(self.first_publication_year.is_some());
        count += usize::from(!self.categories.is_empty());
        count += self.external_ids.len();
        for edition in &self.editions {
            count += [
                edition.isbn13.is_some(),
                edition.publisher.is_some(),
                edition.published_date.is_some(),
                edition.format.is_some(),
                edition.cover_url.is_some(),
            ]
            .into_iter()
            .filter(|present| *present)
            .count();
        }
        count
    }
}

/// Per-request options accepted by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Page size. `0` means "use the engine default".
    pub max_results: usize,
    /// Zero-based page index into the full deduplicated result set.
    pub page: usize,
    /// Skip the cache read (the result is still written back).
    pub force_refresh: bool,
    /// Extra provider filters (e.g. `lang`). Part of the cache key.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 0,
            page: 0,
            force_refresh: false,
            params: BTreeMap::new(),
        }
    }
}

/// Paging metadata for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub max_results: usize,
    pub total_pages: usize,
}

/// The outcome of one provider call, as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider: ProviderId,
    /// Items returned (zero on failure).
    pub items: usize,
    /// Stable error category (`timeout`, `unavailable`, `rate_limited`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Human-readable error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ProviderAttempt {
    /// Whether the call produced a usable response.
    pub fn succeeded(&self) -> bool {
        self.error_kind.is_none()
    }
}

/// A successful search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// The requested page of the deduplicated result set.
    pub items: Vec<Work>,
    /// Size of the full deduplicated result set.
    pub total_items: usize,
    pub cached: bool,
    /// Providers that contributed results, joined with `+`.
    pub provider: String,
    /// Wall-clock time spent serving the request, in milliseconds.
    pub response_time: u64,
    pub pagination: Pagination,
    /// Per-provider outcomes for uncached responses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers_checked: Vec<ProviderAttempt>,
}

/// Returned when every provider in the plan failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFailure {
    /// Always empty; present so clients can treat both shapes uniformly.
    pub items: Vec<Work>,
    pub error: String,
    pub context: SearchContext,
    pub query: String,
    pub providers_checked: Vec<ProviderAttempt>,
}

impl SearchFailure {
    /// True when no provider actually answered: every attempt was skipped by
    /// its breaker, timed out, or was rate-limited.
    pub fn all_unavailable(&self) -> bool {
        !self.providers_checked.is_empty()
            && self.providers_checked.iter().all(|a| {
                matches!(
                    a.error_kind.as_deref(),
                    Some("unavailable" | "timeout" | "rate_limited")
                )
            })
    }
}
