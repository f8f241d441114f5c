//! Query classification: validate the raw query, settle its context, and
//! produce the provider-facing and cache-facing forms.

use crate::error::SearchError;
use crate::isbn;
use crate::types::SearchContext;

use super::normalize::normalize_for_key;

/// A validated query ready for routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedQuery {
    /// Text sent to providers: the trimmed original, or the cleaned ISBN.
    pub provider_query: String,
    /// Cache-key form (ISBN-13 for the isbn context).
    pub normalized: String,
    pub context: SearchContext,
}

/// Classify `raw`, honouring an explicit context when given.
///
/// Without one, ISBN-shaped input routes to [`SearchContext::Isbn`] and
/// everything else to [`SearchContext::Title`].
///
/// # Errors
///
/// [`SearchError::InvalidRequest`] for empty, over-long, or
/// punctuation-only queries.
pub fn classify(
    raw: &str,
    explicit: Option<SearchContext>,
    max_len: usize,
) -> Result<ClassifiedQuery, SearchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SearchError::InvalidRequest("query must not be empty".into()));
    }
    if trimmed.chars().count() > max_len {
        return Err(SearchError::InvalidRequest(format!(
            "query exceeds {max_len} characters"
        )));
    }

    let context = explicit.unwrap_or_else(|| {
        if isbn::looks_like_isbn(trimmed) && isbn::canonical_isbn13(trimmed).is_some() {
            SearchContext::Isbn
        } else {
            SearchContext::Title
        }
    });

    let (provider_query, normalized) = match context {
        SearchContext::Isbn => match isbn::canonical_isbn13(trimmed) {
            Some(isbn13) => (isbn::clean(trimmed), isbn13),
            None => (trimmed.to_owned(), normalize_for_key(trimmed)),
        },
        _ => (trimmed.to_owned(), normalize_for_key(trimmed)),
    };

    if normalized.is_empty() {
        return Err(SearchError::InvalidRequest(
            "query contains no searchable characters".into(),
        ));
    }

    tracing::trace!(%context, normalized = %normalized, "query classified");

    Ok(ClassifiedQuery {
        provider_query,
        normalized,
        context,
    })
}
