//! Open Library: free, canonical bibliography and subject taxonomy.
//!
//! Uses the `search.json` endpoint, which accepts `author`, `title`,
//! `subject` and `isbn` fields directly, so every context maps to one call.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::SearchError;
use crate::http::{read_json, transport_error};
use crate::provider::{BookProvider, ProviderError, ProviderQuery};
use crate::types::{Author, Edition, ProviderId, SearchContext, Work};

/// Production endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openlibrary.org";

const COVER_BASE_URL: &str = "https://covers.openlibrary.org/b/id";

/// Fields requested from `search.json`; keeps responses small.
const FIELDS: &str =
    "key,title,author_name,author_key,first_publish_year,isbn,subject,publisher,cover_i";

/// Cap on subjects copied into a work.
const MAX_CATEGORIES: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    key: Option<String>,
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    author_key: Vec<String>,
    first_publish_year: Option<i32>,
    #[serde(default)]
    isbn: Vec<String>,
    #[serde(default)]
    subject: Vec<String>,
    #[serde(default)]
    publisher: Vec<String>,
    cover_i: Option<i64>,
}

/// Open Library adapter.
pub struct OpenLibraryProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl OpenLibraryProvider {
    /// Adapter against the production endpoint.
    ///
    /// # Errors
    ///
    /// Never in practice; the default URL is a valid constant.
    pub fn new(client: reqwest::Client) -> Result<Self, SearchError> {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    /// Adapter against a custom endpoint (mirrors, tests).
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `base_url` is not a valid URL.
    pub fn with_base_url(client: reqwest::Client, base_url: &str) -> Result<Self, SearchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SearchError::Config(format!("invalid Open Library URL {base_url}: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn search_url(&self) -> Result<Url, ProviderError> {
        self.base_url
            .join("search.json")
            .map_err(|e| ProviderError::Transport(format!("bad search URL: {e}")))
    }
}

#[async_trait]
impl BookProvider for OpenLibraryProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenLibrary
    }

    async fn search(
        &self,
        query: &str,
        context: SearchContext,
        options: &ProviderQuery,
    ) -> Result<Vec<Work>, ProviderError> {
        tracing::trace!(query, %context, "Open Library search");

        let field = match context {
            SearchContext::Author => "author",
            SearchContext::Title => "title",
            SearchContext::Subject => "subject",
            SearchContext::Isbn => "isbn",
        };
        let limit = options.max_results.to_string();
        let mut params = vec![(field, query), ("limit", limit.as_str()), ("fields", FIELDS)];
        if let Some(lang) = options.params.get("lang") {
            params.push(("lang", lang.as_str()));
        }

        let response = self
            .client
            .get(self.search_url()?)
            .query(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let body: SearchBody = read_json(response, false).await?;
        let works = parse_docs(body.docs, options.max_results);
        tracing::trace!(count = works.len(), "Open Library response parsed");
        Ok(works)
    }
}

fn parse_docs(docs: Vec<SearchDoc>, max_results: usize) -> Vec<Work> {
    docs.into_iter()
        .filter_map(doc_to_work)
        .take(max_results)
        .collect()
}

fn doc_to_work(doc: SearchDoc) -> Option<Work> {
    let title = doc.title.filter(|t| !t.trim().is_empty())?;
    let authors = doc
        .author_name
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let mut author = Author::named(name);
            if let Some(key) = doc.author_key.get(i) {
                author
                    .external_ids
                    .insert(ProviderId::OpenLibrary.as_str().to_owned(), key.clone());
            }
            author
        })
        .collect();

    let mut work = Work::new(title, authors, ProviderId::OpenLibrary);
    work.first_publication_year = doc.first_publish_year;
    work.categories = doc.subject.into_iter().take(MAX_CATEGORIES).collect();
    if let Some(key) = doc.key {
        let id = key.trim_start_matches("/works/").to_owned();
        work.external_ids
            .insert(ProviderId::OpenLibrary.as_str().to_owned(), id);
    }

    let isbn = doc
        .isbn
        .iter()
        .find(|i| i.len() == 13)
        .or_else(|| doc.isbn.first());
    let mut edition = isbn.and_then(|i| Edition::from_isbn(i)).unwrap_or_default();
    edition.publisher = doc.publisher.into_iter().next();
    edition.cover_url = doc.cover_i.map(|id| format!("{COVER_BASE_URL}/{id}-M.jpg"));
    if edition != Edition::default() {
        work.editions.push(edition);
    }
    Some(work)
}
