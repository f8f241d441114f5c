//! ISBNdb: paid ISBN specialist.
//!
//! ISBN lookups hit `book/{isbn}`; other contexts use
//! `books/{query}?column=` which the API supports for title, author and
//! subject. Both answer 404 when nothing matches, reported as
//! [`ProviderError::NoResults`].

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::SearchError;
use crate::http::{parse_year, read_json, transport_error};
use crate::provider::{BookProvider, ProviderError, ProviderQuery};
use crate::types::{Author, Edition, ProviderId, SearchContext, Work};

/// Production endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api2.isbndb.com/";

/// ISBNdb caps page size at 1000 but larger pages are slow; keep it modest.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct BookBody {
    book: IsbndbBook,
}

#[derive(Debug, Deserialize)]
struct BooksBody {
    #[serde(default)]
    books: Vec<IsbndbBook>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IsbndbBook {
    title: Option<String>,
    title_long: Option<String>,
    authors: Vec<String>,
    publisher: Option<String>,
    date_published: Option<String>,
    isbn: Option<String>,
    isbn13: Option<String>,
    binding: Option<String>,
    image: Option<String>,
    subjects: Vec<String>,
}

/// ISBNdb adapter. Requires an API key.
pub struct IsbndbProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl IsbndbProvider {
    /// Adapter against the production endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `api_key` is blank.
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Result<Self, SearchError> {
        Self::with_base_url(client, api_key, DEFAULT_BASE_URL)
    }

    /// Adapter against a custom endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `api_key` is blank or `base_url`
    /// is not a valid URL.
    pub fn with_base_url(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Config("ISBNdb requires an API key".into()));
        }
        let mut base_url = Url::parse(base_url)
            .map_err(|e| SearchError::Config(format!("invalid ISBNdb URL {base_url}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ProviderError::Transport("ISBNdb base URL cannot hold a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl BookProvider for IsbndbProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Isbndb
    }

    async fn search(
        &self,
        query: &str,
        context: SearchContext,
        options: &ProviderQuery,
    ) -> Result<Vec<Work>, ProviderError> {
        tracing::trace!(query, %context, "ISBNdb search");

        if context == SearchContext::Isbn {
            let response = self
                .client
                .get(self.endpoint(&["book", query])?)
                .header("Authorization", &self.api_key)
                .send()
                .await
                .map_err(transport_error)?;
            let body: BookBody = read_json(response, true).await?;
            return Ok(book_to_work(body.book).into_iter().collect());
        }

        let column = match context {
            SearchContext::Author => "author",
            SearchContext::Subject => "subject",
            _ => "title",
        };
        let page_size = options.max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let response = self
            .client
            .get(self.endpoint(&["books", query])?)
            .query(&[("column", column), ("page", "1"), ("pageSize", page_size.as_str())])
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        let body: BooksBody = read_json(response, true).await?;
        Ok(body.books.into_iter().filter_map(book_to_work).collect())
    }
}

fn book_to_work(book: IsbndbBook) -> Option<Work> {
    let title = book
        .title
        .or(book.title_long)
        .filter(|t| !t.trim().is_empty())?;
    let authors = book.authors.into_iter().map(Author::named).collect();
    let mut work = Work::new(title, authors, ProviderId::Isbndb);
    work.first_publication_year = book.date_published.as_deref().and_then(parse_year);
    work.categories = book.subjects;

    let isbn = book.isbn13.as_deref().or(book.isbn.as_deref());
    let mut edition = isbn.and_then(Edition::from_isbn).unwrap_or_default();
    if let Some(isbn13) = edition.isbn13.clone() {
        work.external_ids
            .insert(ProviderId::Isbndb.as_str().to_owned(), isbn13);
    }
    edition.publisher = book.publisher;
    edition.published_date = book.date_published;
    edition.format = book.binding;
    edition.cover_url = book.image;
    work.editions.push(edition);
    Some(work)
}
