//! Google Books: general catalogue, keyed and rate-limited.
//!
//! Uses `volumes?q=` with field prefixes (`inauthor:`, `intitle:`,
//! `subject:`, `isbn:`). The API key is optional but unkeyed quota is tiny.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::SearchError;
use crate::http::{parse_year, read_json, transport_error};
use crate::provider::{BookProvider, ProviderError, ProviderQuery};
use crate::types::{Author, Edition, ProviderId, SearchContext, Work};

/// Production endpoint.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1/";

/// Google rejects `maxResults` above 40.
const MAX_PAGE_SIZE: usize = 40;

#[derive(Debug, Deserialize)]
struct VolumesBody {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: String,
    #[serde(rename = "volumeInfo")]
    info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    authors: Vec<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    industry_identifiers: Vec<IndustryIdentifier>,
    categories: Vec<String>,
    image_links: Option<ImageLinks>,
    print_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}

/// Google Books adapter.
pub struct GoogleBooksProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl GoogleBooksProvider {
    /// Adapter against the production endpoint.
    ///
    /// # Errors
    ///
    /// Never in practice; the default URL is a valid constant.
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Result<Self, SearchError> {
        Self::with_base_url(client, api_key, DEFAULT_BASE_URL)
    }

    /// Adapter against a custom endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `base_url` is not a valid URL.
    pub fn with_base_url(
        client: reqwest::Client,
        api_key: Option<String>,
        base_url: &str,
    ) -> Result<Self, SearchError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| SearchError::Config(format!("invalid Google Books URL {base_url}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }
}

/// The `q=` value for a context.
fn volume_query(query: &str, context: SearchContext) -> String {
    match context {
        SearchContext::Author => format!("inauthor:{query}"),
        SearchContext::Title => format!("intitle:{query}"),
        SearchContext::Subject => format!("subject:{query}"),
        SearchContext::Isbn => format!("isbn:{query}"),
    }
}

#[async_trait]
impl BookProvider for GoogleBooksProvider {
    fn id(&self) -> ProviderId {
        ProviderId::GoogleBooks
    }

    async fn search(
        &self,
        query: &str,
        context: SearchContext,
        options: &ProviderQuery,
    ) -> Result<Vec<Work>, ProviderError> {
        tracing::trace!(query, %context, "Google Books search");

        let url = self
            .base_url
            .join("volumes")
            .map_err(|e| ProviderError::Transport(format!("bad volumes URL: {e}")))?;
        let q = volume_query(query, context);
        let max = options.max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut params = vec![("q", q.as_str()), ("maxResults", max.as_str())];
        if let Some(lang) = options.params.get("lang") {
            params.push(("langRestrict", lang.as_str()));
        }
        if let Some(key) = self.api_key.as_deref() {
            params.push(("key", key));
        }

        let response = self
            .client
            .get(url)
            .query(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let body: VolumesBody = read_json(response, false).await?;
        let works: Vec<Work> = body.items.into_iter().filter_map(volume_to_work).collect();
        tracing::trace!(count = works.len(), "Google Books response parsed");
        Ok(works)
    }
}

fn volume_to_work(volume: Volume) -> Option<Work> {
    let info = volume.info;
    let title = info.title.filter(|t| !t.trim().is_empty())?;
    let title = match info.subtitle {
        Some(sub) if !sub.trim().is_empty() => format!("{title}: {sub}"),
        _ => title,
    };
    let authors = info.authors.into_iter().map(Author::named).collect();

    let mut work = Work::new(title, authors, ProviderId::GoogleBooks);
    work.first_publication_year = info.published_date.as_deref().and_then(parse_year);
    work.categories = info.categories;
    work.external_ids
        .insert(ProviderId::GoogleBooks.as_str().to_owned(), volume.id.clone());

    let isbn13 = info
        .industry_identifiers
        .iter()
        .find(|i| i.kind == "ISBN_13")
        .or_else(|| info.industry_identifiers.iter().find(|i| i.kind == "ISBN_10"));
    let mut edition = isbn13
        .and_then(|i| Edition::from_isbn(&i.identifier))
        .unwrap_or_default();
    edition.publisher = info.publisher;
    edition.published_date = info.published_date;
    edition.format = info.print_type.map(|p| p.to_ascii_lowercase());
    edition.cover_url = info
        .image_links
        .and_then(|links| links.thumbnail)
        .map(|url| url.replacen("http://", "https://", 1));
    edition
        .external_ids
        .insert(ProviderId::GoogleBooks.as_str().to_owned(), volume.id);
    work.editions.push(edition);
    Some(work)
}
