//! In-memory provider for tests and offline demos.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::provider::{BookProvider, ProviderError, ProviderQuery};
use crate::types::{Author, ProviderId, SearchContext, Work};

type Reply = Result<Vec<Work>, ProviderError>;

/// A provider that answers from a script instead of the network.
///
/// Queued replies are consumed first, one per call; after that every call
/// gets the default reply. Calls and queries are recorded so tests can
/// assert that a provider was (or was not) contacted.
///
/// # Examples
///
/// ```
/// use bookgate_search::providers::ScriptedProvider;
/// use bookgate_search::ProviderId;
///
/// let provider = ScriptedProvider::new(ProviderId::OpenLibrary)
///     .returning(ScriptedProvider::works(ProviderId::OpenLibrary, "Stephen King", 3));
/// assert_eq!(provider.calls(), 0);
/// ```
pub struct ScriptedProvider {
    id: ProviderId,
    default_reply: Reply,
    queued: Mutex<VecDeque<Reply>>,
    delay: Duration,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// A provider that returns no items until scripted otherwise.
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            default_reply: Ok(Vec::new()),
            queued: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Answer every unqueued call with `works`.
    pub fn returning(mut self, works: Vec<Work>) -> Self {
        self.default_reply = Ok(works);
        self
    }

    /// Fail every unqueued call with `err`.
    pub fn failing(mut self, err: ProviderError) -> Self {
        self.default_reply = Err(err);
        self
    }

    /// Sleep before answering (simulates a slow upstream).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a one-shot reply ahead of the default.
    pub fn push_reply(&self, reply: Result<Vec<Work>, ProviderError>) {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(reply);
        }
    }

    /// Number of times `search` was entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries received, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    /// `count` distinct works by `author`, titled "`author` Book N".
    pub fn works(source: ProviderId, author: &str, count: usize) -> Vec<Work> {
        (0..count)
            .map(|i| {
                let mut work = Work::new(
                    format!("{author} Book {i}"),
                    vec![Author::named(author)],
                    source,
                );
                work.external_ids
                    .insert(source.as_str().to_owned(), format!("{}-{i}", source.as_str()));
                work
            })
            .collect()
    }
}

#[async_trait]
impl BookProvider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn search(
        &self,
        query: &str,
        _context: SearchContext,
        options: &ProviderQuery,
    ) -> Result<Vec<Work>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_owned());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let queued = self.queued.lock().ok().and_then(|mut q| q.pop_front());
        let reply = queued.unwrap_or_else(|| self.default_reply.clone());
        reply.map(|works| {
            if options.max_results == 0 {
                works
            } else {
                works.into_iter().take(options.max_results).collect()
            }
        })
    }
}
