//! Fire-and-forget metrics.
//!
//! [`MetricsRecorder::record`] is synchronous and never blocks the request
//! path: [`ChannelMetrics`] forwards events over an unbounded channel to an
//! aggregator task that owns all counters. Snapshots and the query
//! popularity table are read by sending a request down the same channel, so
//! they reflect every event recorded before the call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{mpsc, oneshot};

use crate::types::{ProviderId, SearchContext};

/// Default number of distinct queries tracked for popularity.
pub const DEFAULT_POPULARITY_CAPACITY: usize = 1_000;

/// How a request's cache lookup went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    HotHit,
    ColdHit,
    VariantHit,
    Miss,
    /// The read was skipped (`force_refresh`).
    Bypass,
}

/// How a single provider call went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOutcome {
    Success,
    Timeout,
    /// Not attempted; breaker open.
    Skipped,
    Failed,
}

/// One observation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Cache {
        context: SearchContext,
        outcome: CacheOutcome,
    },
    Provider {
        provider: ProviderId,
        outcome: ProviderOutcome,
        latency_ms: u64,
    },
    Request {
        context: SearchContext,
        query: String,
        latency_ms: u64,
        cached: bool,
        success: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheCounters {
    pub hot_hits: u64,
    pub cold_hits: u64,
    pub variant_hits: u64,
    pub misses: u64,
    pub bypasses: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCounters {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub skipped: u64,
    pub total_latency_ms: u64,
}

/// Aggregate counters since start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub failed_requests: u64,
    pub cached_responses: u64,
    pub total_latency_ms: u64,
    pub cache: CacheCounters,
    /// Keyed by provider identifier.
    pub providers: BTreeMap<String, ProviderCounters>,
}

/// A frequently requested query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularQuery {
    pub context: SearchContext,
    pub query: String,
    pub count: u64,
}

/// Sink for metric events.
#[async_trait]
pub trait MetricsRecorder: Send + Sync {
    /// Record an event without blocking.
    fn record(&self, event: MetricEvent);

    /// Aggregate counters.
    async fn snapshot(&self) -> MetricsSnapshot;

    /// The `n` most requested successful queries, most popular first.
    async fn top_queries(&self, n: usize) -> Vec<PopularQuery>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

#[async_trait]
impl MetricsRecorder for NoopMetrics {
    fn record(&self, _event: MetricEvent) {}

    async fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::default()
    }

    async fn top_queries(&self, _n: usize) -> Vec<PopularQuery> {
        Vec::new()
    }
}

enum Message {
    Event(MetricEvent),
    Snapshot(oneshot::Sender<MetricsSnapshot>),
    Top(usize, oneshot::Sender<Vec<PopularQuery>>),
}

/// Channel-backed recorder with a detached aggregator task.
///
/// The aggregator exits when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct ChannelMetrics {
    tx: mpsc::UnboundedSender<Message>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event(e) => f.debug_tuple("Event").field(e).finish(),
            Self::Snapshot(_) => f.write_str("Snapshot"),
            Self::Top(n, _) => f.debug_tuple("Top").field(n).finish(),
        }
    }
}

impl ChannelMetrics {
    /// Start the aggregator on the current runtime.
    pub fn spawn() -> Self {
        Self::with_popularity_capacity(DEFAULT_POPULARITY_CAPACITY)
    }

    /// Start the aggregator, tracking at most `capacity` distinct queries.
    pub fn with_popularity_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(aggregate(rx, capacity.max(1)));
        Self { tx }
    }
}

#[async_trait]
impl MetricsRecorder for ChannelMetrics {
    fn record(&self, event: MetricEvent) {
        // A closed channel only happens during shutdown; dropping is fine.
        let _ = self.tx.send(Message::Event(event));
    }

    async fn snapshot(&self) -> MetricsSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Message::Snapshot(reply)).is_err() {
            return MetricsSnapshot::default();
        }
        rx.await.unwrap_or_default()
    }

    async fn top_queries(&self, n: usize) -> Vec<PopularQuery> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Message::Top(n, reply)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

#[derive(Default)]
struct Aggregate {
    snapshot: MetricsSnapshot,
    popularity: HashMap<(SearchContext, String), u64>,
}

impl Aggregate {
    fn apply(&mut self, event: MetricEvent, capacity: usize) {
        match event {
            MetricEvent::Cache { outcome, .. } => {
                let cache = &mut self.snapshot.cache;
                match outcome {
                    CacheOutcome::HotHit => cache.hot_hits += 1,
                    CacheOutcome::ColdHit => cache.cold_hits += 1,
                    CacheOutcome::VariantHit => cache.variant_hits += 1,
                    CacheOutcome::Miss => cache.misses += 1,
                    CacheOutcome::Bypass => cache.bypasses += 1,
                }
            }
            MetricEvent::Provider {
                provider,
                outcome,
                latency_ms,
            } => {
                let counters = self
                    .snapshot
                    .providers
                    .entry(provider.as_str().to_owned())
                    .or_default();
                match outcome {
                    ProviderOutcome::Success => counters.successes += 1,
                    ProviderOutcome::Timeout => counters.timeouts += 1,
                    ProviderOutcome::Skipped => counters.skipped += 1,
                    ProviderOutcome::Failed => counters.failures += 1,
                }
                counters.total_latency_ms += latency_ms;
            }
            MetricEvent::Request {
                context,
                query,
                latency_ms,
                cached,
                success,
            } => {
                self.snapshot.requests += 1;
                self.snapshot.total_latency_ms += latency_ms;
                if cached {
                    self.snapshot.cached_responses += 1;
                }
                if !success {
                    self.snapshot.failed_requests += 1;
                    return;
                }
                self.bump_popularity(context, query.trim().to_lowercase(), capacity);
            }
        }
    }

    fn bump_popularity(&mut self, context: SearchContext, query: String, capacity: usize) {
        let key = (context, query);
        if let Some(count) = self.popularity.get_mut(&key) {
            *count += 1;
            return;
        }
        if self.popularity.len() >= capacity {
            // Evict the least popular entry to make room.
            let coldest = self
                .popularity
                .iter()
                .min_by_key(|(_, count)| **count)
                .map(|(k, _)| k.clone());
            if let Some(coldest) = coldest {
                self.popularity.remove(&coldest);
            }
        }
        self.popularity.insert(key, 1);
    }

    fn top(&self, n: usize) -> Vec<PopularQuery> {
        let mut ranked: Vec<PopularQuery> = self
            .popularity
            .iter()
            .map(|((context, query), count)| PopularQuery {
                context: *context,
                query: query.clone(),
                count: *count,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.context.cmp(&b.context))
                .then_with(|| a.query.cmp(&b.query))
        });
        ranked.truncate(n);
        ranked
    }
}

async fn aggregate(mut rx: mpsc::UnboundedReceiver<Message>, capacity: usize) {
    let mut state = Aggregate::default();
    while let Some(message) = rx.recv().await {
        match message {
            Message::Event(event) => state.apply(event, capacity),
            Message::Snapshot(reply) => {
                let _ = reply.send(state.snapshot.clone());
            }
            Message::Top(n, reply) => {
                let _ = reply.send(state.top(n));
            }
        }
    }
    tracing::debug!("metrics aggregator stopped");
}
