//! Background cache warming.
//!
//! The warmer drives the normal router path for a list of targets so that
//! popular queries are already cached when users ask for them. Runs are
//! idempotent: overlapping runs just write the same entries twice.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::SearchRouter;
use crate::types::{SearchContext, SearchOptions};

/// Author entries that name no one in particular.
const GENERIC_AUTHORS: &[&str] = &["various", "unknown", "anonymous", "editor", "translator"];

/// One query to keep warm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WarmTarget {
    pub context: SearchContext,
    pub query: String,
}

impl WarmTarget {
    pub fn new(context: SearchContext, query: impl Into<String>) -> Self {
        Self {
            context,
            query: query.into(),
        }
    }

    fn dedup_key(&self) -> (SearchContext, String) {
        (self.context, self.query.trim().to_lowercase())
    }
}

/// Trim whitespace and surrounding quotes; reject empty and generic names.
pub fn clean_author_name(raw: &str) -> Option<String> {
    let name = raw.trim().trim_matches('"').trim();
    if name.is_empty() {
        return None;
    }
    if GENERIC_AUTHORS.iter().any(|g| name.eq_ignore_ascii_case(g)) {
        return None;
    }
    Some(name.to_owned())
}

/// Author-context targets from raw names, cleaned and deduplicated
/// case-insensitively (first spelling wins).
pub fn author_targets<I, S>(names: I) -> Vec<WarmTarget>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let targets = names
        .into_iter()
        .filter_map(|n| clean_author_name(n.as_ref()))
        .map(|n| WarmTarget::new(SearchContext::Author, n));
    dedup_targets(targets)
}

fn dedup_targets(targets: impl IntoIterator<Item = WarmTarget>) -> Vec<WarmTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|t| seen.insert(t.dedup_key()))
        .collect()
}

/// What happened to one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WarmOutcome {
    /// Fetched and cached (`items` in the full result set).
    Warmed { items: usize },
    /// Already cached; not fetched.
    Skipped,
    Failed { error: String },
}

/// Per-target results of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmReport {
    pub results: Vec<(WarmTarget, WarmOutcome)>,
}

impl WarmReport {
    pub fn warmed(&self) -> usize {
        self.count(|o| matches!(o, WarmOutcome::Warmed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, WarmOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, WarmOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&WarmOutcome) -> bool) -> usize {
        self.results.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Walks a target list through the router with a politeness delay.
#[derive(Debug, Clone)]
pub struct CacheWarmer {
    router: SearchRouter,
    delay: Duration,
}

impl CacheWarmer {
    pub fn new(router: SearchRouter, delay: Duration) -> Self {
        Self { router, delay }
    }

    /// Warm every target once.
    ///
    /// Targets already cached are skipped unless `force_refresh` is set.
    /// The delay (plus up to 25% jitter) separates consecutive fetches;
    /// skips do not wait.
    pub async fn warm(&self, targets: &[WarmTarget], force_refresh: bool) -> WarmReport {
        let mut report = WarmReport::default();
        let mut fetched_any = false;

        for target in targets {
            if !force_refresh {
                match self
                    .router
                    .is_cached(target.context, &target.query, &SearchOptions::default())
                    .await
                {
                    Ok(true) => {
                        report.results.push((target.clone(), WarmOutcome::Skipped));
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        report
                            .results
                            .push((target.clone(), WarmOutcome::Failed { error: e.to_string() }));
                        continue;
                    }
                }
            }

            if fetched_any && !self.delay.is_zero() {
                tokio::time::sleep(self.jittered_delay()).await;
            }
            fetched_any = true;

            let options = SearchOptions {
                force_refresh,
                ..Default::default()
            };
            let outcome = match self.router.route(target.context, &target.query, options).await {
                Ok(response) => WarmOutcome::Warmed {
                    items: response.total_items,
                },
                Err(e) => {
                    tracing::warn!(context = %target.context, query = %target.query, "warm failed: {e}");
                    WarmOutcome::Failed { error: e.to_string() }
                }
            };
            report.results.push((target.clone(), outcome));
        }

        tracing::info!(
            warmed = report.warmed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "cache warm run finished"
        );
        report
    }

    fn jittered_delay(&self) -> Duration {
        let base = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX);
        let jitter = rand::thread_rng().gen_range(0..=base / 4);
        Duration::from_millis(base.saturating_add(jitter))
    }

    /// Warm `targets` plus the `top_queries` most popular recorded queries
    /// every `interval`, until `cancel` fires. The first run starts
    /// immediately.
    pub fn spawn_periodic(
        self,
        targets: Vec<WarmTarget>,
        top_queries: usize,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let mut run = targets.clone();
                if top_queries > 0 {
                    let popular = self.router.metrics().top_queries(top_queries).await;
                    run.extend(popular.into_iter().map(|p| WarmTarget::new(p.context, p.query)));
                }
                let run = dedup_targets(run);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.warm(&run, false) => {}
                }
            }
            tracing::debug!("cache warmer stopped");
        })
    }
}
