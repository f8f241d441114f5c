//! Provider execution under breakers and timeouts.
//!
//! Every call goes through the same gate: ask the breaker, run the adapter
//! under a deadline, report the outcome back to the breaker and to metrics.
//! Provider errors stop here and come back as data in [`ProviderRun`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::circuit_breaker::BreakerRegistry;
use crate::metrics::{MetricEvent, MetricsRecorder, ProviderOutcome};
use crate::provider::{BookProvider, ProviderError, ProviderQuery};
use crate::types::{ProviderAttempt, ProviderId, SearchContext, Work};

use super::plan::ExecutionMode;

/// The settled outcome of one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRun {
    pub provider: ProviderId,
    pub outcome: Result<Vec<Work>, ProviderError>,
    pub elapsed_ms: u64,
}

impl ProviderRun {
    /// Whether the call produced at least one item.
    pub fn has_items(&self) -> bool {
        self.outcome.as_ref().is_ok_and(|items| !items.is_empty())
    }

    /// Whether the upstream answered, with items or an explicit "not found".
    pub fn answered(&self) -> bool {
        matches!(self.outcome, Ok(_) | Err(ProviderError::NoResults))
    }

    /// Client-facing summary.
    pub fn attempt(&self) -> ProviderAttempt {
        match &self.outcome {
            Ok(items) => ProviderAttempt {
                provider: self.provider,
                items: items.len(),
                error_kind: None,
                error: None,
                elapsed_ms: self.elapsed_ms,
            },
            Err(e) => ProviderAttempt {
                provider: self.provider,
                items: 0,
                error_kind: Some(e.kind().to_owned()),
                error: Some(e.to_string()),
                elapsed_ms: self.elapsed_ms,
            },
        }
    }
}

/// Runs provider plans.
pub struct Executor {
    providers: HashMap<ProviderId, Arc<dyn BookProvider>>,
    breakers: Arc<BreakerRegistry>,
    metrics: Arc<dyn MetricsRecorder>,
    timeout: Duration,
    stagger: Duration,
}

impl Executor {
    pub fn new(
        providers: Vec<Arc<dyn BookProvider>>,
        breakers: Arc<BreakerRegistry>,
        metrics: Arc<dyn MetricsRecorder>,
        timeout: Duration,
        stagger: Duration,
    ) -> Self {
        let providers = providers.into_iter().map(|p| (p.id(), p)).collect();
        Self {
            providers,
            breakers,
            metrics,
            timeout,
            stagger,
        }
    }

    /// Registered providers, in [`ProviderId::all`] order.
    pub fn available(&self) -> Vec<ProviderId> {
        ProviderId::all()
            .iter()
            .copied()
            .filter(|p| self.providers.contains_key(p))
            .collect()
    }

    /// Run `providers` in `mode` and return every settled call, in
    /// priority order.
    pub async fn run(
        &self,
        providers: &[ProviderId],
        mode: ExecutionMode,
        query: &str,
        context: SearchContext,
        options: &ProviderQuery,
    ) -> Vec<ProviderRun> {
        match mode {
            ExecutionMode::Sequential => self.sequential(providers, query, context, options).await,
            ExecutionMode::Parallel => self.parallel(providers, query, context, options).await,
        }
    }

    /// Try providers in order until one returns items.
    async fn sequential(
        &self,
        providers: &[ProviderId],
        query: &str,
        context: SearchContext,
        options: &ProviderQuery,
    ) -> Vec<ProviderRun> {
        let mut runs = Vec::with_capacity(providers.len());
        for provider in providers {
            let run = self.call(*provider, query, context, options).await;
            let done = run.has_items();
            runs.push(run);
            if done {
                break;
            }
        }
        runs
    }

    /// Start every provider, the one at index `i` after `i × stagger`, and
    /// wait for all of them to settle.
    async fn parallel(
        &self,
        providers: &[ProviderId],
        query: &str,
        context: SearchContext,
        options: &ProviderQuery,
    ) -> Vec<ProviderRun> {
        let calls = providers.iter().enumerate().map(|(index, provider)| async move {
            let delay = self.stagger.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.call(*provider, query, context, options).await
        });
        futures::future::join_all(calls).await
    }

    /// One gated, time-limited call.
    async fn call(
        &self,
        id: ProviderId,
        query: &str,
        context: SearchContext,
        options: &ProviderQuery,
    ) -> ProviderRun {
        let Some(provider) = self.providers.get(&id) else {
            return ProviderRun {
                provider: id,
                outcome: Err(ProviderError::Unavailable),
                elapsed_ms: 0,
            };
        };

        let admission = self.breakers.admit(id);
        if !admission.is_admitted() {
            tracing::debug!(provider = %id, ?admission, "provider skipped, circuit open");
            self.metrics.record(MetricEvent::Provider {
                provider: id,
                outcome: ProviderOutcome::Skipped,
                latency_ms: 0,
            });
            return ProviderRun {
                provider: id,
                outcome: Err(ProviderError::Unavailable),
                elapsed_ms: 0,
            };
        }

        let started = Instant::now();
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let outcome = match tokio::time::timeout(self.timeout, provider.search(query, context, options)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout_ms)),
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let metric = match &outcome {
            Ok(items) => {
                tracing::debug!(provider = %id, count = items.len(), elapsed_ms, "provider returned");
                self.breakers.record_success(id);
                ProviderOutcome::Success
            }
            Err(e) if e.counts_against_breaker() => {
                tracing::warn!(provider = %id, error = %e, elapsed_ms, "provider call failed");
                self.breakers.record_failure(id);
                if matches!(e, ProviderError::Timeout(_)) {
                    ProviderOutcome::Timeout
                } else {
                    ProviderOutcome::Failed
                }
            }
            Err(e) => {
                tracing::debug!(provider = %id, error = %e, elapsed_ms, "provider declined");
                self.breakers.record_success(id);
                match e {
                    ProviderError::NoResults => ProviderOutcome::Success,
                    _ => ProviderOutcome::Failed,
                }
            }
        };
        self.metrics.record(MetricEvent::Provider {
            provider: id,
            outcome: metric,
            latency_ms: elapsed_ms,
        });

        ProviderRun {
            provider: id,
            outcome,
            elapsed_ms,
        }
    }
}
