//! Per-provider circuit breaker registry.
//!
//! Tracks consecutive failures per upstream provider and temporarily stops
//! calling providers that fail repeatedly. After a cooldown, exactly one
//! probe call is admitted; its outcome decides whether the circuit closes or
//! re-opens.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  cooldown   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └───▲────┘   (probe)   └────┬─────┘
//!     │                        │       failure          │
//!     │                        └────────────────────────┤
//!     │                success                          │
//!     └─────────────────────────────────────────────────┘
//! ```
//!
//! State lives in atomics, one slot per provider, so concurrent requests
//! never take a lock. Races can lose an increment; the breaker is a
//! heuristic, so eventual convergence is enough.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::types::ProviderId;

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

/// Circuit state for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Healthy: every call is allowed.
    Closed,
    /// Failing: calls are rejected locally until the cooldown elapses.
    Open,
    /// Cooldown elapsed: one probe call is in flight.
    HalfOpen,
}

impl CircuitState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            OPEN => Self::Open,
            HALF_OPEN => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Trip threshold and cooldown for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerPolicy {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before admitting a probe.
    pub cooldown_secs: u64,
}

impl BreakerPolicy {
    /// Policy for paid or quota-limited providers: trip fast, recover fast.
    pub const fn paid() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 30,
        }
    }

    /// Policy for free public providers: tolerate more, back off longer.
    pub const fn free() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }

    /// The default policy for `provider` based on whether it is metered.
    pub fn for_provider(provider: ProviderId) -> Self {
        if provider.is_metered() {
            Self::paid()
        } else {
            Self::free()
        }
    }

    fn cooldown_ms(&self) -> u64 {
        self.cooldown_secs.saturating_mul(1000)
    }
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self::free()
    }
}

/// Decision returned by [`BreakerRegistry::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; call normally.
    Allowed,
    /// Circuit half-open and this caller holds the single probe.
    Probe,
    /// Circuit open (or a probe is already in flight); do not call.
    Rejected {
        /// Milliseconds until the next probe may be admitted.
        retry_after_ms: u64,
    },
}

impl Admission {
    /// Whether the caller may contact the provider.
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Snapshot of one provider's breaker, as served by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider_id: ProviderId,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Epoch milliseconds when the circuit last opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<u64>,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

#[derive(Debug)]
struct Slot {
    provider: ProviderId,
    policy: BreakerPolicy,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    opened_at_ms: AtomicU64,
    probe_started_ms: AtomicU64,
}

impl Slot {
    fn new(provider: ProviderId, policy: BreakerPolicy) -> Self {
        Self {
            provider,
            policy,
            state: AtomicU8::new(CLOSED),
            consecutive_failures: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            probe_started_ms: AtomicU64::new(0),
        }
    }
}

/// Breaker state for every known provider.
///
/// Slots are created up front for all [`ProviderId`]s, so lookups are a
/// linear scan over a three-element vector and never allocate.
#[derive(Debug)]
pub struct BreakerRegistry {
    clock: Arc<dyn Clock>,
    slots: Vec<Slot>,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl BreakerRegistry {
    /// Registry with each provider's default policy (see
    /// [`BreakerPolicy::for_provider`]).
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let slots = ProviderId::all()
            .iter()
            .map(|p| Slot::new(*p, BreakerPolicy::for_provider(*p)))
            .collect();
        Self { clock, slots }
    }

    /// Registry with explicit policies for metered and free providers.
    pub fn with_policies(clock: Arc<dyn Clock>, paid: BreakerPolicy, free: BreakerPolicy) -> Self {
        let slots = ProviderId::all()
            .iter()
            .map(|p| Slot::new(*p, if p.is_metered() { paid } else { free }))
            .collect();
        Self { clock, slots }
    }

    /// Override the policy for one provider. Resets its state.
    pub fn with_policy(mut self, provider: ProviderId, policy: BreakerPolicy) -> Self {
        for slot in &mut self.slots {
            if slot.provider == provider {
                *slot = Slot::new(provider, policy);
            }
        }
        self
    }

    fn slot(&self, provider: ProviderId) -> &Slot {
        // Every ProviderId has a slot; index by position in `all()`.
        let index = ProviderId::all()
            .iter()
            .position(|p| *p == provider)
            .unwrap_or(0);
        &self.slots[index]
    }

    /// Decide whether a call to `provider` may proceed right now.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and
    /// admits the caller that wins the transition as the probe. A probe that
    /// has been outstanding for a full cooldown is presumed lost and a new
    /// one is admitted.
    pub fn admit(&self, provider: ProviderId) -> Admission {
        let slot = self.slot(provider);
        let now = self.clock.now_millis();
        let cooldown = slot.policy.cooldown_ms();

        match slot.state.load(Ordering::Acquire) {
            OPEN => {
                let reopen_at = slot.opened_at_ms.load(Ordering::Acquire).saturating_add(cooldown);
                if now < reopen_at {
                    return Admission::Rejected {
                        retry_after_ms: reopen_at - now,
                    };
                }
                if slot
                    .state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    slot.probe_started_ms.store(now, Ordering::Release);
                    tracing::info!(provider = %provider, "circuit half-open, admitting probe");
                    Admission::Probe
                } else {
                    Admission::Rejected {
                        retry_after_ms: cooldown,
                    }
                }
            }
            HALF_OPEN => {
                let started = slot.probe_started_ms.load(Ordering::Acquire);
                let stale_at = started.saturating_add(cooldown);
                if now >= stale_at
                    && slot
                        .probe_started_ms
                        .compare_exchange(started, now, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    tracing::debug!(provider = %provider, "previous probe stale, admitting another");
                    return Admission::Probe;
                }
                Admission::Rejected {
                    retry_after_ms: stale_at.saturating_sub(now).max(1),
                }
            }
            _ => Admission::Allowed,
        }
    }

    /// Record a successful (or non-failing) call.
    ///
    /// Resets the failure count while closed and closes a half-open circuit.
    /// An open circuit only closes through a probe, so a late success from a
    /// call admitted before it opened is ignored.
    pub fn record_success(&self, provider: ProviderId) {
        let slot = self.slot(provider);
        match slot.state.load(Ordering::Acquire) {
            OPEN => {
                tracing::debug!(provider = %provider, "late success ignored, circuit open");
            }
            HALF_OPEN => {
                slot.consecutive_failures.store(0, Ordering::Release);
                if slot
                    .state
                    .compare_exchange(HALF_OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    tracing::info!(provider = %provider, "circuit closed");
                }
            }
            _ => slot.consecutive_failures.store(0, Ordering::Release),
        }
    }

    /// Record a failed call.
    ///
    /// A failed probe re-opens the circuit with a fresh cooldown; otherwise
    /// the failure count increments and the circuit opens at the threshold.
    pub fn record_failure(&self, provider: ProviderId) {
        let slot = self.slot(provider);
        let now = self.clock.now_millis();
        let failures = slot
            .consecutive_failures
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);

        match slot.state.load(Ordering::Acquire) {
            HALF_OPEN => {
                slot.opened_at_ms.store(now, Ordering::Release);
                slot.state.store(OPEN, Ordering::Release);
                tracing::warn!(provider = %provider, "probe failed, circuit re-opened");
            }
            CLOSED if failures >= slot.policy.failure_threshold => {
                slot.opened_at_ms.store(now, Ordering::Release);
                if slot
                    .state
                    .compare_exchange(CLOSED, OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    tracing::warn!(
                        provider = %provider,
                        failures,
                        cooldown_secs = slot.policy.cooldown_secs,
                        "circuit opened"
                    );
                }
            }
            _ => {}
        }
    }

    /// Current state of `provider`'s circuit.
    pub fn state(&self, provider: ProviderId) -> CircuitState {
        CircuitState::from_raw(self.slot(provider).state.load(Ordering::Acquire))
    }

    /// Snapshot of one provider.
    pub fn health(&self, provider: ProviderId) -> ProviderHealth {
        let slot = self.slot(provider);
        let state = CircuitState::from_raw(slot.state.load(Ordering::Acquire));
        let opened_at = slot.opened_at_ms.load(Ordering::Acquire);
        ProviderHealth {
            provider_id: provider,
            state,
            consecutive_failures: slot.consecutive_failures.load(Ordering::Acquire),
            opened_at: (state != CircuitState::Closed && opened_at > 0).then_some(opened_at),
            failure_threshold: slot.policy.failure_threshold,
            cooldown_secs: slot.policy.cooldown_secs,
        }
    }

    /// Snapshot of every provider.
    pub fn report(&self) -> Vec<ProviderHealth> {
        self.slots.iter().map(|s| self.health(s.provider)).collect()
    }

    /// Return every circuit to closed with zero failures.
    pub fn reset(&self) {
        for slot in &self.slots {
            slot.state.store(CLOSED, Ordering::Release);
            slot.consecutive_failures.store(0, Ordering::Release);
            slot.opened_at_ms.store(0, Ordering::Release);
            slot.probe_started_ms.store(0, Ordering::Release);
        }
    }
}
