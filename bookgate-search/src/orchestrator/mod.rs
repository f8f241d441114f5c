//! Search orchestration: routing plans, gated execution, merging.
//!
//! [`SearchRouter`] picks a [`SearchPlan`] for the request's context, runs
//! it through the [`Executor`] (breakers, timeouts, staggered racing),
//! merges the per-provider results, and fronts the whole thing with the
//! two-tier cache.

pub mod dedup;
pub mod executor;
pub mod plan;
pub mod router;

pub use executor::{Executor, ProviderRun};
pub use plan::{ExecutionMode, MergeStrategy, SearchPlan};
pub use router::{SearchRouter, SearchRouterBuilder};
