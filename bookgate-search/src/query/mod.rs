//! Query classification and cache key normalisation.

pub mod classify;
pub mod key;
pub mod normalize;

pub use classify::{classify, ClassifiedQuery};
pub use key::CacheKey;
